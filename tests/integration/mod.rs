//! Integration tests for the frameval evaluation engine

mod config_integration;
mod deadlock;
mod external_resources;
mod run_outcomes;
mod templates;
mod test_utils;
