//! Integration tests for the layered configuration loader

use super::test_utils::with_xdg_env;
use frameval::config::{ConfigLoader, EngineConfig};
use frameval::run::{Evaluation, Outcome};
use frameval::scheduler::report::CollectingSink;
use frameval::{Attribute, Future, SourceRef, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_workspace_file(workspace: &Path, name: &str, contents: &str) {
    let dir = workspace.join("config");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn test_defaults_without_any_source() {
    let temp_dir = TempDir::new().unwrap();
    let config = with_xdg_env(&temp_dir, || ConfigLoader::load(temp_dir.path()).unwrap());
    assert_eq!(config.scheduler.result_path, "value");
    assert_eq!(config.scheduler.deadlock_report_limit, 32);
    assert!(config.resolvers.environment);
    assert_eq!(config.logging.output, "stderr");
}

#[test]
fn test_environment_variables_override_files() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write_workspace_file(
        &workspace,
        "config.toml",
        "[scheduler]\nresult_path = \"from_file\"\ndeadlock_report_limit = 3\n",
    );

    let config = with_xdg_env(&temp_dir, || {
        std::env::set_var("FRAMEVAL__SCHEDULER__RESULT_PATH", "from_env");
        ConfigLoader::load(&workspace).unwrap()
    });
    assert_eq!(config.scheduler.result_path, "from_env");
    assert_eq!(config.scheduler.deadlock_report_limit, 3);
}

#[test]
fn test_environment_specific_workspace_file() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write_workspace_file(
        &workspace,
        "config.toml",
        "[scheduler]\nresult_path = \"base\"\n\n[resolvers]\nenvironment = false\n",
    );
    write_workspace_file(
        &workspace,
        "production.toml",
        "[scheduler]\nresult_path = \"release.value\"\n",
    );

    let (development, production) = with_xdg_env(&temp_dir, || {
        let development = ConfigLoader::load(&workspace).unwrap();
        std::env::set_var("FRAMEVAL_ENV", "production");
        let production = ConfigLoader::load(&workspace).unwrap();
        (development, production)
    });

    assert_eq!(development.scheduler.result_path, "base");
    assert_eq!(production.scheduler.result_path, "release.value");
    assert!(!production.resolvers.environment);
}

#[test]
fn test_global_file_under_xdg_config_home() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();

    let (config, path) = with_xdg_env(&temp_dir, || {
        let global = temp_dir.path().join("xdg").join("frameval");
        std::fs::create_dir_all(&global).unwrap();
        std::fs::write(
            global.join("config.toml"),
            "[logging]\nlevel = \"debug\"\nformat = \"json\"\n",
        )
        .unwrap();
        (
            ConfigLoader::load(&workspace).unwrap(),
            ConfigLoader::xdg_config_path(),
        )
    });

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
    assert_eq!(
        path,
        Some(temp_dir.path().join("xdg").join("frameval").join("config.toml"))
    );
}

#[test]
fn test_loaded_config_drives_a_run() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write_workspace_file(&workspace, "config.toml", "[scheduler]\nresult_path = \"answer\"\n");
    let config: EngineConfig =
        with_xdg_env(&temp_dir, || ConfigLoader::load(&workspace).unwrap());

    let sink = Arc::new(CollectingSink::default());
    let evaluation = Evaluation::new(config, sink).unwrap();
    let scheduler = evaluation.scheduler().clone();
    let entry = Future::new(evaluation.scheduler(), move |this: &Future| {
        let root = scheduler.create_frame(SourceRef::native("root"), None, true);
        if root.define("answer", Attribute::Value(Value::Int(42))).is_ok() {
            root.close();
            this.complete(Value::Frame(root.id()));
        }
    });
    assert_eq!(evaluation.run(entry), Outcome::Value(Value::Int(42)));
}

#[test]
fn test_invalid_loaded_config_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    write_workspace_file(
        &workspace,
        "config.toml",
        "[scheduler]\nresult_path = \"Not.valid\"\n\n[resolvers]\nfiles = true\n",
    );
    let config = with_xdg_env(&temp_dir, || ConfigLoader::load(&workspace).unwrap());
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(Evaluation::new(config, Arc::new(CollectingSink::default())).is_err());
}
