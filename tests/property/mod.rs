//! Property-based tests for scoping and memoization guarantees
