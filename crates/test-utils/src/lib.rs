//! Shared test utilities for the tree-server workspace.
//!
//! This crate provides common testing infrastructure including:
//! - The reference sample tree ([`sample_tree`])
//! - Data generators with index-derived values
//! - Instrumented adapters for counting reads and injecting failures
//! - Temporary configuration files
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{sample_tree, CountingAdapter};
//! ```

pub mod config_files;
pub mod fixtures;
pub mod generators;
pub mod instrumented;

// Re-export commonly used items at the crate root
pub use config_files::*;
pub use fixtures::*;
pub use generators::*;
pub use instrumented::*;

/// Assert that an array payload holds exactly `expected`, element by element.
#[macro_export]
macro_rules! assert_array_values {
    ($array:expr, $expected:expr) => {{
        let actual: Vec<f64> = $array.scalars().iter().map(|s| s.as_f64()).collect();
        let expected: Vec<f64> = $expected.into_iter().map(|v| v as f64).collect();
        assert_eq!(actual, expected);
    }};
}
