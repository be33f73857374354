//! Configuration loading, env substitution, and validation.
//!
//! Config files: `dicelog.toml`, `dicelog.yaml`, or `dicelog.json`
//! Searched in `./` then `~/.config/dicelog/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config},
    schema::{DicelogConfig, PathsConfig, RetentionConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
