//! Shared types, error model, and configuration for pomwatch.
//!
//! This crate is the foundation depended on by all other pomwatch crates.
//! It provides:
//! - [`PomwatchError`] — the unified error type
//! - Domain types ([`RepoSlug`], [`CatalogEntry`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, DefaultsConfig, ExpanderConfig, GithubConfig, PipelineConfig,
    StoreConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{PomwatchError, Result};
pub use types::{CatalogEntry, RepoSlug};
