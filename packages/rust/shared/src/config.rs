//! Application configuration for pomwatch.
//!
//! User config lives at `~/.pomwatch/pomwatch.toml`.
//! CLI flags override environment variables (`BOOSTER_CATALOG`,
//! `GITHUB_ACCESS_TOKEN`, `AWS_S3_*`), which override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PomwatchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pomwatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pomwatch";

// ---------------------------------------------------------------------------
// Config structs (matching pomwatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults for the publish pipeline.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Booster catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// GitHub API settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Effective-POM build tool settings.
    #[serde(default)]
    pub expander: ExpanderConfig,

    /// Object store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Recency window in days; repositories untouched for longer are skipped.
    #[serde(default = "default_days")]
    pub days: i64,

    /// Pause in milliseconds between catalog entries.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Descriptor file fetched from each repository.
    #[serde(default = "default_descriptor")]
    pub descriptor: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            days: default_days(),
            delay_ms: default_delay_ms(),
            descriptor: default_descriptor(),
        }
    }
}

fn default_days() -> i64 {
    31
}
fn default_delay_ms() -> u64 {
    2000
}
fn default_descriptor() -> String {
    "pom.xml".into()
}

/// `[catalog]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the booster catalog repository. The `BOOSTER_CATALOG`
    /// env var and the `--catalog` flag override this.
    #[serde(default)]
    pub url: String,
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// GitHub REST API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Name of the env var holding the access token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_ACCESS_TOKEN".into()
}

/// `[expander]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpanderConfig {
    /// Build tool program used to expand descriptors.
    #[serde(default = "default_program")]
    pub program: String,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

fn default_program() -> String {
    "mvn".into()
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Bucket holding expanded descriptors.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Bucket region. The `AWS_S3_REGION` env var overrides this.
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for local development; unset means the real service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Local-development mode: path-style addressing, plain HTTP, no encryption.
    #[serde(default)]
    pub local_dev: bool,

    /// Server-side encryption algorithm; empty disables encryption.
    #[serde(default = "default_encryption")]
    pub encryption: String,

    /// Whether the bucket has versioning enabled.
    #[serde(default = "default_true")]
    pub versioned: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            endpoint: None,
            local_dev: false,
            encryption: default_encryption(),
            versioned: true,
        }
    }
}

fn default_bucket() -> String {
    "boosters-manifest".into()
}
fn default_region() -> String {
    "us-east-1".into()
}
fn default_encryption() -> String {
    "aws:kms".into()
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Recency window in days.
    pub days: i64,
    /// Pause in milliseconds between catalog entries.
    pub delay_ms: u64,
    /// Descriptor file fetched from each repository.
    pub descriptor: String,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            days: config.defaults.days,
            delay_ms: config.defaults.delay_ms,
            descriptor: config.defaults.descriptor.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pomwatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PomwatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pomwatch/pomwatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PomwatchError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PomwatchError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Refuses to overwrite an existing file unless `force` is set.
/// Returns the path to the created file.
pub fn init_config(force: bool) -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PomwatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        return Err(PomwatchError::config(format!(
            "config file already exists at {}; pass --force to overwrite",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PomwatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PomwatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("boosters-manifest"));
        assert!(toml_str.contains("GITHUB_ACCESS_TOKEN"));
        assert!(toml_str.contains("pom.xml"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.days, 31);
        assert_eq!(parsed.defaults.delay_ms, 2000);
        assert_eq!(parsed.github.api_url, "https://api.github.com");
        assert_eq!(parsed.store.region, "us-east-1");
        assert!(parsed.store.versioned);
    }

    #[test]
    fn config_with_sections() {
        let toml_str = r#"
[defaults]
days = 7

[catalog]
url = "https://github.com/acme/booster-catalog"

[store]
bucket = "staging-manifests"
local_dev = true
endpoint = "127.0.0.1:9000"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.days, 7);
        assert_eq!(config.defaults.delay_ms, 2000);
        assert_eq!(config.catalog.url, "https://github.com/acme/booster-catalog");
        assert_eq!(config.store.bucket, "staging-manifests");
        assert!(config.store.local_dev);
        assert_eq!(config.store.endpoint.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(config.store.encryption, "aws:kms");
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.days, 31);
        assert_eq!(pipeline.delay_ms, 2000);
        assert_eq!(pipeline.descriptor, "pom.xml");
    }
}
