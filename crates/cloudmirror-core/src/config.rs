//! Configuration module for CloudMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for CloudMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transfer: TransferConfig,
    pub skip: SkipConfig,
    pub policy: PolicyConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

/// Chunked transfer and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Files at or above this size (in MiB) use a resumable session.
    pub threshold_mb: u64,
    /// Size of each download range request (in MiB).
    pub download_chunk_size_mb: u64,
    /// Retries allowed per chunk before the transfer fails.
    pub max_attempts: u32,
    /// First retry delay in milliseconds; doubles on every attempt.
    pub retry_base_delay_ms: u64,
    /// Upper bound on a single retry delay in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Skip uploads whose remote copy has the same size and mtime.
    pub skip_unchanged: bool,
}

/// Local entry exclusion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipConfig {
    /// Generated-artifact name suffixes, applied to files and directories.
    pub suffixes: Vec<String>,
    /// Glob patterns matched against entry names.
    pub patterns: Vec<String>,
}

/// Confirmation policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Overwrite policy: `always`, `never`, or `ask`.
    pub overwrite: String,
}

/// Backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend kind. Only `onedrive` is built in.
    pub kind: String,
    /// Override for the API base URL.
    pub base_url: Option<String>,
    /// Environment variable holding the access token.
    pub access_token_env: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/cloudmirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cloudmirror")
            .join("config.yaml")
    }
}

impl TransferConfig {
    /// Session threshold in bytes.
    pub fn threshold_bytes(&self) -> u64 {
        self.threshold_mb.saturating_mul(MIB)
    }

    /// Download range size in bytes.
    pub fn download_chunk_size_bytes(&self) -> u64 {
        self.download_chunk_size_mb.saturating_mul(MIB)
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            threshold_mb: 32,
            download_chunk_size_mb: 32,
            max_attempts: 5,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            skip_unchanged: false,
        }
    }
}

impl Default for SkipConfig {
    fn default() -> Self {
        Self {
            suffixes: vec![
                ".pyc".to_string(),
                ".pyo".to_string(),
                "__pycache__".to_string(),
            ],
            patterns: Vec::new(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            overwrite: "always".to_string(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: "onedrive".to_string(),
            base_url: None,
            access_token_env: "CLOUDMIRROR_ACCESS_TOKEN".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"transfer.threshold_mb"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `policy.overwrite`.
pub const VALID_OVERWRITE_POLICIES: &[&str] = &["always", "never", "ask"];

/// Valid values for `backend.kind`.
const VALID_BACKENDS: &[&str] = &["onedrive"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- transfer ---
        if self.transfer.threshold_mb == 0 {
            errors.push(ValidationError {
                field: "transfer.threshold_mb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.transfer.download_chunk_size_mb == 0 {
            errors.push(ValidationError {
                field: "transfer.download_chunk_size_mb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.transfer.max_attempts == 0 {
            errors.push(ValidationError {
                field: "transfer.max_attempts".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.transfer.retry_base_delay_ms > self.transfer.retry_max_delay_ms {
            errors.push(ValidationError {
                field: "transfer.retry_base_delay_ms".into(),
                message: format!(
                    "must not exceed retry_max_delay_ms ({})",
                    self.transfer.retry_max_delay_ms
                ),
            });
        }

        // --- skip ---
        for (i, suffix) in self.skip.suffixes.iter().enumerate() {
            if suffix.is_empty() {
                errors.push(ValidationError {
                    field: format!("skip.suffixes[{i}]"),
                    message: "must not be empty".into(),
                });
            }
        }
        for (i, pattern) in self.skip.patterns.iter().enumerate() {
            if let Err(e) = glob::Pattern::new(pattern) {
                errors.push(ValidationError {
                    field: format!("skip.patterns[{i}]"),
                    message: format!("invalid glob pattern '{pattern}': {e}"),
                });
            }
        }

        // --- policy ---
        if !VALID_OVERWRITE_POLICIES.contains(&self.policy.overwrite.as_str()) {
            errors.push(ValidationError {
                field: "policy.overwrite".into(),
                message: format!(
                    "must be one of {:?}, got '{}'",
                    VALID_OVERWRITE_POLICIES, self.policy.overwrite
                ),
            });
        }

        // --- backend ---
        if !VALID_BACKENDS.contains(&self.backend.kind.as_str()) {
            errors.push(ValidationError {
                field: "backend.kind".into(),
                message: format!(
                    "must be one of {:?}, got '{}'",
                    VALID_BACKENDS, self.backend.kind
                ),
            });
        }
        if self.backend.access_token_env.is_empty() {
            errors.push(ValidationError {
                field: "backend.access_token_env".into(),
                message: "must not be empty".into(),
            });
        }
        if let Some(base_url) = &self.backend.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                errors.push(ValidationError {
                    field: "backend.base_url".into(),
                    message: format!("must be an http(s) URL, got '{base_url}'"),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "must be one of {:?}, got '{}'",
                    VALID_LOG_LEVELS, self.logging.level
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use cloudmirror_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .transfer_threshold_mb(64)
///     .transfer_max_attempts(10)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- transfer ---

    pub fn transfer_threshold_mb(mut self, mb: u64) -> Self {
        self.config.transfer.threshold_mb = mb;
        self
    }

    pub fn transfer_download_chunk_size_mb(mut self, mb: u64) -> Self {
        self.config.transfer.download_chunk_size_mb = mb;
        self
    }

    pub fn transfer_max_attempts(mut self, n: u32) -> Self {
        self.config.transfer.max_attempts = n;
        self
    }

    pub fn transfer_retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.transfer.retry_base_delay_ms = base;
        self.config.transfer.retry_max_delay_ms = max;
        self
    }

    pub fn transfer_skip_unchanged(mut self, enabled: bool) -> Self {
        self.config.transfer.skip_unchanged = enabled;
        self
    }

    // --- skip ---

    pub fn skip_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.skip.suffixes.push(suffix.into());
        self
    }

    pub fn skip_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.skip.patterns.push(pattern.into());
        self
    }

    // --- policy ---

    pub fn policy_overwrite(mut self, policy: impl Into<String>) -> Self {
        self.config.policy.overwrite = policy.into();
        self
    }

    // --- backend ---

    pub fn backend_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend.base_url = Some(url.into());
        self
    }

    pub fn backend_access_token_env(mut self, var: impl Into<String>) -> Self {
        self.config.backend.access_token_env = var.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts from an already loaded configuration, e.g. to layer command-line
/// overrides on top of the file.
impl From<Config> for ConfigBuilder {
    fn from(config: Config) -> Self {
        Self { config }
    }
}
