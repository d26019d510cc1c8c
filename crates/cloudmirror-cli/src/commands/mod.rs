//! Command implementations and the wiring they share
//!
//! Every command runs against a [`TransferEngine`] built from the loaded
//! configuration: the Graph backend authenticated from an environment
//! variable, the configured skip rules, and the selected overwrite policy.

pub mod delete;
pub mod download;
pub mod upload;

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use cloudmirror_core::config::{BackendConfig, Config, ConfigBuilder};
use cloudmirror_core::ports::{
    AlwaysOverwrite, CallbackPolicy, Decision, IDecisionPolicy, NeverOverwrite,
};
use cloudmirror_graph::client::GraphClient;
use cloudmirror_graph::GraphBackend;
use cloudmirror_transfer::{SkipFilter, TransferEngine, TransferOptions};
use tracing::{debug, info};

/// How existing files are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverwriteMode {
    /// Replace without asking
    Always,
    /// Keep the existing file
    Never,
    /// Prompt on stdin for every overwrite, descent and delete
    Ask,
}

impl OverwriteMode {
    /// Parses the `policy.overwrite` configuration value
    pub fn from_config(value: &str) -> Result<Self> {
        match value {
            "always" => Ok(OverwriteMode::Always),
            "never" => Ok(OverwriteMode::Never),
            "ask" => Ok(OverwriteMode::Ask),
            other => bail!("Unknown overwrite policy '{other}'"),
        }
    }

    /// The `policy.overwrite` configuration value for this mode
    pub fn as_config(self) -> &'static str {
        match self {
            OverwriteMode::Always => "always",
            OverwriteMode::Never => "never",
            OverwriteMode::Ask => "ask",
        }
    }

    pub fn policy(self) -> Arc<dyn IDecisionPolicy> {
        match self {
            OverwriteMode::Always => Arc::new(AlwaysOverwrite),
            OverwriteMode::Never => Arc::new(NeverOverwrite),
            OverwriteMode::Ask => Arc::new(CallbackPolicy::new(|decision: &Decision| {
                let stdin = std::io::stdin();
                prompt(decision, &mut stdin.lock(), &mut std::io::stderr())
            })),
        }
    }
}

/// Asks a yes/no question, defaulting to no
fn prompt(decision: &Decision, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    let question = decision.to_string();
    let mut chars = question.chars();
    let question = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => question,
    };
    if write!(output, "{question}? [y/N] ")
        .and_then(|()| output.flush())
        .is_err()
    {
        return false;
    }

    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            debug!(error = %e, "Could not read answer, declining");
            false
        }
    }
}

/// Loads the configuration, applies command-line overrides and validates
///
/// An explicit path must exist. Without one the default location is tried
/// and defaults are used when it is missing. `overwrite` wins over the
/// configured policy.
pub fn load_config(path: Option<&Path>, overwrite: Option<OverwriteMode>) -> Result<Config> {
    let loaded = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path()),
    };

    let mut builder = ConfigBuilder::from(loaded);
    if let Some(mode) = overwrite {
        builder = builder.policy_overwrite(mode.as_config());
    }
    builder.build_validated().map_err(|errors| {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::anyhow!("Invalid configuration: {}", details.join("; "))
    })
}

/// Builds the Graph backend from the token in the configured variable
pub fn build_backend(config: &BackendConfig) -> Result<GraphBackend> {
    let token = std::env::var(&config.access_token_env).with_context(|| {
        format!(
            "No access token: set the {} environment variable",
            config.access_token_env
        )
    })?;
    if token.trim().is_empty() {
        bail!("The {} environment variable is empty", config.access_token_env);
    }

    let client = match &config.base_url {
        Some(base_url) => GraphClient::with_base_url(token, base_url.as_str()),
        None => GraphClient::new(token),
    };
    info!(backend = %config.kind, "Backend configured");
    Ok(GraphBackend::new(client))
}

/// Builds the engine for one run
pub fn build_engine(config: &Config) -> Result<TransferEngine> {
    let mode = OverwriteMode::from_config(&config.policy.overwrite)?;
    let skip = SkipFilter::from_config(&config.skip).context("Invalid skip rules")?;
    let backend = build_backend(&config.backend)?;

    Ok(
        TransferEngine::new(Arc::new(backend), TransferOptions::from_config(&config.transfer))
            .with_skip_filter(skip)
            .with_policy(mode.policy()),
    )
}
