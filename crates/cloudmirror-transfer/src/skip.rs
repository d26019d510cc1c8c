//! Local entry exclusion rules
//!
//! One predicate over a bare entry name, used unchanged for files and for
//! directories. A skipped directory is pruned: nothing below it is visited.

use cloudmirror_core::config::SkipConfig;
use cloudmirror_core::domain::SkipReason;

use crate::{Result, TransferError};

/// Decides whether a local (or remote, on download) entry is excluded
#[derive(Debug, Clone)]
pub struct SkipFilter {
    suffixes: Vec<String>,
    patterns: Vec<glob::Pattern>,
}

impl SkipFilter {
    pub fn new(suffixes: Vec<String>, patterns: Vec<glob::Pattern>) -> Self {
        Self { suffixes, patterns }
    }

    /// Builds the filter from configuration
    ///
    /// # Errors
    /// Returns `InvalidRequest` if a glob pattern does not compile
    pub fn from_config(config: &SkipConfig) -> Result<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| {
                    TransferError::InvalidRequest(format!("invalid skip pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let suffixes = config
            .suffixes
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        Ok(Self::new(suffixes, patterns))
    }

    /// Returns why `name` is excluded, or `None` to keep it
    pub fn check(&self, name: &str) -> Option<SkipReason> {
        if name.starts_with('.') {
            return Some(SkipReason::DotFile);
        }
        if name.starts_with('@') || name.ends_with('~') {
            return Some(SkipReason::Temporary);
        }
        if self.suffixes.iter().any(|s| name.ends_with(s.as_str())) {
            return Some(SkipReason::Generated);
        }
        if self.patterns.iter().any(|p| p.matches(name)) {
            return Some(SkipReason::Pattern);
        }
        None
    }

    pub fn should_skip(&self, name: &str) -> bool {
        self.check(name).is_some()
    }
}

impl Default for SkipFilter {
    fn default() -> Self {
        Self::new(SkipConfig::default().suffixes, Vec::new())
    }
}
