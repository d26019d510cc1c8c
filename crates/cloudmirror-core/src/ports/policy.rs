//! Decision policy port
//!
//! Overwrite, descend and delete confirmations are injected rather than
//! read from a terminal, so the engine runs unattended and under test.
//! A declined decision is never an error: the engine skips the file,
//! prunes the subtree, or leaves the remote entry in place.

use std::fmt;

/// A question the engine asks before a destructive or expanding step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Replace an existing file (remote on upload, local on download)
    Overwrite { path: String },
    /// Walk into a subfolder during upload or download
    Descend { path: String },
    /// Remove a remote entry and everything below it
    Delete { path: String },
}

impl Decision {
    pub fn path(&self) -> &str {
        match self {
            Decision::Overwrite { path } | Decision::Descend { path } | Decision::Delete { path } => {
                path
            }
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Overwrite { path } => write!(f, "overwrite {path}"),
            Decision::Descend { path } => write!(f, "descend into {path}"),
            Decision::Delete { path } => write!(f, "delete {path}"),
        }
    }
}

/// Port trait answering engine confirmations
pub trait IDecisionPolicy: Send + Sync {
    /// Returns true to proceed
    fn confirm(&self, decision: &Decision) -> bool;
}

/// Confirms every decision
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOverwrite;

impl IDecisionPolicy for AlwaysOverwrite {
    fn confirm(&self, _decision: &Decision) -> bool {
        true
    }
}

/// Declines overwrites, confirms everything else
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverOverwrite;

impl IDecisionPolicy for NeverOverwrite {
    fn confirm(&self, decision: &Decision) -> bool {
        !matches!(decision, Decision::Overwrite { .. })
    }
}

/// Delegates every decision to a closure
pub struct CallbackPolicy<F> {
    callback: F,
}

impl<F> CallbackPolicy<F>
where
    F: Fn(&Decision) -> bool + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> IDecisionPolicy for CallbackPolicy<F>
where
    F: Fn(&Decision) -> bool + Send + Sync,
{
    fn confirm(&self, decision: &Decision) -> bool {
        (self.callback)(decision)
    }
}

impl<F> fmt::Debug for CallbackPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackPolicy").finish_non_exhaustive()
    }
}
