//! TransferSession domain entity
//!
//! This module defines the state machine for one in-flight chunked transfer.
//! A session is owned by the chunked transfer driving it and is discarded
//! when the file commits or fails. It is never persisted: a restarted
//! process always opens a new session.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// State of a chunked transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Size known, no session opened yet
    Init,
    /// Ready to move the chunk starting at `offset`
    ActiveChunk { offset: u64 },
    /// The chunk at `offset` failed transiently and will be re-sent
    Retrying { offset: u64, attempt: u32 },
    /// Final chunk acknowledged
    Committed { size: u64 },
    /// Terminal failure
    Failed { reason: String },
}

impl TransferState {
    /// Short state name, without payload
    pub fn name(&self) -> &'static str {
        match self {
            TransferState::Init => "init",
            TransferState::ActiveChunk { .. } => "active_chunk",
            TransferState::Retrying { .. } => "retrying",
            TransferState::Committed { .. } => "committed",
            TransferState::Failed { .. } => "failed",
        }
    }

    /// Returns true for `Committed` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Committed { .. } | TransferState::Failed { .. }
        )
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferState::Init => write!(f, "init"),
            TransferState::ActiveChunk { offset } => write!(f, "active_chunk({offset})"),
            TransferState::Retrying { offset, attempt } => {
                write!(f, "retrying({offset}, attempt {attempt})")
            }
            TransferState::Committed { size } => write!(f, "committed({size})"),
            TransferState::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// One in-flight chunked transfer
///
/// `offset` only moves forward, and only when a chunk has been acknowledged.
/// A retry keeps the offset where it is, so the next attempt re-sends the
/// same byte range. The transfer is complete exactly when
/// `offset == total_size`; chunks are never counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    /// Backend-assigned session identifier (`None` for downloads)
    session_id: Option<String>,
    /// Bytes committed so far
    offset: u64,
    total_size: u64,
    chunk_size: u64,
    /// Retries spent on the current chunk
    attempt: u32,
    state: TransferState,
}

impl TransferSession {
    /// Creates a session in the `Init` state
    pub fn new(total_size: u64) -> Self {
        Self {
            session_id: None,
            offset: 0,
            total_size,
            chunk_size: 0,
            attempt: 0,
            state: TransferState::Init,
        }
    }

    // --- Getters ---

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    /// Bytes still to be committed
    pub fn remaining(&self) -> u64 {
        self.total_size - self.offset
    }

    /// Length of the chunk starting at the current offset
    pub fn next_chunk_len(&self) -> u64 {
        self.chunk_size.min(self.remaining())
    }

    /// Returns true when the next chunk reaches `total_size`
    pub fn is_final_chunk(&self) -> bool {
        self.offset + self.next_chunk_len() == self.total_size
    }

    // --- Transitions ---

    /// `Init -> ActiveChunk(0)`
    pub fn open(&mut self, session_id: Option<String>, chunk_size: u64) -> Result<(), DomainError> {
        self.expect_state(&["init"], "active_chunk")?;
        if chunk_size == 0 {
            return Err(DomainError::ValidationFailed(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        self.session_id = session_id;
        self.chunk_size = chunk_size;
        self.state = TransferState::ActiveChunk { offset: 0 };
        Ok(())
    }

    /// Records an acknowledged chunk: `ActiveChunk(o) -> ActiveChunk(o + len)`
    pub fn chunk_committed(&mut self, len: u64) -> Result<(), DomainError> {
        self.expect_state(&["active_chunk"], "active_chunk")?;
        if len == 0 || len > self.remaining() {
            return Err(DomainError::ValidationFailed(format!(
                "chunk length {len} invalid at offset {} of {}",
                self.offset, self.total_size
            )));
        }
        self.offset += len;
        self.attempt = 0;
        self.state = TransferState::ActiveChunk {
            offset: self.offset,
        };
        Ok(())
    }

    /// `ActiveChunk(o) -> Retrying(o)`; returns the attempt number
    pub fn retry(&mut self) -> Result<u32, DomainError> {
        self.expect_state(&["active_chunk"], "retrying")?;
        self.attempt += 1;
        self.state = TransferState::Retrying {
            offset: self.offset,
            attempt: self.attempt,
        };
        Ok(self.attempt)
    }

    /// `Retrying(o) -> ActiveChunk(o)`
    pub fn resume(&mut self) -> Result<(), DomainError> {
        self.expect_state(&["retrying"], "active_chunk")?;
        self.state = TransferState::ActiveChunk {
            offset: self.offset,
        };
        Ok(())
    }

    /// `ActiveChunk(total) -> Committed`
    pub fn commit(&mut self) -> Result<(), DomainError> {
        self.expect_state(&["active_chunk"], "committed")?;
        if self.offset != self.total_size {
            return Err(DomainError::InvalidState {
                from: self.state.to_string(),
                to: "committed".to_string(),
            });
        }
        self.state = TransferState::Committed {
            size: self.total_size,
        };
        Ok(())
    }

    /// Any non-terminal state `-> Failed`
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: "failed".to_string(),
            });
        }
        self.state = TransferState::Failed {
            reason: reason.into(),
        };
        Ok(())
    }

    fn expect_state(&self, allowed: &[&str], to: &str) -> Result<(), DomainError> {
        if allowed.contains(&self.state.name()) {
            Ok(())
        } else {
            Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: to.to_string(),
            })
        }
    }
}
