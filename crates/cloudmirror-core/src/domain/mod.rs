//! Domain entities
//!
//! This module contains the core domain types for CloudMirror:
//! - Newtypes for validated identifiers and logical paths
//! - Remote and local entry snapshots
//! - The per-file transfer session state machine
//! - Domain-specific error types

pub mod entry;
pub mod errors;
pub mod newtypes;
pub mod session;

// Re-export commonly used types
pub use entry::{EntryKind, LocalTreeNode, RemoteEntry, SkipReason};
pub use errors::DomainError;
pub use newtypes::{LogicalPath, RemoteHandle};
pub use session::{TransferSession, TransferState};
