//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The transfer engine depends on these traits;
//! their implementations live in backend crates or in the binary.
//!
//! ## Ports Overview
//!
//! - [`IBackendAdapter`] - Remote storage operations (one implementation per backend)
//! - [`IDecisionPolicy`] - Overwrite/descend/delete confirmations
//! - [`ITransferObserver`] - Progress and completion notifications

pub mod backend;
pub mod observer;
pub mod policy;

pub use backend::{
    BackendError, BackendResult, DigestAlgorithm, IBackendAdapter, ListPage, RejectReason,
    UploadSession, UploadTarget,
};
pub use observer::{ITransferObserver, NoopObserver, TracingObserver, TransferMode};
pub use policy::{AlwaysOverwrite, CallbackPolicy, Decision, IDecisionPolicy, NeverOverwrite};
