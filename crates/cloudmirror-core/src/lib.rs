//! CloudMirror Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `RemoteEntry`, `LogicalPath`, `TransferSession`, `LocalTreeNode`
//! - **Port definitions** - Traits for adapters: `IBackendAdapter`, `IDecisionPolicy`, `ITransferObserver`
//! - **Configuration** - YAML-backed settings with validation
//!
//! # Architecture
//!
//! The domain module contains pure data types with no I/O.
//! Ports define trait interfaces that backend crates implement and
//! that the transfer engine consumes.

pub mod config;
pub mod domain;
pub mod ports;
