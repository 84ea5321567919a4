//! Metadata-plane interfaces for the Quill control plane.
//!
//! This crate defines the collaborator surfaces the auditor consumes:
//!
//! - [`LedgerManager`] — ledger metadata lookup and the push-based
//!   all-ledgers traversal.
//! - [`UnderReplicationManager`] — the replication enable/disable gate and
//!   the durable queue of ledgers pending repair.
//! - [`paths`] — the on-store layout of under-replication records.
//! - [`MemoryLedgerManager`] / [`MemoryUnderReplicationManager`] — complete
//!   in-process implementations for tests and embedded deployments.

mod error;
mod manager;
mod memory;
pub mod paths;

pub use error::MetaError;
pub use manager::{
    CompletionCallback, ItemCallback, LedgerManager, LedgerProcessor, UnderReplicationManager,
};
pub use memory::{MemoryLedgerManager, MemoryUnderReplicationManager};
