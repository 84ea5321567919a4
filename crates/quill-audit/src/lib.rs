//! The Quill auditor.
//!
//! The auditor is the singleton control-plane component of a Quill cluster:
//! it watches bookie membership, detects ledgers whose replicas live on
//! failed or stale bookies, and publishes them to the under-replication
//! queue for the replication worker to drain.
//!
//! This crate provides:
//!
//! - [`Auditor`] — lifecycle, the periodic bookie audit, the periodic
//!   all-ledgers check, and the under-replicated snapshot.
//! - [`BookieLedgerIndexer`] / [`MetaLedgerIndexer`] — the per-cycle
//!   bookie → ledgers index built from ledger metadata.
//! - [`AdminSessionFactory`], [`AdminSession`], [`LedgerHandle`],
//!   [`LedgerChecker`] — the read-only data-path surface the ledger check
//!   drives.
//! - [`AuditorConfig`] — TOML-loadable configuration.

mod auditor;
mod client;
mod config;
mod error;
mod index;

pub use auditor::{Auditor, PUBLISHED_UNDERREPLICATED_LEDGERS, UNDERREPLICATED_LEDGERS};
pub use client::{AdminSession, AdminSessionFactory, LedgerChecker, LedgerHandle};
pub use config::{AuditorConfig, ConfigError};
pub use error::{AuditError, ClientError};
pub use index::{BookieLedgerIndexer, MetaLedgerIndexer};
