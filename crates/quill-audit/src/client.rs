//! Read-only data-path surface driven by the ledger check.
//!
//! The check cycle opens its own metadata connection, client and admin
//! handle rather than borrowing the auditor's; [`AdminSessionFactory`]
//! models that dedicated acquisition, and the session is closed on every
//! exit path of the cycle.

use std::collections::HashSet;
use std::sync::Arc;

use quill_types::{CheckCode, LedgerFragment, LedgerId};

use crate::ClientError;

/// A read-only handle to one open ledger.
#[async_trait::async_trait]
pub trait LedgerHandle: Send + Sync {
    /// The ledger this handle refers to.
    fn ledger_id(&self) -> LedgerId;

    /// Release the handle. A no-op for read-only handles on most backends,
    /// but always attempted.
    async fn close(&self) -> Result<(), ClientError>;
}

/// A dedicated admin connection: metadata session plus client.
#[async_trait::async_trait]
pub trait AdminSession: Send + Sync {
    /// Open a ledger read-only, without recovery.
    async fn open_ledger_no_recovery(
        &self,
        ledger_id: LedgerId,
    ) -> Result<Box<dyn LedgerHandle>, ClientError>;

    /// Release the connection and everything opened through it.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Opens dedicated admin sessions against the configured metadata
/// endpoints.
#[async_trait::async_trait]
pub trait AdminSessionFactory: Send + Sync {
    /// Connect a fresh session. The caller owns it and must close it.
    async fn connect(&self) -> Result<Arc<dyn AdminSession>, ClientError>;
}

/// Verifies a ledger's fragments against the bookies that should hold them.
#[async_trait::async_trait]
pub trait LedgerChecker: Send + Sync {
    /// Check every fragment of the ledger behind `handle`, yielding the
    /// result code and the set of fragments judged lost.
    async fn check_ledger(
        &self,
        handle: &dyn LedgerHandle,
    ) -> (CheckCode, HashSet<LedgerFragment>);
}
