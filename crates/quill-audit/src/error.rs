//! Error types for the auditor.

use quill_cluster::ClusterError;
use quill_meta::MetaError;
use quill_types::{BookieId, CheckCode, LedgerId};

/// Errors from the read-only admin client used by the ledger check.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The ledger was deleted between enumeration and open.
    #[error("no such ledger: {0}")]
    NoSuchLedger(LedgerId),

    /// The ledger's bookies (or the metadata store) could not be reached.
    #[error("bookie handle unavailable: {0}")]
    Unavailable(String),

    /// The operation was cancelled mid-flight.
    #[error("interrupted")]
    Interrupted,
}

/// Errors from an audit cycle.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The cluster manager could not produce a membership view. Fatal: the
    /// auditor shuts itself down, it cannot operate blind.
    #[error("cluster view error: {0}")]
    Cluster(#[from] ClusterError),

    /// A metadata-plane collaborator failed. Transient: the cycle is
    /// skipped and the next tick retries.
    #[error("metadata error: {0}")]
    Meta(#[from] MetaError),

    /// The admin client failed outside the per-ledger flow.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Publishing a suspected ledger failed; the cycle's remaining
    /// publishes were abandoned.
    #[error("failed to publish under-replicated ledger {ledger_id} of bookie {bookie}: {source}")]
    Publish {
        /// The ledger that could not be published.
        ledger_id: LedgerId,
        /// The bookie whose replica is missing.
        bookie: BookieId,
        /// The underlying failure.
        source: MetaError,
    },

    /// Building the bookie → ledgers index failed.
    #[error("building bookie ledger index failed: {0}")]
    Index(CheckCode),

    /// The all-ledgers check completed with a failure code.
    #[error("ledger check failed: {0}")]
    Check(CheckCode),

    /// The auditor is shutting down; no further work is accepted.
    #[error("auditor is shutting down")]
    Shutdown,
}
