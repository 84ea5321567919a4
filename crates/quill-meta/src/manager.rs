//! Metadata-plane collaborator traits.

use std::sync::Arc;

use quill_types::{BookieId, CheckCode, LedgerId, LedgerMetadata};
use tokio::sync::oneshot;

use crate::MetaError;

/// Per-item completion callback handed to a [`LedgerProcessor`].
///
/// The processor consumes it with the item's result code. Dropping the
/// callback without completing it tells the traversal the processor has
/// abandoned the run; the manager stops pushing further ledgers.
pub struct ItemCallback {
    tx: oneshot::Sender<CheckCode>,
}

impl ItemCallback {
    /// Create a callback and the receiver the traversal awaits on.
    pub fn new() -> (Self, oneshot::Receiver<CheckCode>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Complete the item with `code`.
    pub fn complete(self, code: CheckCode) {
        let _ = self.tx.send(code);
    }
}

/// Terminal callback of a traversal, invoked exactly once with the
/// aggregate result code.
pub type CompletionCallback = Box<dyn FnOnce(CheckCode) + Send>;

/// Receives each ledger id pushed by [`LedgerManager::process_ledgers`].
#[async_trait::async_trait]
pub trait LedgerProcessor: Send + Sync {
    /// Process one ledger and complete `done` with its result code, or
    /// drop `done` to abandon the whole traversal.
    async fn process(&self, ledger_id: LedgerId, done: ItemCallback);
}

/// Ledger enumeration and metadata lookup.
#[async_trait::async_trait]
pub trait LedgerManager: Send + Sync {
    /// Read the current metadata of one ledger.
    async fn ledger_metadata(&self, ledger_id: LedgerId) -> Result<LedgerMetadata, MetaError>;

    /// Push every known ledger through `processor`, then invoke
    /// `on_complete` exactly once with the aggregate code: `ok_code` when
    /// every item completed [`CheckCode::Ok`], `err_code` otherwise.
    ///
    /// An item completing [`CheckCode::Interrupted`], or a dropped item
    /// callback, stops the traversal early.
    async fn process_ledgers(
        &self,
        processor: Arc<dyn LedgerProcessor>,
        on_complete: CompletionCallback,
        ok_code: CheckCode,
        err_code: CheckCode,
    );
}

/// The durable under-replication queue plus the replication on/off gate.
#[async_trait::async_trait]
pub trait UnderReplicationManager: Send + Sync {
    /// Whether automatic re-replication is currently enabled.
    async fn is_replication_enabled(&self) -> Result<bool, MetaError>;

    /// Resolve once replication is enabled. One-shot: callers re-arm by
    /// calling again.
    async fn wait_replication_enabled(&self) -> Result<(), MetaError>;

    /// Record `ledger_id` as under-replicated with `missing` as the replica
    /// that is gone. Marking the same pair twice is a no-op.
    async fn mark_underreplicated(
        &self,
        ledger_id: LedgerId,
        missing: &BookieId,
    ) -> Result<(), MetaError>;

    /// All under-replication record paths currently present, in the layout
    /// described by [`paths`](crate::paths).
    async fn underreplicated_paths(&self) -> Result<Vec<String>, MetaError>;
}
