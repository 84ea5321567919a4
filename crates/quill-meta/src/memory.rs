//! In-memory manager implementations.
//!
//! Used by the end-to-end tests and by embedded single-process deployments.
//! Both managers present the same surface as their store-backed
//! counterparts, so the auditor cannot tell them apart.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use quill_types::{BookieId, CheckCode, LedgerId, LedgerMetadata};
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use crate::manager::{
    CompletionCallback, ItemCallback, LedgerManager, LedgerProcessor, UnderReplicationManager,
};
use crate::{paths, MetaError};

/// In-memory ledger catalogue.
pub struct MemoryLedgerManager {
    ledgers: RwLock<BTreeMap<LedgerId, LedgerMetadata>>,
}

impl MemoryLedgerManager {
    /// Create an empty catalogue.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ledgers: RwLock::new(BTreeMap::new()),
        })
    }

    /// Add (or replace) a ledger and its metadata.
    pub async fn create_ledger(&self, ledger_id: LedgerId, metadata: LedgerMetadata) {
        self.ledgers.write().await.insert(ledger_id, metadata);
    }

    /// Remove a ledger, as deletion would.
    pub async fn remove_ledger(&self, ledger_id: LedgerId) {
        self.ledgers.write().await.remove(&ledger_id);
    }

    /// Current ledger ids in ascending order.
    pub async fn ledger_ids(&self) -> Vec<LedgerId> {
        self.ledgers.read().await.keys().copied().collect()
    }
}

#[async_trait::async_trait]
impl LedgerManager for MemoryLedgerManager {
    async fn ledger_metadata(&self, ledger_id: LedgerId) -> Result<LedgerMetadata, MetaError> {
        self.ledgers
            .read()
            .await
            .get(&ledger_id)
            .cloned()
            .ok_or(MetaError::NoSuchLedger(ledger_id))
    }

    async fn process_ledgers(
        &self,
        processor: Arc<dyn LedgerProcessor>,
        on_complete: CompletionCallback,
        ok_code: CheckCode,
        err_code: CheckCode,
    ) {
        // Snapshot the enumeration; ledgers created or deleted mid-traversal
        // are picked up by the next one.
        let ids = self.ledger_ids().await;
        let mut aggregate = ok_code;

        for ledger_id in ids {
            let (done, outcome) = ItemCallback::new();
            processor.process(ledger_id, done).await;
            match outcome.await {
                Ok(CheckCode::Ok) => {}
                Ok(CheckCode::Interrupted) => {
                    debug!(%ledger_id, "ledger traversal interrupted");
                    aggregate = err_code;
                    break;
                }
                Ok(code) => {
                    debug!(%ledger_id, %code, "ledger completed with failure code");
                    aggregate = err_code;
                }
                Err(_) => {
                    // Callback dropped: the processor abandoned the run.
                    debug!(%ledger_id, "ledger traversal abandoned by processor");
                    on_complete(err_code);
                    return;
                }
            }
        }

        on_complete(aggregate);
    }
}

/// State of the in-memory under-replication manager.
struct UnderReplicationState {
    enabled: bool,
    /// Ledger → replicas reported missing for it.
    records: BTreeMap<LedgerId, BTreeSet<BookieId>>,
}

/// In-memory under-replication queue with the enable/disable gate.
pub struct MemoryUnderReplicationManager {
    root: String,
    state: Mutex<UnderReplicationState>,
    enabled_notify: Notify,
}

impl MemoryUnderReplicationManager {
    /// Create an enabled, empty manager rooted at `root`.
    pub fn new(root: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            state: Mutex::new(UnderReplicationState {
                enabled: true,
                records: BTreeMap::new(),
            }),
            enabled_notify: Notify::new(),
        })
    }

    /// Toggle automatic re-replication. Enabling wakes all pending
    /// [`wait_replication_enabled`](UnderReplicationManager::wait_replication_enabled)
    /// callers.
    pub fn set_replication_enabled(&self, enabled: bool) {
        self.state.lock().expect("ur state lock poisoned").enabled = enabled;
        if enabled {
            self.enabled_notify.notify_waiters();
        }
    }

    /// Remove a ledger's record, as the replication worker does once the
    /// ledger has been fully re-replicated.
    pub fn mark_replicated(&self, ledger_id: LedgerId) {
        self.state
            .lock()
            .expect("ur state lock poisoned")
            .records
            .remove(&ledger_id);
    }

    /// Current records: ledger → missing replicas.
    pub fn records(&self) -> BTreeMap<LedgerId, BTreeSet<BookieId>> {
        self.state
            .lock()
            .expect("ur state lock poisoned")
            .records
            .clone()
    }

    /// Whether `ledger_id` is marked with `bookie` as a missing replica.
    pub fn contains(&self, ledger_id: LedgerId, bookie: &BookieId) -> bool {
        self.state
            .lock()
            .expect("ur state lock poisoned")
            .records
            .get(&ledger_id)
            .is_some_and(|missing| missing.contains(bookie))
    }
}

#[async_trait::async_trait]
impl UnderReplicationManager for MemoryUnderReplicationManager {
    async fn is_replication_enabled(&self) -> Result<bool, MetaError> {
        Ok(self.state.lock().expect("ur state lock poisoned").enabled)
    }

    async fn wait_replication_enabled(&self) -> Result<(), MetaError> {
        loop {
            // Arm the notification before checking so an enable between the
            // check and the await is not missed.
            let enabled = self.enabled_notify.notified();
            if self.state.lock().expect("ur state lock poisoned").enabled {
                return Ok(());
            }
            enabled.await;
        }
    }

    async fn mark_underreplicated(
        &self,
        ledger_id: LedgerId,
        missing: &BookieId,
    ) -> Result<(), MetaError> {
        let mut state = self.state.lock().expect("ur state lock poisoned");
        let fresh = state
            .records
            .entry(ledger_id)
            .or_default()
            .insert(missing.clone());
        if fresh {
            debug!(%ledger_id, %missing, "ledger marked under-replicated");
        }
        Ok(())
    }

    async fn underreplicated_paths(&self) -> Result<Vec<String>, MetaError> {
        let state = self.state.lock().expect("ur state lock poisoned");
        Ok(state
            .records
            .keys()
            .map(|id| paths::underreplicated_ledger_path(&self.root, *id))
            .collect())
    }
}
