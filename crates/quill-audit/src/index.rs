//! The per-cycle bookie → ledgers index.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use quill_meta::{ItemCallback, LedgerManager, LedgerProcessor, MetaError};
use quill_types::{BookieId, CheckCode, LedgerId};
use tokio::sync::oneshot;
use tracing::warn;

use crate::AuditError;

/// Builds the mapping from each bookie to the ledgers it stores.
///
/// The index is built fresh for every audit cycle and discarded afterwards;
/// it must never be reused across cycles, since the lost-bookie computation
/// compares its key set against the *current* active set.
#[async_trait::async_trait]
pub trait BookieLedgerIndexer: Send + Sync {
    /// Build the bookie → ledgers index at scan time.
    async fn bookie_to_ledger_index(
        &self,
    ) -> Result<HashMap<BookieId, HashSet<LedgerId>>, AuditError>;
}

/// Indexer deriving the mapping from ledger metadata: every ledger's
/// ensembles are inverted into per-bookie ledger sets.
pub struct MetaLedgerIndexer {
    ledgers: Arc<dyn LedgerManager>,
}

impl MetaLedgerIndexer {
    /// Create an indexer over the given ledger manager.
    pub fn new(ledgers: Arc<dyn LedgerManager>) -> Self {
        Self { ledgers }
    }
}

struct IndexProcessor {
    ledgers: Arc<dyn LedgerManager>,
    index: Mutex<HashMap<BookieId, HashSet<LedgerId>>>,
}

#[async_trait::async_trait]
impl LedgerProcessor for IndexProcessor {
    async fn process(&self, ledger_id: LedgerId, done: ItemCallback) {
        match self.ledgers.ledger_metadata(ledger_id).await {
            Ok(metadata) => {
                let mut index = self.index.lock().expect("index lock poisoned");
                for bookie in metadata.bookies() {
                    index.entry(bookie).or_default().insert(ledger_id);
                }
                done.complete(CheckCode::Ok);
            }
            Err(MetaError::NoSuchLedger(_)) => {
                // Deleted between enumeration and the metadata read.
                done.complete(CheckCode::Ok);
            }
            Err(e) => {
                warn!(%ledger_id, %e, "couldn't read ledger metadata while indexing");
                done.complete(CheckCode::ReadError);
            }
        }
    }
}

#[async_trait::async_trait]
impl BookieLedgerIndexer for MetaLedgerIndexer {
    async fn bookie_to_ledger_index(
        &self,
    ) -> Result<HashMap<BookieId, HashSet<LedgerId>>, AuditError> {
        let processor = Arc::new(IndexProcessor {
            ledgers: self.ledgers.clone(),
            index: Mutex::new(HashMap::new()),
        });

        let (tx, rx) = oneshot::channel();
        self.ledgers
            .process_ledgers(
                processor.clone(),
                Box::new(move |code| {
                    let _ = tx.send(code);
                }),
                CheckCode::Ok,
                CheckCode::ReadError,
            )
            .await;

        match rx.await {
            Ok(CheckCode::Ok) => {
                let mut index = processor.index.lock().expect("index lock poisoned");
                Ok(std::mem::take(&mut *index))
            }
            Ok(code) => Err(AuditError::Index(code)),
            Err(_) => Err(AuditError::Index(CheckCode::ReadError)),
        }
    }
}
