//! Heartbeat-based bookie registry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quill_types::stats::StatsRegistry;
use quill_types::BookieId;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{ClusterError, ClusterManager};

/// Gauge name for the size of the last lost set.
pub const LOST_BOOKIES: &str = "lost_bookies";

/// In-process membership registry tracking bookie heartbeats.
///
/// Serving layers call [`register`](Self::register) when a bookie announces
/// itself and [`heartbeat`](Self::heartbeat) on every liveness refresh. A
/// bookie is *active* while registered and *stale* once its last heartbeat
/// is older than the configured window.
pub struct BookieRegistry {
    stale_after: Duration,
    /// Last heartbeat instant per registered bookie.
    members: RwLock<HashMap<BookieId, Instant>>,
    /// Lost set recorded by the most recent audit cycle. Behind an `Arc`
    /// so the gauge closure can sample it without holding the registry.
    lost: Arc<Mutex<HashSet<BookieId>>>,
    started: AtomicBool,
}

impl BookieRegistry {
    /// Create a registry declaring bookies stale after `stale_after`
    /// without a heartbeat.
    pub fn new(stale_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            stale_after,
            members: RwLock::new(HashMap::new()),
            lost: Arc::new(Mutex::new(HashSet::new())),
            started: AtomicBool::new(false),
        })
    }

    /// Register a bookie (or refresh an existing registration).
    pub async fn register(&self, bookie: BookieId) {
        info!(%bookie, "bookie registered");
        self.members.write().await.insert(bookie, Instant::now());
    }

    /// Refresh a bookie's liveness signal. Unknown bookies are ignored.
    pub async fn heartbeat(&self, bookie: &BookieId) {
        if let Some(last_seen) = self.members.write().await.get_mut(bookie) {
            *last_seen = Instant::now();
        } else {
            debug!(%bookie, "heartbeat from unregistered bookie ignored");
        }
    }

    /// Remove a bookie from the registry (graceful departure).
    pub async fn deregister(&self, bookie: &BookieId) {
        if self.members.write().await.remove(bookie).is_some() {
            info!(%bookie, "bookie deregistered");
        }
    }

    /// The lost set recorded by the most recent audit cycle.
    pub fn lost_bookies(&self) -> HashSet<BookieId> {
        self.lost.lock().expect("lost set lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl ClusterManager for BookieRegistry {
    async fn start(&self) -> Result<(), ClusterError> {
        self.started.store(true, Ordering::SeqCst);
        info!(stale_after_secs = self.stale_after.as_secs(), "bookie registry started");
        Ok(())
    }

    fn enable_stats(&self, stats: &Arc<StatsRegistry>) {
        let lost = self.lost.clone();
        stats.register_gauge(LOST_BOOKIES, move || {
            lost.lock().expect("lost set lock poisoned").len() as u64
        });
    }

    async fn active_bookies(&self) -> Result<HashSet<BookieId>, ClusterError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(ClusterError::NotStarted);
        }
        Ok(self.members.read().await.keys().cloned().collect())
    }

    async fn stale_bookies(&self) -> Result<HashSet<BookieId>, ClusterError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(ClusterError::NotStarted);
        }
        let members = self.members.read().await;
        Ok(members
            .iter()
            .filter(|(_, last_seen)| last_seen.elapsed() >= self.stale_after)
            .map(|(bookie, _)| bookie.clone())
            .collect())
    }

    async fn lost_bookies_changed(&self, lost: HashSet<BookieId>) {
        if !lost.is_empty() {
            info!(count = lost.len(), ?lost, "lost bookie set updated");
        }
        *self.lost.lock().expect("lost set lock poisoned") = lost;
    }

    async fn close(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.members.write().await.clear();
        info!("bookie registry closed");
    }
}

impl std::fmt::Debug for BookieRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookieRegistry")
            .field("stale_after", &self.stale_after)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
