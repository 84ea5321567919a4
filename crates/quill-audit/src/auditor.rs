//! The [`Auditor`]: singleton detector of under-replicated ledgers.
//!
//! One auditor runs per cluster (leadership is decided elsewhere). It owns
//! two serial lanes: the bookie lane runs bookie audits and the full ledger
//! check, the UR lane refreshes the under-replicated snapshot. Everything
//! the auditor learns is published to the under-replication queue; the
//! replication worker drains it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use quill_cluster::{BookieRegistry, ClusterManager};
use quill_meta::{
    paths, CompletionCallback, ItemCallback, LedgerManager, LedgerProcessor,
    UnderReplicationManager,
};
use quill_sched::{Lane, TaskHandle};
use quill_types::stats::{Counter, StatsRegistry};
use quill_types::{BookieId, CheckCode, LedgerId};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::client::{AdminSession, AdminSessionFactory, LedgerChecker};
use crate::config::AuditorConfig;
use crate::index::{BookieLedgerIndexer, MetaLedgerIndexer};
use crate::AuditError;

/// Counter: ledgers published as under-replicated by the current bookie
/// audit cycle. Cleared at the start of every cycle.
pub const PUBLISHED_UNDERREPLICATED_LEDGERS: &str = "published_underreplicated_ledgers";

/// Gauge: size of the last under-replicated snapshot; 0 before the first.
pub const UNDERREPLICATED_LEDGERS: &str = "underreplicated_ledgers";

/// How long each graceful-termination slice waits before escalating.
const SHUTDOWN_SLICE: Duration = Duration::from_secs(30);

/// The cluster auditor.
pub struct Auditor {
    identifier: String,
    config: AuditorConfig,
    cluster: Arc<dyn ClusterManager>,
    /// Whether the cluster manager was self-constructed (and is therefore
    /// ours to close on shutdown) rather than injected.
    owns_cluster: bool,
    ledgers: Arc<dyn LedgerManager>,
    indexer: Arc<dyn BookieLedgerIndexer>,
    underreplication: Arc<dyn UnderReplicationManager>,
    admin_factory: Arc<dyn AdminSessionFactory>,
    checker: Arc<dyn LedgerChecker>,
    bookie_lane: Arc<Lane>,
    ur_lane: Arc<Lane>,
    stats: Arc<StatsRegistry>,
    published: Arc<Counter>,
    /// Last under-replicated snapshot, replaced wholesale by the
    /// snapshotter; the gauge samples its size from any thread.
    underreplicated: Arc<RwLock<Option<HashSet<LedgerId>>>>,
    /// Self-reference handed to lane tasks, so queued work does not keep
    /// a dropped auditor alive.
    weak: Weak<Auditor>,
}

impl Auditor {
    /// Create an auditor.
    ///
    /// When `cluster` is `None` a [`BookieRegistry`] is constructed and
    /// owned (it is closed on shutdown); an injected manager is never
    /// closed. When `indexer` is `None` the index is derived from
    /// `ledgers` metadata.
    ///
    /// Must be called from within a tokio runtime (the lanes spawn their
    /// workers immediately).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identifier: impl Into<String>,
        config: AuditorConfig,
        ledgers: Arc<dyn LedgerManager>,
        underreplication: Arc<dyn UnderReplicationManager>,
        admin_factory: Arc<dyn AdminSessionFactory>,
        checker: Arc<dyn LedgerChecker>,
        cluster: Option<Arc<dyn ClusterManager>>,
        indexer: Option<Arc<dyn BookieLedgerIndexer>>,
        stats: Arc<StatsRegistry>,
    ) -> Arc<Self> {
        let identifier = identifier.into();

        let underreplicated: Arc<RwLock<Option<HashSet<LedgerId>>>> =
            Arc::new(RwLock::new(None));
        let snapshot = underreplicated.clone();
        stats.register_gauge(UNDERREPLICATED_LEDGERS, move || {
            snapshot
                .read()
                .expect("snapshot lock poisoned")
                .as_ref()
                .map_or(0, |ledgers| ledgers.len() as u64)
        });
        let published = stats.counter(PUBLISHED_UNDERREPLICATED_LEDGERS);

        let owns_cluster = cluster.is_none();
        let cluster: Arc<dyn ClusterManager> = match cluster {
            Some(cluster) => cluster,
            None => BookieRegistry::new(config.stale_window()),
        };
        let indexer: Arc<dyn BookieLedgerIndexer> = match indexer {
            Some(indexer) => indexer,
            None => Arc::new(MetaLedgerIndexer::new(ledgers.clone())),
        };

        Arc::new_cyclic(|weak| Self {
            cluster,
            owns_cluster,
            indexer,
            bookie_lane: Lane::new(format!("audit-bookie-{identifier}")),
            ur_lane: Lane::new(format!("audit-ur-{identifier}")),
            identifier,
            config,
            ledgers,
            underreplication,
            admin_factory,
            checker,
            stats,
            published,
            underreplicated,
            weak: weak.clone(),
        })
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Start the auditor: bring up the cluster manager and schedule the
    /// periodic tasks. Returns without effect if the auditor has already
    /// shut down; a cluster manager start failure leaves the auditor
    /// shutting itself down (observable via [`is_running`](Self::is_running)).
    pub async fn start(&self) {
        info!(id = %self.identifier, "starting as cluster auditor");
        if self.bookie_lane.is_shutdown() {
            return;
        }

        self.cluster.enable_stats(&self.stats);
        if let Err(e) = self.cluster.start().await {
            error!(%e, "couldn't start cluster manager, exiting");
            self.submit_shutdown_task();
            return;
        }

        match self.config.ledger_check_interval() {
            Some(interval) => {
                info!(
                    interval_secs = interval.as_secs(),
                    "periodic ledger checking enabled"
                );
                let auditor = self.weak.clone();
                self.bookie_lane
                    .schedule_at_fixed_rate(Duration::ZERO, interval, move || {
                        let auditor = auditor.clone();
                        async move {
                            if let Some(auditor) = auditor.upgrade() {
                                auditor.ledger_check_task().await;
                            }
                        }
                    });
            }
            None => info!("periodic ledger checking disabled"),
        }

        match self.config.bookie_check_interval() {
            Some(interval) => {
                info!(
                    interval_secs = interval.as_secs(),
                    "periodic bookie checking enabled"
                );
                let auditor = self.weak.clone();
                self.bookie_lane
                    .schedule_at_fixed_rate(Duration::ZERO, interval, move || {
                        let auditor = auditor.clone();
                        async move {
                            if let Some(auditor) = auditor.upgrade() {
                                auditor.bookie_check_task().await;
                            }
                        }
                    });
            }
            None => {
                info!("periodic bookie checking disabled, running one check now");
                let auditor = self.weak.clone();
                let submitted = self.bookie_lane.submit(async move {
                    if let Some(auditor) = auditor.upgrade() {
                        auditor.bookie_check_task().await;
                    }
                });
                if submitted.is_err() {
                    warn!("couldn't submit startup bookie check");
                }
            }
        }

        if let Some(interval) = self.config.ur_check_interval() {
            info!(
                interval_secs = interval.as_secs(),
                "periodic under-replicated ledger checking enabled"
            );
            let auditor = self.weak.clone();
            self.ur_lane
                .schedule_at_fixed_rate(Duration::ZERO, interval, move || {
                    let auditor = auditor.clone();
                    async move {
                        if let Some(auditor) = auditor.upgrade() {
                            auditor.run_underreplicated_snapshot().await;
                        }
                    }
                });
        }
    }

    /// Enqueue a one-shot bookie audit. When the auditor has shut down the
    /// returned handle already carries the failure.
    pub fn submit_audit_task(&self) -> TaskHandle<Result<(), AuditError>> {
        let auditor = self.weak.clone();
        let task = async move {
            let Some(auditor) = auditor.upgrade() else {
                return Err(AuditError::Shutdown);
            };
            let result = auditor.run_bookie_audit().await;
            if let Err(e) = &result {
                error!(%e, "audit task failed");
            }
            result
        };
        match self.bookie_lane.submit(task) {
            Ok(handle) => handle,
            Err(_) => TaskHandle::ready(Err(AuditError::Shutdown)),
        }
    }

    /// Request shutdown from inside the bookie lane, so that no running
    /// audit ever observes a half-shut lane. Idempotent.
    pub fn submit_shutdown_task(&self) {
        if self.bookie_lane.is_shutdown() {
            return;
        }
        let lane = self.bookie_lane.clone();
        if self.bookie_lane.submit(async move { lane.shutdown() }).is_err() {
            debug!("shutdown already requested");
        }
    }

    /// Shut the auditor down, waiting for in-flight work in bounded slices
    /// and escalating to forced cancellation when a slice elapses.
    pub async fn shutdown(&self) {
        info!(id = %self.identifier, "shutting down auditor");
        self.submit_shutdown_task();

        while !self.bookie_lane.await_termination(SHUTDOWN_SLICE).await {
            warn!("audit executor not terminating, cancelling in-flight tasks");
            self.bookie_lane.shutdown_now();
            self.ur_lane.shutdown_now();
        }

        // The snapshot lane carries no audit state; stop it once the bookie
        // lane has drained.
        self.ur_lane.shutdown();
        self.ur_lane.await_termination(SHUTDOWN_SLICE).await;

        if self.owns_cluster {
            self.cluster.close().await;
        }
        info!(id = %self.identifier, "auditor shut down");
    }

    /// Whether the auditor is still accepting audit work.
    pub fn is_running(&self) -> bool {
        !self.bookie_lane.is_shutdown()
    }

    /// The last under-replicated snapshot, if one has been taken.
    pub fn underreplicated_ledgers(&self) -> Option<HashSet<LedgerId>> {
        self.underreplicated
            .read()
            .expect("snapshot lock poisoned")
            .clone()
    }

    // -------------------------------------------------------------------
    // Bookie audit cycle
    // -------------------------------------------------------------------

    /// Periodic bookie-check wrapper: a cluster view failure is fatal,
    /// everything else is retried on the next tick.
    pub(crate) async fn bookie_check_task(&self) {
        match self.run_bookie_audit().await {
            Ok(()) => {}
            Err(e @ AuditError::Cluster(_)) => {
                error!(%e, "couldn't read cluster view, shutting down auditor");
                self.submit_shutdown_task();
            }
            Err(e) => error!(%e, "bookie audit failed"),
        }
    }

    /// One pass of "find lost bookies and publish their ledgers".
    ///
    /// Returns a boxed future (rather than `async fn`'s opaque type) because
    /// this function can requeue [`bookie_check_task`](Self::bookie_check_task),
    /// which awaits this function directly; an opaque `impl Future` cannot
    /// be defined in terms of itself, so one side of the cycle must be
    /// named explicitly.
    pub(crate) fn run_bookie_audit(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), AuditError>> + Send + '_>>
    {
        Box::pin(async move {
            info!("auditing bookies");

            match self.underreplication.is_replication_enabled().await {
                Ok(true) => {}
                Ok(false) => {
                    info!("ledger re-replication disabled, waiting until it is re-enabled");
                    if let Err(e) = self.underreplication.wait_replication_enabled().await {
                        error!(%e, "under-replication manager unavailable, skipping audit until next tick");
                        return Ok(());
                    }
                }
                Err(e) => {
                    error!(%e, "under-replication manager unavailable, skipping audit until next tick");
                    return Ok(());
                }
            }

            let index = self.indexer.bookie_to_ledger_index().await?;

            match self.underreplication.is_replication_enabled().await {
                Ok(true) => {}
                Ok(false) => {
                    // Disabled while the index was building. The view may be
                    // stale by the time replication comes back, so this run is
                    // discarded and a fresh audit queued in its place.
                    info!("re-replication disabled during indexing, requeueing bookie audit");
                    let auditor = self.weak.clone();
                    let requeued = self.bookie_lane.submit(async move {
                        if let Some(auditor) = auditor.upgrade() {
                            auditor.bookie_check_task().await;
                        }
                    });
                    if requeued.is_err() {
                        warn!("couldn't requeue bookie audit");
                    }
                    return Ok(());
                }
                Err(e) => {
                    error!(%e, "under-replication manager unavailable, skipping audit until next tick");
                    return Ok(());
                }
            }

            let lost = self.find_lost_bookies(&index).await?;
            // The counter reflects this cycle only.
            self.published.clear();

            if lost.is_empty() {
                info!("no bookie is suspected to have failed");
                return Ok(());
            }

            info!(?lost, "failed bookies found, publishing their ledgers");
            for bookie in &lost {
                let ledgers = index.get(bookie).cloned().unwrap_or_default();
                publish_suspected_ledgers(&self.underreplication, &self.published, bookie, &ledgers)
                    .await?;
            }
            Ok(())
        })
    }

    /// `lost = stale ∪ (indexed − active)`, pushed to the cluster manager.
    async fn find_lost_bookies(
        &self,
        index: &HashMap<BookieId, HashSet<LedgerId>>,
    ) -> Result<HashSet<BookieId>, AuditError> {
        let stale = self.cluster.stale_bookies().await?;
        let active = self.cluster.active_bookies().await?;

        let mut lost = stale;
        lost.extend(
            index
                .keys()
                .filter(|bookie| !active.contains(*bookie))
                .cloned(),
        );
        self.cluster.lost_bookies_changed(lost.clone()).await;
        Ok(lost)
    }

    // -------------------------------------------------------------------
    // Ledger check cycle
    // -------------------------------------------------------------------

    /// Periodic ledger-check wrapper.
    async fn ledger_check_task(&self) {
        info!("running periodic ledger check");
        match self.underreplication.is_replication_enabled().await {
            Ok(true) => {}
            Ok(false) => {
                info!("ledger replication disabled, skipping periodic check");
                return;
            }
            Err(e) => {
                error!(%e, "under-replication manager unavailable running periodic check");
                return;
            }
        }
        if let Err(e) = self.check_all_ledgers().await {
            error!(%e, "periodic ledger check failed");
        }
    }

    /// Open every ledger read-only and publish the ones whose fragments
    /// live on suspect bookies. Should not run often.
    pub(crate) async fn check_all_ledgers(&self) -> Result<(), AuditError> {
        // The check gets its own session; it is released on every exit
        // path, successful or not.
        let session = self.admin_factory.connect().await?;
        let result = self.check_ledgers_with_session(session.clone()).await;
        if let Err(e) = session.close().await {
            warn!(%e, "couldn't close admin session after ledger check");
        }
        result
    }

    async fn check_ledgers_with_session(
        &self,
        session: Arc<dyn AdminSession>,
    ) -> Result<(), AuditError> {
        let (latch, completion) = CompletionLatch::new();
        let latch = Arc::new(latch);

        let processor = Arc::new(LedgerCheckProcessor {
            underreplication: self.underreplication.clone(),
            checker: self.checker.clone(),
            session,
            published: self.published.clone(),
            latch: latch.clone(),
        });

        let on_complete: CompletionCallback = Box::new({
            let latch = latch.clone();
            move |code| latch.complete(code)
        });
        self.ledgers
            .process_ledgers(processor, on_complete, CheckCode::Ok, CheckCode::ReadError)
            .await;

        // Block until the first terminal signal: either the traversal's
        // final callback, or the processor aborting mid-run. A late second
        // signal is absorbed by the latch.
        let code = completion.await.unwrap_or(CheckCode::ReadError);
        if code == CheckCode::Ok {
            Ok(())
        } else {
            Err(AuditError::Check(code))
        }
    }

    // -------------------------------------------------------------------
    // Under-replicated snapshot
    // -------------------------------------------------------------------

    /// Refresh the under-replicated snapshot from the queue's path listing.
    pub(crate) async fn run_underreplicated_snapshot(&self) {
        match self.underreplication.underreplicated_paths().await {
            Ok(record_paths) => {
                info!(count = record_paths.len(), "found under-replicated ledgers");
                let ledgers: HashSet<LedgerId> = record_paths
                    .iter()
                    .filter_map(|path| paths::parse_underreplicated_ledger_path(path))
                    .collect();
                *self.underreplicated.write().expect("snapshot lock poisoned") = Some(ledgers);
            }
            Err(e) => {
                error!(%e, "under-replication manager unavailable running periodic under-replicated ledger check");
            }
        }
    }
}

impl std::fmt::Debug for Auditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor")
            .field("identifier", &self.identifier)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------
// Publishing
// -----------------------------------------------------------------------

/// Publish every ledger of `bookie` as under-replicated with `bookie` as
/// the missing replica. An empty set is skipped. The first failure aborts
/// the remaining publishes.
async fn publish_suspected_ledgers(
    underreplication: &Arc<dyn UnderReplicationManager>,
    published: &Counter,
    bookie: &BookieId,
    ledgers: &HashSet<LedgerId>,
) -> Result<(), AuditError> {
    if ledgers.is_empty() {
        info!(%bookie, "no ledgers stored on failed bookie");
        return Ok(());
    }
    info!(
        %bookie,
        count = ledgers.len(),
        "publishing ledgers of suspect bookie as under-replicated"
    );
    for ledger_id in ledgers {
        underreplication
            .mark_underreplicated(*ledger_id, bookie)
            .await
            .map_err(|source| AuditError::Publish {
                ledger_id: *ledger_id,
                bookie: bookie.clone(),
                source,
            })?;
        published.inc();
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Check-cycle plumbing
// -----------------------------------------------------------------------

/// One-shot terminal latch: the first completion wins, later ones are
/// absorbed.
struct CompletionLatch {
    tx: Mutex<Option<oneshot::Sender<CheckCode>>>,
}

impl CompletionLatch {
    fn new() -> (Self, oneshot::Receiver<CheckCode>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn complete(&self, code: CheckCode) {
        if let Some(tx) = self.tx.lock().expect("latch lock poisoned").take() {
            let _ = tx.send(code);
        }
    }
}

/// Per-ledger processor of the check cycle.
struct LedgerCheckProcessor {
    underreplication: Arc<dyn UnderReplicationManager>,
    checker: Arc<dyn LedgerChecker>,
    session: Arc<dyn AdminSession>,
    published: Arc<Counter>,
    latch: Arc<CompletionLatch>,
}

#[async_trait::async_trait]
impl LedgerProcessor for LedgerCheckProcessor {
    async fn process(&self, ledger_id: LedgerId, done: ItemCallback) {
        // Cooperative abort point: a disable mid-traversal ends the whole
        // check. Completing the latch releases the driver; dropping `done`
        // uncompleted tells the traversal to stop pushing ledgers.
        match self.underreplication.is_replication_enabled().await {
            Ok(true) => {}
            Ok(false) => {
                info!("ledger re-replication disabled, aborting periodic check");
                self.latch.complete(CheckCode::Ok);
                return;
            }
            Err(e) => {
                error!(%e, "under-replication manager unavailable running periodic check");
                self.latch.complete(CheckCode::Ok);
                return;
            }
        }

        let handle = match self.session.open_ledger_no_recovery(ledger_id).await {
            Ok(handle) => handle,
            Err(crate::ClientError::NoSuchLedger(_)) => {
                debug!(%ledger_id, "ledger deleted before it could be checked");
                done.complete(CheckCode::Ok);
                return;
            }
            Err(crate::ClientError::Interrupted) => {
                error!(%ledger_id, "interrupted opening ledger");
                done.complete(CheckCode::Interrupted);
                return;
            }
            Err(e) => {
                error!(%ledger_id, %e, "couldn't open ledger");
                done.complete(CheckCode::BookieHandleUnavailable);
                return;
            }
        };

        let (mut code, fragments) = self.checker.check_ledger(handle.as_ref()).await;
        if code == CheckCode::Ok {
            // Each lost fragment names its hosting bookies; publish the
            // ledger once per distinct bookie.
            let bookies: BTreeSet<BookieId> = fragments
                .iter()
                .flat_map(|fragment| fragment.bookies().iter().cloned())
                .collect();
            let single = HashSet::from([ledger_id]);
            for bookie in bookies {
                if let Err(e) = publish_suspected_ledgers(
                    &self.underreplication,
                    &self.published,
                    &bookie,
                    &single,
                )
                .await
                {
                    error!(%e, "couldn't publish suspected ledger");
                    code = CheckCode::ReplicationError;
                    break;
                }
            }
        }

        if let Err(e) = handle.close().await {
            warn!(%ledger_id, %e, "couldn't close ledger");
            if code == CheckCode::Ok {
                code = CheckCode::ReplicationError;
            }
        }
        done.complete(code);
    }
}
