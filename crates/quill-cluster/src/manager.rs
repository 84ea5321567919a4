//! The [`ClusterManager`] collaborator trait.

use std::collections::HashSet;
use std::sync::Arc;

use quill_types::stats::StatsRegistry;
use quill_types::BookieId;

use crate::ClusterError;

/// Membership surface consumed by the auditor.
///
/// Implementations are shared, thread-safe black boxes; the auditor
/// serializes its own calls per lane and never assumes two consecutive
/// views are consistent with each other.
#[async_trait::async_trait]
pub trait ClusterManager: Send + Sync {
    /// Begin watching the cluster. Must be called before the view methods.
    async fn start(&self) -> Result<(), ClusterError>;

    /// Hand the manager a stats registry to publish its own instruments on.
    fn enable_stats(&self, stats: &Arc<StatsRegistry>);

    /// Bookies currently registered as available.
    async fn active_bookies(&self) -> Result<HashSet<BookieId>, ClusterError>;

    /// Registered bookies whose liveness signal has gone stale.
    async fn stale_bookies(&self) -> Result<HashSet<BookieId>, ClusterError>;

    /// Notify the manager of the lost set computed by the current audit
    /// cycle, replacing whatever was recorded by the previous cycle.
    async fn lost_bookies_changed(&self, lost: HashSet<BookieId>);

    /// Release whatever the manager holds. Only the party that created the
    /// manager calls this.
    async fn close(&self);
}
