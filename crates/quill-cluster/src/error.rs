//! Error types for the cluster crate.

/// Errors produced by cluster membership operations.
///
/// A membership error is fatal to the auditor: it cannot judge bookie
/// failures without a trustworthy cluster view.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The membership source could not be reached.
    #[error("cluster transport error: {0}")]
    Transport(String),

    /// The manager was asked for a view before `start()` succeeded.
    #[error("cluster manager not started")]
    NotStarted,
}
