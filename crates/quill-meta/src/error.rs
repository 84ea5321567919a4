//! Error types for the metadata plane.

use quill_types::LedgerId;

/// Errors returned by metadata-plane operations.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    /// The metadata store (or a manager built on it) could not be reached.
    /// Transient: callers skip the current cycle and rely on the next tick.
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),

    /// The ledger no longer exists (deleted between enumeration and use).
    #[error("no such ledger: {0}")]
    NoSuchLedger(LedgerId),
}
