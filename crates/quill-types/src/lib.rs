//! Shared types and identifiers for Quill.
//!
//! This crate defines the core value types used across the Quill workspace:
//! identifiers ([`BookieId`], [`LedgerId`]), ledger metadata
//! ([`LedgerMetadata`], [`Ensemble`], [`LedgerFragment`]), the per-ledger
//! check result code ([`CheckCode`]), and the stats primitives
//! ([`stats::Counter`], [`stats::Gauge`], [`stats::StatsRegistry`]).

pub mod stats;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

/// Network address of a bookie (storage node): host plus port.
///
/// Bookies are identified by where they listen, not by what they store;
/// the same address always refers to the same registration slot.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookieId {
    host: String,
    port: u16,
}

impl BookieId {
    /// Create a bookie identifier from a host name and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Return the host part.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Return the port part.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for BookieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for BookieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BookieId({self})")
    }
}

/// Error parsing a [`BookieId`] from its `host:port` form.
#[derive(Debug, thiserror::Error)]
#[error("invalid bookie address {input:?}: expected host:port")]
pub struct ParseBookieIdError {
    /// The string that failed to parse.
    pub input: String,
}

impl FromStr for BookieId {
    type Err = ParseBookieIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseBookieIdError {
            input: s.to_string(),
        };
        let (host, port) = s.rsplit_once(':').ok_or_else(err)?;
        if host.is_empty() {
            return Err(err());
        }
        let port: u16 = port.parse().map_err(|_| err())?;
        Ok(Self::new(host, port))
    }
}

/// Identifier of a ledger: a 64-bit unsigned value assigned at creation.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct LedgerId(pub u64);

impl LedgerId {
    /// Return the raw 64-bit value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for LedgerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Ledger metadata
// ---------------------------------------------------------------------------

/// One fragment ensemble of a ledger: the bookies storing all entries
/// from `first_entry` until the next ensemble begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ensemble {
    /// First entry id covered by this ensemble.
    pub first_entry: u64,
    /// Bookies holding the entries of this ensemble.
    pub bookies: Vec<BookieId>,
}

/// Metadata of a single ledger as stored in the metadata plane.
///
/// A ledger is written through a sequence of ensembles; ensemble changes
/// happen when a bookie fails mid-write. The set of bookies that hold any
/// part of the ledger is the union over all ensembles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    /// Ensembles in ascending `first_entry` order.
    pub ensembles: Vec<Ensemble>,
}

impl LedgerMetadata {
    /// Metadata for a ledger written through a single ensemble.
    pub fn single_ensemble(bookies: Vec<BookieId>) -> Self {
        Self {
            ensembles: vec![Ensemble {
                first_entry: 0,
                bookies,
            }],
        }
    }

    /// Return the distinct set of bookies hosting any part of the ledger.
    pub fn bookies(&self) -> HashSet<BookieId> {
        self.ensembles
            .iter()
            .flat_map(|e| e.bookies.iter().cloned())
            .collect()
    }
}

/// A contiguous portion of a ledger whose entries live on a fixed ensemble.
///
/// Produced by the ledger checker for the portions it judged lost or
/// under-replicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerFragment {
    /// Ledger the fragment belongs to.
    pub ledger_id: LedgerId,
    /// First entry id of the fragment.
    pub first_entry: u64,
    /// Last entry id of the fragment.
    pub last_entry: u64,
    /// Bookies that host (or were supposed to host) this fragment.
    pub bookies: Vec<BookieId>,
}

impl LedgerFragment {
    /// Return the bookies hosting this fragment.
    pub fn bookies(&self) -> &[BookieId] {
        &self.bookies
    }
}

// ---------------------------------------------------------------------------
// Check result codes
// ---------------------------------------------------------------------------

/// Result code of checking one ledger, or of a whole check traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckCode {
    /// The check completed; anything found was published.
    Ok,
    /// The traversal could not read the ledger range.
    ReadError,
    /// The ledger could not be opened against its bookies.
    BookieHandleUnavailable,
    /// The check task was cancelled mid-operation.
    Interrupted,
    /// Publishing suspected ledgers (or closing the handle) failed.
    ReplicationError,
}

impl fmt::Display for CheckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckCode::Ok => "ok",
            CheckCode::ReadError => "read error",
            CheckCode::BookieHandleUnavailable => "bookie handle unavailable",
            CheckCode::Interrupted => "interrupted",
            CheckCode::ReplicationError => "replication error",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
