//! Layout of under-replication records in the metadata store.
//!
//! A record for ledger `L` lives at
//! `<root>/underreplication/ledgers/<hex of L, sharded by 16-bit groups>`,
//! e.g. ledger 10 under root `/quill` is
//! `/quill/underreplication/ledgers/0000/0000/0000/000a`. Parsing accepts
//! any hex suffix after the `ledgers/` marker, with interior slashes
//! removed, so flat and sharded layouts both round-trip.

use quill_types::LedgerId;

/// Node name under which all under-replication state is kept.
pub const UNDER_REPLICATION_NODE: &str = "underreplication";

/// Format the record path for `ledger_id` under `root`.
pub fn underreplicated_ledger_path(root: &str, ledger_id: LedgerId) -> String {
    let id = ledger_id.as_u64();
    format!(
        "{root}/{UNDER_REPLICATION_NODE}/ledgers/{:04x}/{:04x}/{:04x}/{:04x}",
        (id >> 48) & 0xffff,
        (id >> 32) & 0xffff,
        (id >> 16) & 0xffff,
        id & 0xffff,
    )
}

/// Extract the ledger id from a record path.
///
/// Returns `None` for anything that does not end in
/// `…/underreplication/ledgers/<HEX>` (slashes inside the hex part are
/// ignored).
pub fn parse_underreplicated_ledger_path(path: &str) -> Option<LedgerId> {
    let marker = format!("/{UNDER_REPLICATION_NODE}/ledgers/");
    let start = path.rfind(&marker)? + marker.len();
    let hex: String = path[start..].chars().filter(|c| *c != '/').collect();
    if hex.is_empty() {
        return None;
    }
    u64::from_str_radix(&hex, 16).ok().map(LedgerId)
}
