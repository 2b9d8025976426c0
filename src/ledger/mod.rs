//! Infringement ledger for the active session.
//!
//! - `InfringementLedger`: record, amend, remove and penalty operations
//! - `SessionSnapshot`: JSON export and import of a whole session

mod snapshot;
mod store;
mod types;

pub use snapshot::{
    ImportSummary, SessionSnapshot, SnapshotHistory, SnapshotInfringement, SnapshotSession,
    read_snapshot, write_snapshot,
};
pub use store::InfringementLedger;
pub use types::{
    AppliedPenalties, HistoryAction, HistoryEntry, Infringement, InfringementInput, Page,
};
