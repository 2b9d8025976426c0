pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod notification;
pub mod output;
pub mod rules;
pub mod session;
pub mod steward;
pub mod storage;

pub use config::StewardConfig;
pub use error::{ErrorKind, Result, StewardError};
pub use ledger::{
    AppliedPenalties, HistoryAction, HistoryEntry, ImportSummary, Infringement,
    InfringementInput, InfringementLedger, Page, SessionSnapshot,
};
pub use notification::{EventType, Notifier, StewardEvent};
pub use rules::{Category, Decision, RuleEngine};
pub use session::{Session, SessionRegistry, SessionStatus};
pub use steward::Steward;
pub use storage::StorageRouter;
