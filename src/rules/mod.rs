//! Warning and penalty rules.
//!
//! Pure functions over a kart's infringement history; persistence lives in
//! the ledger.

mod engine;

pub use engine::{Category, Decision, PriorInfringement, RuleEngine};
