//! State-change notifications for observers.
//!
//! - `StewardEvent`: event type plus JSON payload
//! - `Notifier`: queued fan-out to subscribers, the event log and a hook command

mod events;
mod notifier;

pub use events::{EventType, StewardEvent};
pub use notifier::Notifier;
