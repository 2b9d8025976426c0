//! Session lifecycle on top of the storage router.
//!
//! - `SessionRegistry`: start, load, close, delete and list sessions
//! - `validate_session_name`: naming rules shared by every entry point

mod name;
mod registry;
mod types;

pub use name::validate_session_name;
pub use registry::SessionRegistry;
pub use types::{Session, SessionStatus};
