//! Session-scoped storage.
//!
//! - `Namespace`: one SQLite database file and its connection pool
//! - `StorageRouter`: maps session names to namespaces and tracks the current one
//! - `StorageFault`: classification of raw storage errors

mod codec;
mod fault;
mod namespace;
mod router;
mod schema;

pub use codec::{decode_ts, encode_ts, now_ts};
pub use fault::StorageFault;
pub(crate) use fault::storage_err;
pub use namespace::{Namespace, NamespaceHandle, PoolOptions};
pub use router::{StorageRouter, namespace_id};
pub use schema::SchemaKind;
