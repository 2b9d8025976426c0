//! Configuration types and loading.
//!
//! - `StewardConfig`: top-level configuration with validation
//! - Section configs for storage, rules, ledger paging, notification and export

mod settings;

pub use settings::{
    DEFAULT_MAX_PAGE_SIZE, DEFAULT_WARNING_EXPIRY_MINUTES, ExportConfig, LedgerConfig,
    NotificationConfig, RulesConfig, StewardConfig, StorageConfig,
};
