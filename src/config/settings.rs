use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, StewardError};

pub const DEFAULT_WARNING_EXPIRY_MINUTES: i64 = 180;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 1000;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StewardConfig {
    pub storage: StorageConfig,
    pub rules: RulesConfig,
    pub ledger: LedgerConfig,
    pub notification: NotificationConfig,
    pub export: ExportConfig,
}

impl StewardConfig {
    /// Loads `config.toml` from `data_dir` (defaults when absent), applies
    /// environment overrides and validates the result.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Self::default()
        };
        config.storage.data_dir = data_dir.to_path_buf();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        self.validate()?;
        fs::create_dir_all(&self.storage.data_dir).await?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| StewardError::Validation(format!("config: {}", e)))?;
        fs::write(self.storage.data_dir.join(CONFIG_FILE), content).await?;
        Ok(())
    }

    /// Defaults rooted at `data_dir`, without touching the filesystem.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.storage.data_dir = data_dir.into();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("STEWARD_DATA_DIR")
            && !dir.trim().is_empty()
        {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var("WARNING_EXPIRY_MINUTES") {
            match raw.trim().parse::<i64>() {
                Ok(minutes) => self.rules.warning_expiry_minutes = minutes,
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Ignoring WARNING_EXPIRY_MINUTES")
                }
            }
        }
        if let Ok(dir) = std::env::var("SESSION_EXPORT_DIR")
            && !dir.trim().is_empty()
        {
            self.export.dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.storage.pool_size == 0 {
            errors.push("storage.pool_size must be greater than 0");
        }
        if self.rules.warning_expiry_minutes < 1 {
            errors.push("rules.warning_expiry_minutes must be at least 1");
        }
        if self.rules.penalty_threshold < 1 {
            errors.push("rules.penalty_threshold must be at least 1");
        }
        if self.rules.accumulated_penalty.trim().is_empty() {
            errors.push("rules.accumulated_penalty must not be empty");
        }
        if self.ledger.max_page_size == 0 {
            errors.push("ledger.max_page_size must be greater than 0");
        }
        if self.ledger.default_page_size == 0
            || self.ledger.default_page_size > self.ledger.max_page_size
        {
            errors.push("ledger.default_page_size must be between 1 and max_page_size");
        }
        if self.notification.queue_capacity == 0 {
            errors.push("notification.queue_capacity must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(StewardError::Validation(errors.join("; ")))
        }
    }

    pub fn control_db_path(&self) -> PathBuf {
        self.storage.data_dir.join("control.sqlite")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.storage.data_dir.join("sessions")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.storage.data_dir.join("logs")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export
            .dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("session_exports"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the control database and every session namespace.
    pub data_dir: PathBuf,
    /// Connections opened per namespace.
    pub pool_size: usize,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("steward-data"),
            pool_size: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Fallback expiry window when the control namespace holds no override.
    pub warning_expiry_minutes: i64,
    /// Warnings inside one cycle that turn into a penalty.
    pub penalty_threshold: u32,
    pub accumulated_penalty: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            warning_expiry_minutes: DEFAULT_WARNING_EXPIRY_MINUTES,
            penalty_threshold: 3,
            accumulated_penalty: "5 sec Stop & Go".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub max_page_size: u32,
    pub default_page_size: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            default_page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Append one line per event to `<data_dir>/logs/<session>.log`.
    pub event_log: bool,
    pub hook_command: Option<String>,
    pub queue_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_log: false,
            hook_command: None,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: Option<PathBuf>,
}
