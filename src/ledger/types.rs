use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StewardError};

/// One recorded rule breach for a kart, with the engine's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infringement {
    pub id: i64,
    pub kart_number: i64,
    pub turn_number: Option<String>,
    pub description: String,
    pub observer: Option<String>,
    pub warning_count: u32,
    pub penalty_due: bool,
    pub penalty_description: Option<String>,
    pub penalty_taken_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Infringement {
    /// Due now, or already served. Either marks the end of a warning cycle.
    pub fn carries_penalty(&self) -> bool {
        self.penalty_due || self.penalty_taken_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    Deleted,
    PenaltyApplied,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::PenaltyApplied => "penalty_applied",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = StewardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            "penalty_applied" => Ok(Self::PenaltyApplied),
            other => Err(StewardError::Validation(format!(
                "unknown history action '{}'",
                other
            ))),
        }
    }
}

/// Append-only audit entry attached to an infringement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub infringement_id: i64,
    pub action: HistoryAction,
    pub performed_by: String,
    pub observer: Option<String>,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied fields for `record` and `amend`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfringementInput {
    pub kart_number: i64,
    #[serde(default)]
    pub turn_number: Option<String>,
    pub description: String,
    #[serde(default)]
    pub observer: Option<String>,
    /// Marshal's explicit decision. Empty or absent lets the rules decide.
    #[serde(default)]
    pub penalty_description: Option<String>,
    pub performed_by: String,
}

impl InfringementInput {
    pub fn new(kart_number: i64, description: impl Into<String>) -> Self {
        Self {
            kart_number,
            description: description.into(),
            performed_by: "system".to_string(),
            ..Default::default()
        }
    }

    pub fn with_turn(mut self, turn: impl Into<String>) -> Self {
        self.turn_number = Some(turn.into());
        self
    }

    pub fn with_observer(mut self, observer: impl Into<String>) -> Self {
        self.observer = Some(observer.into());
        self
    }

    pub fn with_penalty(mut self, penalty: impl Into<String>) -> Self {
        self.penalty_description = Some(penalty.into());
        self
    }

    pub fn performed_by(mut self, who: impl Into<String>) -> Self {
        self.performed_by = who.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.kart_number < 0 {
            errors.push("kart_number must not be negative");
        }
        if self.description.trim().is_empty() {
            errors.push("description must not be empty");
        }
        if self.performed_by.trim().is_empty() {
            errors.push("performed_by must not be empty");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StewardError::Validation(errors.join("; ")))
        }
    }
}

/// One page of infringements, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Outcome of a batch penalty application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedPenalties {
    pub kart_number: i64,
    pub applied: Vec<Infringement>,
    pub penalty_taken_at: DateTime<Utc>,
}
