//! Portable JSON copy of one session: its registry record, every infringement
//! and every history entry.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use super::store::{InfringementLedger, append_history, query_history, query_infringements};
use super::types::HistoryAction;
use crate::error::{Result, StewardError};
use crate::session::{Session, SessionStatus, validate_session_name};
use crate::storage::{encode_ts, now_ts};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_info: SnapshotSession,
    pub infringements: Vec<SnapshotInfringement>,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSession {
    pub name: String,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfringement {
    /// Id in the exporting namespace. Used only to order the replay.
    pub id: i64,
    pub kart_number: i64,
    #[serde(default)]
    pub turn_number: Option<String>,
    pub description: String,
    #[serde(default)]
    pub observer: Option<String>,
    #[serde(default)]
    pub warning_count: u32,
    #[serde(default)]
    pub penalty_due: bool,
    #[serde(default)]
    pub penalty_description: Option<String>,
    #[serde(default)]
    pub penalty_taken_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<SnapshotHistory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHistory {
    pub action: HistoryAction,
    pub performed_by: String,
    #[serde(default)]
    pub observer: Option<String>,
    #[serde(default)]
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub session: Session,
    pub infringements: usize,
    pub history: usize,
}

impl SessionSnapshot {
    /// `<name with spaces as _>_<YYYYMMDD_HHMMSS>.json`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.json",
            self.session_info.name.replace(' ', "_"),
            self.exported_at.format("%Y%m%d_%H%M%S")
        )
    }
}

impl InfringementLedger {
    /// Reads a session's namespace without switching the router to it.
    pub async fn export_snapshot(&self, name: &str) -> Result<SessionSnapshot> {
        validate_session_name(name)?;
        let session = self
            .registry()
            .find(name)
            .await?
            .ok_or_else(|| StewardError::NotFound(format!("session '{}' not found", name)))?;

        let handle = self.registry().router().handle_for(name).await?;
        let infringements = handle
            .run(|conn| {
                let records = query_infringements(
                    conn,
                    "SELECT id, kart_number, turn_number, description, observer, warning_count,
                            penalty_due, penalty_description, penalty_taken_at, created_at
                     FROM infringements ORDER BY id ASC",
                    [],
                )?;

                let mut out = Vec::with_capacity(records.len());
                for record in records {
                    let history = query_history(
                        conn,
                        "SELECT id, infringement_id, action, performed_by, observer, details,
                                timestamp
                         FROM infringement_history WHERE infringement_id = ?1
                         ORDER BY id ASC",
                        params![record.id],
                    )?;
                    out.push(SnapshotInfringement {
                        id: record.id,
                        kart_number: record.kart_number,
                        turn_number: record.turn_number,
                        description: record.description,
                        observer: record.observer,
                        warning_count: record.warning_count,
                        penalty_due: record.penalty_due,
                        penalty_description: record.penalty_description,
                        penalty_taken_at: record.penalty_taken_at,
                        created_at: record.created_at,
                        history: history
                            .into_iter()
                            .map(|h| SnapshotHistory {
                                action: h.action,
                                performed_by: h.performed_by,
                                observer: h.observer,
                                details: h.details,
                                timestamp: h.timestamp,
                            })
                            .collect(),
                    });
                }
                Ok(out)
            })
            .await?;

        info!(session = name, infringements = infringements.len(), "Session exported");
        Ok(SessionSnapshot {
            session_info: SnapshotSession {
                name: session.name,
                status: Some(session.status),
                started_at: Some(session.started_at),
            },
            infringements,
            exported_at: now_ts(),
        })
    }

    /// Replays a snapshot into a brand new session, which becomes active.
    ///
    /// Ids are reassigned; their relative order is kept.
    pub async fn import_snapshot(
        &self,
        snapshot: SessionSnapshot,
        name_override: Option<&str>,
    ) -> Result<ImportSummary> {
        let name = name_override
            .unwrap_or(snapshot.session_info.name.as_str())
            .to_string();
        validate_session_name(&name)?;

        let registry = self.registry();
        if registry.find(&name).await?.is_some() || registry.router().exists(&name) {
            return Err(StewardError::AlreadyExists(format!(
                "session '{}' already exists; delete it first or import under another name",
                name
            )));
        }

        let started_at = snapshot.session_info.started_at.unwrap_or_else(now_ts);
        let session = registry.activate_new(&name, started_at).await?;
        let handle = registry.router().handle_for(&name).await?;

        let mut infringements = snapshot.infringements;
        infringements.sort_by_key(|inf| inf.id);

        let counts = handle
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut history_count: usize = 0;
                for inf in &infringements {
                    tx.execute(
                        "INSERT INTO infringements (kart_number, turn_number, description,
                             observer, warning_count, penalty_due, penalty_description,
                             penalty_taken_at, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            inf.kart_number,
                            inf.turn_number,
                            inf.description,
                            inf.observer,
                            inf.warning_count,
                            inf.penalty_due,
                            inf.penalty_description,
                            inf.penalty_taken_at.as_ref().map(encode_ts),
                            encode_ts(&inf.created_at),
                        ],
                    )?;
                    let new_id = tx.last_insert_rowid();
                    for entry in &inf.history {
                        append_history(
                            &tx,
                            new_id,
                            entry.action,
                            &entry.performed_by,
                            entry.observer.as_deref(),
                            &entry.details,
                            entry.timestamp,
                        )?;
                        history_count += 1;
                    }
                }
                tx.commit()?;
                Ok((infringements.len(), history_count))
            })
            .await;

        let (infringements, history) = match counts {
            Ok(counts) => counts,
            Err(e) => {
                warn!(session = %name, error = %e, "Replay failed; session left empty");
                return Err(e);
            }
        };

        info!(session = %name, infringements, history, "Session imported");
        Ok(ImportSummary {
            session,
            infringements,
            history,
        })
    }
}

/// Writes pretty JSON into `dir` through a temp file and rename.
pub async fn write_snapshot(snapshot: &SessionSnapshot, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(snapshot.file_name());
    let tmp = path.with_extension("json.tmp");

    let content = serde_json::to_string_pretty(snapshot)?;
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, &path).await?;
    Ok(path)
}

pub async fn read_snapshot(path: &Path) -> Result<SessionSnapshot> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn snapshot(name: &str) -> SessionSnapshot {
        SessionSnapshot {
            session_info: SnapshotSession {
                name: name.to_string(),
                status: Some(SessionStatus::Closed),
                started_at: None,
            },
            infringements: Vec::new(),
            exported_at: Utc.with_ymd_and_hms(2026, 7, 4, 14, 5, 9).unwrap(),
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            snapshot("Club Night").file_name(),
            "Club_Night_20260704_140509.json"
        );
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(&snapshot("Club Night"), dir.path()).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let back = read_snapshot(&path).await.unwrap();
        assert_eq!(back.session_info.name, "Club Night");
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "session_info": {"name": "Legacy"},
            "infringements": [{
                "id": 3,
                "kart_number": 12,
                "description": "Yellow flag",
                "created_at": "2026-07-04T14:05:09Z",
                "history": [{"action": "created", "performed_by": "clerk",
                             "timestamp": "2026-07-04T14:05:09Z"}]
            }],
            "exported_at": "2026-07-04T15:00:00Z"
        }"#;

        let parsed: SessionSnapshot = serde_json::from_str(json).unwrap();
        let inf = &parsed.infringements[0];
        assert!(!inf.penalty_due);
        assert_eq!(inf.warning_count, 0);
        assert_eq!(inf.history[0].action, HistoryAction::Created);
        assert!(parsed.session_info.started_at.is_none());
    }
}
