use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::name::validate_session_name;
use super::types::{Session, SessionStatus};
use crate::error::{Result, StewardError};
use crate::storage::{StorageRouter, decode_ts, encode_ts, namespace_id, now_ts};

const EXPIRY_KEY: &str = "warning_expiry_minutes";

/// Durable record of known sessions, kept in the control namespace.
///
/// At most one session is `active`. Every transition that activates a session
/// closes all others in the same control transaction.
pub struct SessionRegistry {
    router: Arc<StorageRouter>,
    default_expiry_minutes: i64,
    /// Held across a router switch and the control write that records it, so
    /// the router always points at the session marked active.
    transition: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(router: Arc<StorageRouter>, default_expiry_minutes: i64) -> Self {
        Self {
            router,
            default_expiry_minutes,
            transition: Mutex::new(()),
        }
    }

    pub fn router(&self) -> &Arc<StorageRouter> {
        &self.router
    }

    /// Creates a fresh namespace for `name` and makes it the active session.
    pub async fn start(&self, name: &str) -> Result<Session> {
        validate_session_name(name)?;
        self.activate_new(name, now_ts()).await
    }

    /// Shared by `start` and snapshot import: create, switch, then record.
    ///
    /// The namespace is switched to before the registry is touched, so a failed
    /// switch leaves the registry untouched (the new namespace stays orphaned).
    pub(crate) async fn activate_new(
        &self,
        name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Session> {
        let started_at = started_at.trunc_subsecs(6);
        let _transition = self.transition.lock().await;
        let previous = self.router.current_session();
        self.router.create(name).await?;

        if let Err(e) = self.router.switch_to(name).await {
            warn!(session = name, error = %e, "Switch failed after create; namespace left orphaned");
            return Err(e);
        }

        let session = Session {
            name: name.to_string(),
            status: SessionStatus::Active,
            started_at,
        };
        let record = session.clone();
        let result = self
            .router
            .control()
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "UPDATE sessions SET status = 'closed' WHERE status = 'active'",
                    [],
                )?;
                tx.execute(
                    "INSERT INTO sessions (name, namespace, status, started_at)
                     VALUES (?1, ?2, 'active', ?3)
                     ON CONFLICT(namespace) DO UPDATE
                     SET name = excluded.name, status = 'active', started_at = excluded.started_at",
                    params![
                        record.name,
                        namespace_id(&record.name),
                        encode_ts(&record.started_at)
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await;

        if let Err(e) = result {
            self.restore_pointer(previous).await;
            return Err(e);
        }

        info!(session = name, "Session started");
        Ok(session)
    }

    /// Switches to an existing namespace and marks its session active.
    ///
    /// A namespace with no registry record (for example, one restored from a
    /// backup) gets a fresh record.
    pub async fn load(&self, name: &str) -> Result<Session> {
        validate_session_name(name)?;
        let _transition = self.transition.lock().await;

        self.ensure_owner(name).await?;

        let previous = self.router.current_session();
        self.router.switch_to(name).await?;

        let owned = name.to_string();
        let now = encode_ts(&now_ts());
        let result = self
            .router
            .control()
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "UPDATE sessions SET status = 'closed' WHERE status = 'active'",
                    [],
                )?;
                tx.execute(
                    "INSERT INTO sessions (name, namespace, status, started_at)
                     VALUES (?1, ?2, 'active', ?3)
                     ON CONFLICT(namespace) DO UPDATE SET status = 'active'",
                    params![owned, namespace_id(&owned), now],
                )?;
                let session = find_by_namespace(&tx, &namespace_id(&owned))?;
                tx.commit()?;
                session.ok_or_else(|| {
                    StewardError::Internal(format!("session '{}' vanished during load", owned))
                })
            })
            .await;

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                self.restore_pointer(previous).await;
                return Err(e);
            }
        };

        info!(session = name, "Session loaded");
        Ok(session)
    }

    /// Marks the session closed. The router is left where it is.
    pub async fn close(&self, name: &str) -> Result<Session> {
        validate_session_name(name)?;
        let owned = name.to_string();
        let session = self
            .router
            .control()
            .run(move |conn| {
                let changed = conn.execute(
                    "UPDATE sessions SET status = 'closed' WHERE namespace = ?1",
                    params![namespace_id(&owned)],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                find_by_namespace(conn, &namespace_id(&owned))
            })
            .await?
            .ok_or_else(|| StewardError::NotFound(format!("session '{}' not found", name)))?;

        info!(session = name, "Session closed");
        Ok(session)
    }

    /// Drops the namespace, then removes the registry record.
    ///
    /// A record whose namespace is already gone is removed on its own.
    pub async fn delete(&self, name: &str) -> Result<()> {
        validate_session_name(name)?;
        let _transition = self.transition.lock().await;
        self.ensure_owner(name).await?;

        if let Err(e) = self.router.drop_namespace(name).await {
            if !matches!(e, StewardError::NotFound(_)) || self.find(name).await?.is_none() {
                return Err(e);
            }
            warn!(session = name, "Namespace missing; removing orphaned session record");
        }

        let namespace = namespace_id(name);
        self.router
            .control()
            .run(move |conn| {
                conn.execute(
                    "DELETE FROM sessions WHERE namespace = ?1",
                    params![namespace],
                )?;
                Ok(())
            })
            .await?;

        info!(session = name, "Session deleted");
        Ok(())
    }

    /// Every known session, most recently started first.
    pub async fn list(&self) -> Result<Vec<Session>> {
        self.router
            .control()
            .run(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, status, started_at FROM sessions
                     ORDER BY started_at DESC, id DESC",
                )?;
                let rows = stmt.query_map([], raw_session)?;
                let mut sessions = Vec::new();
                for row in rows {
                    sessions.push(into_session(row?)?);
                }
                Ok(sessions)
            })
            .await
    }

    pub async fn find(&self, name: &str) -> Result<Option<Session>> {
        let namespace = namespace_id(name);
        self.router
            .control()
            .run(move |conn| find_by_namespace(conn, &namespace))
            .await
    }

    pub async fn active_session(&self) -> Result<Option<Session>> {
        self.router
            .control()
            .run(|conn| {
                conn.query_row(
                    "SELECT name, status, started_at FROM sessions
                     WHERE status = 'active'
                     ORDER BY started_at DESC LIMIT 1",
                    [],
                    raw_session,
                )
                .optional()?
                .map(into_session)
                .transpose()
            })
            .await
    }

    /// Re-attaches the router to the last active session after a restart.
    ///
    /// Failures are logged and leave the router on the control namespace.
    pub async fn restore_on_startup(&self) -> Option<Session> {
        let _transition = self.transition.lock().await;
        let active = match self.active_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("No active session to restore");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read active session");
                return None;
            }
        };

        match self.router.switch_to(&active.name).await {
            Ok(()) => {
                info!(session = %active.name, "Restored active session");
                Some(active)
            }
            Err(e) => {
                warn!(session = %active.name, error = %e, "Failed to restore active session");
                None
            }
        }
    }

    /// Rejects `name` when its namespace is recorded under a different name,
    /// e.g. "Race_1" against an existing "Race 1".
    async fn ensure_owner(&self, name: &str) -> Result<()> {
        if let Some(owner) = self.find(name).await?
            && owner.name != name
        {
            return Err(StewardError::Conflict(format!(
                "session name '{}' maps to the storage of session '{}'",
                name, owner.name
            )));
        }
        Ok(())
    }

    /// Puts the router back where it was before a transition whose control
    /// write failed.
    async fn restore_pointer(&self, previous: Option<String>) {
        let Some(previous) = previous else {
            self.router.reset_to_control().await;
            return;
        };
        if let Err(e) = self.router.switch_to(&previous).await {
            warn!(session = %previous, error = %e, "Failed to restore previous session");
            self.router.reset_to_control().await;
        }
    }

    /// Warning window in minutes: the stored setting, else the configured default.
    pub async fn warning_expiry_minutes(&self) -> Result<i64> {
        let stored: Option<String> = self
            .router
            .control()
            .run(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM app_config WHERE key = ?1",
                        params![EXPIRY_KEY],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        match stored.as_deref().map(str::parse::<i64>) {
            Some(Ok(minutes)) if minutes >= 1 => Ok(minutes),
            Some(_) => {
                warn!(value = ?stored, "Ignoring malformed stored warning expiry");
                Ok(self.default_expiry_minutes)
            }
            None => Ok(self.default_expiry_minutes),
        }
    }

    pub async fn set_warning_expiry_minutes(&self, minutes: i64) -> Result<i64> {
        if minutes < 1 {
            return Err(StewardError::Validation(
                "warning expiry must be at least 1 minute".to_string(),
            ));
        }

        let now = encode_ts(&now_ts());
        self.router
            .control()
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO app_config (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE
                     SET value = excluded.value, updated_at = excluded.updated_at",
                    params![EXPIRY_KEY, minutes.to_string(), now],
                )?;
                Ok(())
            })
            .await?;

        info!(minutes, "Warning expiry updated");
        Ok(minutes)
    }
}

type RawSession = (String, String, String);

fn raw_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSession> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn into_session((name, status, started_at): RawSession) -> Result<Session> {
    Ok(Session {
        name,
        status: status.parse()?,
        started_at: decode_ts(&started_at)?,
    })
}

fn find_by_namespace(conn: &Connection, namespace: &str) -> Result<Option<Session>> {
    conn.query_row(
        "SELECT name, status, started_at FROM sessions WHERE namespace = ?1",
        params![namespace],
        raw_session,
    )
    .optional()?
    .map(into_session)
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PoolOptions;
    use tempfile::TempDir;

    async fn registry(dir: &TempDir) -> SessionRegistry {
        let router = StorageRouter::open(
            &dir.path().join("control.sqlite"),
            &dir.path().join("sessions"),
            PoolOptions::default(),
        )
        .await
        .unwrap();
        SessionRegistry::new(Arc::new(router), 180)
    }

    #[tokio::test]
    async fn test_start_activates_exactly_one() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir).await;

        registry.start("Morning Heat").await.unwrap();
        registry.start("Evening Heat").await.unwrap();

        let sessions = registry.list().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s.is_active()).count(), 1);
        assert_eq!(sessions[0].name, "Evening Heat");
        assert_eq!(
            registry.router().current_namespace().as_deref(),
            Some("evening_heat_db")
        );
    }

    #[tokio::test]
    async fn test_load_reactivates() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir).await;
        let first = registry.start("First").await.unwrap();
        registry.start("Second").await.unwrap();

        let loaded = registry.load("First").await.unwrap();
        assert!(loaded.is_active());
        assert_eq!(loaded.started_at, first.started_at);
        let active = registry.active_session().await.unwrap().unwrap();
        assert_eq!(active.name, "First");
    }

    #[tokio::test]
    async fn test_close_leaves_router() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir).await;
        registry.start("Solo").await.unwrap();

        let closed = registry.close("Solo").await.unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert!(registry.active_session().await.unwrap().is_none());
        assert_eq!(
            registry.router().current_namespace().as_deref(),
            Some("solo_db")
        );

        let err = registry.close("Missing").await.unwrap_err();
        assert!(matches!(err, StewardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_colliding_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir).await;
        registry.start("Race 1").await.unwrap();
        registry.start("Race 2").await.unwrap();

        let err = registry.load("Race_1").await.unwrap_err();
        assert!(matches!(err, StewardError::Conflict(_)));
        let err = registry.delete("race 1").await.unwrap_err();
        assert!(matches!(err, StewardError::Conflict(_)));

        assert_eq!(registry.list().await.unwrap().len(), 2);
        assert_eq!(
            registry.router().current_session().as_deref(),
            Some("Race 2")
        );
        assert!(registry.router().exists("Race 1"));
    }

    #[tokio::test]
    async fn test_delete_removes_orphaned_record() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir).await;
        registry.start("Lost").await.unwrap();
        registry.start("Kept").await.unwrap();
        std::fs::remove_file(dir.path().join("sessions").join("lost_db.sqlite")).unwrap();

        registry.delete("Lost").await.unwrap();

        let sessions = registry.list().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "Kept");

        let err = registry.delete("Lost").await.unwrap_err();
        assert!(matches!(err, StewardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expiry_fallback_and_override() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir).await;

        assert_eq!(registry.warning_expiry_minutes().await.unwrap(), 180);
        registry.set_warning_expiry_minutes(45).await.unwrap();
        assert_eq!(registry.warning_expiry_minutes().await.unwrap(), 45);

        let err = registry.set_warning_expiry_minutes(0).await.unwrap_err();
        assert!(matches!(err, StewardError::Validation(_)));
    }
}
