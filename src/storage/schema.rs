//! Table layouts for the control namespace and for session namespaces.

use rusqlite::Connection;

use super::fault::storage_err;
use crate::error::Result;

const SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Session registry and application settings.
    Control,
    /// Infringements and their audit history.
    Session,
}

pub(crate) fn init_schema(conn: &Connection, kind: SchemaKind) -> Result<()> {
    let ddl = match kind {
        SchemaKind::Control => {
            r"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                namespace TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

            CREATE TABLE IF NOT EXISTS app_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "
        }
        SchemaKind::Session => {
            r"
            CREATE TABLE IF NOT EXISTS infringements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kart_number INTEGER NOT NULL,
                turn_number TEXT,
                description TEXT NOT NULL,
                observer TEXT,
                warning_count INTEGER NOT NULL DEFAULT 0,
                penalty_due INTEGER NOT NULL DEFAULT 0,
                penalty_description TEXT,
                penalty_taken_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_infringements_kart
                ON infringements(kart_number, created_at);
            CREATE INDEX IF NOT EXISTS idx_infringements_due
                ON infringements(penalty_due, created_at);

            CREATE TABLE IF NOT EXISTS infringement_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                infringement_id INTEGER NOT NULL
                    REFERENCES infringements(id) ON DELETE CASCADE,
                action TEXT NOT NULL,
                performed_by TEXT NOT NULL,
                observer TEXT,
                details TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_history_infringement
                ON infringement_history(infringement_id, timestamp);
            "
        }
    };

    conn.execute_batch(ddl)
        .map_err(|e| storage_err("Failed to init schema", e))?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
         INSERT OR IGNORE INTO schema_version VALUES ({});",
        SCHEMA_VERSION
    ))
    .map_err(|e| storage_err("Failed to record schema version", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_schema_cascades_history() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        init_schema(&conn, SchemaKind::Session).unwrap();

        conn.execute(
            "INSERT INTO infringements (kart_number, description, created_at) VALUES (7, 'x', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO infringement_history (infringement_id, action, performed_by, details, timestamp)
             VALUES (1, 'created', 'clerk', 'x', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM infringements WHERE id = 1", []).unwrap();

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM infringement_history", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, SchemaKind::Control).unwrap();
        init_schema(&conn, SchemaKind::Control).unwrap();
    }
}
