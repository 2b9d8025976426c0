//! One storage namespace: a SQLite database file plus its connection pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::fault::storage_err;
use super::schema::{SchemaKind, init_schema};
use crate::error::{Result, StewardError};

/// Shared handle to a live namespace. The pool closes once the last handle drops.
pub type NamespaceHandle = Arc<Namespace>;

/// Settings applied to every pooled connection.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub size: usize,
    pub busy_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: 4,
            busy_timeout: Duration::from_millis(5_000),
        }
    }
}

pub struct Namespace {
    id: String,
    path: PathBuf,
    kind: SchemaKind,
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
    terminated: AtomicBool,
}

impl Namespace {
    /// Creates the database file exclusively and initializes its schema.
    ///
    /// The exclusive create is the cross-process uniqueness check: of two
    /// creators racing on one file, exactly one succeeds.
    pub(crate) fn provision(
        id: &str,
        path: &Path,
        kind: SchemaKind,
        options: PoolOptions,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StewardError::AlreadyExists(format!(
                    "namespace '{}' already exists",
                    id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let namespace = Self::open(id, path, kind, options)?;
        {
            let conn = namespace.checkout()?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| storage_err("Failed to enable WAL", e))?;
            init_schema(&conn, kind)?;
        }
        debug!(namespace = id, path = %path.display(), "Namespace provisioned");
        Ok(namespace)
    }

    /// Opens an existing namespace; `NotFound` when the file is absent.
    pub(crate) fn open(id: &str, path: &Path, kind: SchemaKind, options: PoolOptions) -> Result<Self> {
        if !path.exists() {
            return Err(StewardError::NotFound(format!("namespace '{}' does not exist", id)));
        }

        let size = options.size.max(1);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| storage_err("Failed to open connection", e))?;
            conn.busy_timeout(options.busy_timeout)
                .map_err(|e| storage_err("Failed to set busy timeout", e))?;
            conn.pragma_update(None, "foreign_keys", "ON")
                .map_err(|e| storage_err("Failed to enable foreign keys", e))?;
            connections.push(Mutex::new(conn));
        }

        debug!(namespace = id, pool_size = size, "Connection pool opened");
        Ok(Self {
            id: id.to_string(),
            path: path.to_path_buf(),
            kind,
            connections,
            next: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
        })
    }

    /// Opens the control namespace, creating it on first use.
    pub(crate) fn open_or_provision(
        id: &str,
        path: &Path,
        kind: SchemaKind,
        options: PoolOptions,
    ) -> Result<Self> {
        match Self::provision(id, path, kind, options) {
            Err(StewardError::AlreadyExists(_)) => {
                let namespace = Self::open(id, path, kind, options)?;
                init_schema(&*namespace.checkout()?, kind)?;
                Ok(namespace)
            }
            other => other,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn is_control(&self) -> bool {
        self.kind == SchemaKind::Control
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Refuses every later checkout. In-flight holders finish normally.
    pub(crate) fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            debug!(namespace = %self.id, "Namespace terminated");
        }
    }

    pub(crate) fn checkout(&self) -> Result<MutexGuard<'_, Connection>> {
        if self.is_terminated() {
            return Err(StewardError::StorageUnavailable(format!(
                "namespace '{}' has been dropped",
                self.id
            )));
        }

        for slot in &self.connections {
            if let Some(guard) = slot.try_lock() {
                return Ok(guard);
            }
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        Ok(self.connections[idx].lock())
    }

    /// Runs blocking storage work on a pooled connection off the async runtime.
    pub async fn run<T, F>(self: &Arc<Self>, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let namespace = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let mut guard = namespace.checkout()?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StewardError::Internal(format!("Storage task failed: {}", e)))?
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        debug!(namespace = %self.id, "Connection pool released");
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("pool_size", &self.connections.len())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
