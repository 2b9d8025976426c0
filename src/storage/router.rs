//! Routes storage access to the namespace of the active session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::namespace::{Namespace, NamespaceHandle, PoolOptions};
use super::schema::SchemaKind;
use crate::error::{Result, StewardError};

const CONTROL_NAMESPACE: &str = "control";
const NAMESPACE_SUFFIX: &str = "_db";
const NAMESPACE_EXT: &str = "sqlite";

/// Deterministic namespace id for a session name: lowercased, spaces to `_`, suffixed.
pub fn namespace_id(session_name: &str) -> String {
    format!(
        "{}{}",
        session_name.trim().to_lowercase().replace(' ', "_"),
        NAMESPACE_SUFFIX
    )
}

struct Current {
    /// Namespace id; `None` while the router points at the control namespace.
    session: Option<String>,
    /// Session name as given to `switch_to`.
    name: Option<String>,
    handle: NamespaceHandle,
}

pub struct StorageRouter {
    control: NamespaceHandle,
    sessions_dir: PathBuf,
    options: PoolOptions,
    current: RwLock<Current>,
    /// Serializes switchers so pools are opened outside the pointer lock.
    switch_lock: tokio::sync::Mutex<()>,
    /// Every pool handed out for a namespace, so `drop` can reach in-flight holders.
    live: Mutex<HashMap<String, Vec<Weak<Namespace>>>>,
}

impl StorageRouter {
    /// Opens (or creates) the control namespace and points the router at it.
    pub async fn open(control_path: &Path, sessions_dir: &Path, options: PoolOptions) -> Result<Self> {
        let control_path = control_path.to_path_buf();
        let control = tokio::task::spawn_blocking(move || {
            Namespace::open_or_provision(CONTROL_NAMESPACE, &control_path, SchemaKind::Control, options)
        })
        .await
        .map_err(|e| StewardError::Internal(format!("Control open task failed: {}", e)))??;
        let control = Arc::new(control);

        tokio::fs::create_dir_all(sessions_dir).await?;

        info!(sessions_dir = %sessions_dir.display(), "Storage router ready");
        Ok(Self {
            current: RwLock::new(Current {
                session: None,
                name: None,
                handle: Arc::clone(&control),
            }),
            control,
            sessions_dir: sessions_dir.to_path_buf(),
            options,
            switch_lock: tokio::sync::Mutex::new(()),
            live: Mutex::new(HashMap::new()),
        })
    }

    /// The registry namespace. Never released for the router's lifetime.
    pub fn control(&self) -> NamespaceHandle {
        Arc::clone(&self.control)
    }

    /// Handle in effect right now: the active session's pool, or control.
    pub fn current(&self) -> NamespaceHandle {
        Arc::clone(&self.current.read().handle)
    }

    /// Namespace id the router currently targets, `None` for control.
    pub fn current_namespace(&self) -> Option<String> {
        self.current.read().session.clone()
    }

    /// Name of the session the router currently targets, `None` for control.
    pub fn current_session(&self) -> Option<String> {
        self.current.read().name.clone()
    }

    pub fn exists(&self, session_name: &str) -> bool {
        self.namespace_path(&namespace_id(session_name)).exists()
    }

    /// Handle for a specific session without switching to it.
    ///
    /// Returns the current pool when `session_name` is already active.
    pub async fn handle_for(&self, session_name: &str) -> Result<NamespaceHandle> {
        let id = namespace_id(session_name);
        {
            let current = self.current.read();
            if current.session.as_deref() == Some(id.as_str()) {
                return Ok(Arc::clone(&current.handle));
            }
        }

        let path = self.namespace_path(&id);
        let options = PoolOptions {
            size: 1,
            ..self.options
        };
        let task_id = id.clone();
        let namespace = tokio::task::spawn_blocking(move || {
            Namespace::open(&task_id, &path, SchemaKind::Session, options)
        })
        .await
        .map_err(|e| StewardError::Internal(format!("Namespace open task failed: {}", e)))??;

        let handle = Arc::new(namespace);
        self.track(&handle);
        debug!(namespace = %id, "Opened detached namespace handle");
        Ok(handle)
    }

    /// Provisions a fresh, empty namespace for `session_name`.
    pub async fn create(&self, session_name: &str) -> Result<NamespaceHandle> {
        let id = namespace_id(session_name);
        let path = self.namespace_path(&id);
        let options = PoolOptions {
            size: 1,
            ..self.options
        };

        let task_id = id.clone();
        let namespace = tokio::task::spawn_blocking(move || {
            Namespace::provision(&task_id, &path, SchemaKind::Session, options)
        })
        .await
        .map_err(|e| StewardError::Internal(format!("Namespace create task failed: {}", e)))??;

        let handle = Arc::new(namespace);
        self.track(&handle);
        info!(namespace = %id, "Namespace created");
        Ok(handle)
    }

    /// Points the router at `session_name`'s namespace.
    ///
    /// The new pool is opened before the pointer swap; the previous pool is
    /// released after it, so readers always see a usable handle.
    pub async fn switch_to(&self, session_name: &str) -> Result<()> {
        let id = namespace_id(session_name);
        if self.current.read().session.as_deref() == Some(id.as_str()) {
            debug!(namespace = %id, "Already on namespace, skipping switch");
            return Ok(());
        }

        let _switching = self.switch_lock.lock().await;
        if self.current.read().session.as_deref() == Some(id.as_str()) {
            return Ok(());
        }

        let path = self.namespace_path(&id);
        let options = self.options;
        let task_id = id.clone();
        let namespace = tokio::task::spawn_blocking(move || {
            Namespace::open(&task_id, &path, SchemaKind::Session, options)
        })
        .await
        .map_err(|e| StewardError::Internal(format!("Namespace open task failed: {}", e)))??;
        let handle = Arc::new(namespace);
        self.track(&handle);

        let previous = {
            let mut current = self.current.write();
            let previous = std::mem::replace(
                &mut *current,
                Current {
                    session: Some(id.clone()),
                    name: Some(session_name.to_string()),
                    handle,
                },
            );
            previous.handle
        };

        info!(namespace = %id, "Switched active namespace");
        self.release(previous);
        Ok(())
    }

    /// Points the router back at the control namespace.
    pub async fn reset_to_control(&self) {
        let _switching = self.switch_lock.lock().await;
        let previous = {
            let mut current = self.current.write();
            if current.session.is_none() {
                return;
            }
            std::mem::replace(
                &mut *current,
                Current {
                    session: None,
                    name: None,
                    handle: Arc::clone(&self.control),
                },
            )
            .handle
        };
        info!("Router reset to control namespace");
        self.release(previous);
    }

    /// Terminates every live pool of the namespace and deletes its files.
    pub async fn drop_namespace(&self, session_name: &str) -> Result<()> {
        let id = namespace_id(session_name);
        let path = self.namespace_path(&id);

        let _switching = self.switch_lock.lock().await;
        if !path.exists() {
            return Err(StewardError::NotFound(format!(
                "namespace '{}' does not exist",
                id
            )));
        }
        let previous = {
            let mut current = self.current.write();
            if current.session.as_deref() == Some(id.as_str()) {
                Some(
                    std::mem::replace(
                        &mut *current,
                        Current {
                            session: None,
                            name: None,
                            handle: Arc::clone(&self.control),
                        },
                    )
                    .handle,
                )
            } else {
                None
            }
        };
        if let Some(previous) = previous {
            self.release(previous);
        }

        let terminated = self.terminate_live(&id);
        debug!(namespace = %id, terminated, "Live pools terminated");

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StewardError::NotFound(format!(
                    "namespace '{}' does not exist",
                    id
                )));
            }
            Err(e) => return Err(e.into()),
        }
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists()
                && let Err(e) = tokio::fs::remove_file(&sidecar).await
            {
                warn!(path = %sidecar.display(), error = %e, "Failed to remove namespace sidecar");
            }
        }

        info!(namespace = %id, "Namespace dropped");
        Ok(())
    }

    fn namespace_path(&self, id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.{}", id, NAMESPACE_EXT))
    }

    fn track(&self, handle: &NamespaceHandle) {
        let mut live = self.live.lock();
        let pools = live.entry(handle.id().to_string()).or_default();
        pools.retain(|weak| weak.strong_count() > 0);
        pools.push(Arc::downgrade(handle));
    }

    fn terminate_live(&self, id: &str) -> usize {
        let pools = self.live.lock().remove(id).unwrap_or_default();
        pools
            .iter()
            .filter_map(Weak::upgrade)
            .inspect(|ns| ns.terminate())
            .count()
    }

    /// Drops the router's reference; the pool drains as in-flight holders finish.
    fn release(&self, previous: NamespaceHandle) {
        if previous.is_control() {
            return;
        }
        let in_flight = Arc::strong_count(&previous) - 1;
        debug!(namespace = %previous.id(), in_flight, "Releasing previous pool");
        drop(previous);
    }
}

impl std::fmt::Debug for StorageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRouter")
            .field("sessions_dir", &self.sessions_dir)
            .field("current", &self.current_namespace())
            .finish()
    }
}
