use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TrySendError};
use tracing::{debug, warn};

use super::StewardEvent;
use crate::config::NotificationConfig;

/// Fire-and-forget event fan-out.
///
/// `publish` only enqueues; a background dispatcher delivers each event to
/// every subscriber and the configured sinks. Delivery failures are logged.
#[derive(Clone)]
pub struct Notifier {
    queue: Option<mpsc::Sender<StewardEvent>>,
    shared: Arc<Shared>,
}

struct Shared {
    config: NotificationConfig,
    logs_dir: Option<PathBuf>,
    observers: Mutex<Vec<UnboundedSender<String>>>,
}

impl Notifier {
    /// Starts the dispatcher on the current Tokio runtime.
    pub fn spawn(config: NotificationConfig, logs_dir: Option<PathBuf>) -> Self {
        let enabled = config.enabled;
        let capacity = config.queue_capacity.max(1);
        let shared = Arc::new(Shared {
            config,
            logs_dir,
            observers: Mutex::new(Vec::new()),
        });

        if !enabled {
            return Self {
                queue: None,
                shared,
            };
        }

        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(dispatch(Arc::clone(&shared), rx));
        Self {
            queue: Some(tx),
            shared,
        }
    }

    pub fn publish(&self, event: StewardEvent) {
        let Some(queue) = &self.queue else {
            return;
        };

        match queue.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(event = event.event_type.as_str(), "Event queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                warn!(event = event.event_type.as_str(), "Event dispatcher gone, dropping event");
            }
        }
    }

    /// Registers an observer. Each delivered event arrives as one JSON string.
    pub fn subscribe(&self) -> UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.observers.lock().push(tx);
        rx
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.lock().len()
    }
}

async fn dispatch(shared: Arc<Shared>, mut rx: mpsc::Receiver<StewardEvent>) {
    while let Some(event) = rx.recv().await {
        shared.deliver(&event).await;
    }
    debug!("Event dispatcher stopped");
}

impl Shared {
    async fn deliver(&self, event: &StewardEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, event = event.event_type.as_str(), "Failed to encode event");
                return;
            }
        };

        {
            let mut observers = self.observers.lock();
            let before = observers.len();
            observers.retain(|observer| observer.send(json.clone()).is_ok());
            if observers.len() < before {
                debug!(pruned = before - observers.len(), "Dropped closed observers");
            }
        }

        if self.config.event_log {
            self.write_event_log(event).await;
        }

        if let Some(hook) = &self.config.hook_command {
            self.run_hook(hook, event, &json).await;
        }
    }

    async fn write_event_log(&self, event: &StewardEvent) {
        let Some(logs_dir) = &self.logs_dir else {
            return;
        };

        let file_stem = event
            .session
            .as_deref()
            .map(|s| s.replace(' ', "_"))
            .unwrap_or_else(|| "control".to_string());
        let log_path = logs_dir.join(format!("{}.log", file_stem));
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let log_line = format!("[{}] {}\n", timestamp, event.summary());

        if let Err(e) = tokio::fs::create_dir_all(logs_dir).await {
            warn!(error = %e, "Failed to create logs directory");
            return;
        }

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await;

        match result {
            Ok(mut file) => {
                if let Err(e) = file.write_all(log_line.as_bytes()).await {
                    warn!(error = %e, "Failed to write event log");
                }
            }
            Err(e) => {
                warn!(error = %e, path = %log_path.display(), "Failed to open event log");
            }
        }
    }

    async fn run_hook(&self, hook_cmd: &str, event: &StewardEvent, json: &str) {
        let result = Command::new("sh")
            .args(["-c", hook_cmd])
            .env("STEWARD_EVENT", event.event_type.as_str())
            .env("STEWARD_SESSION", event.session.as_deref().unwrap_or(""))
            .env("STEWARD_EVENT_JSON", json)
            .output()
            .await;

        match result {
            Ok(output) if !output.status.success() => {
                debug!(hook = %hook_cmd, status = %output.status, "Hook exited with failure");
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, hook = %hook_cmd, "Failed to run hook"),
        }
    }
}
