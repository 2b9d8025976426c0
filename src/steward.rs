use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::StewardConfig;
use crate::error::Result;
use crate::ledger::{
    AppliedPenalties, HistoryEntry, ImportSummary, Infringement, InfringementInput,
    InfringementLedger, Page, SessionSnapshot, read_snapshot, write_snapshot,
};
use crate::notification::{EventType, Notifier, StewardEvent};
use crate::rules::RuleEngine;
use crate::session::{Session, SessionRegistry};
use crate::storage::{PoolOptions, StorageRouter};

/// Entry point wiring storage, sessions, the ledger and notifications.
///
/// Every mutation publishes its event after the write has committed.
pub struct Steward {
    config: StewardConfig,
    registry: Arc<SessionRegistry>,
    ledger: InfringementLedger,
    notifier: Notifier,
}

impl Steward {
    /// Opens the data directory and re-attaches the last active session.
    pub async fn open(config: StewardConfig) -> Result<Self> {
        config.validate()?;

        let options = PoolOptions {
            size: config.storage.pool_size,
            busy_timeout: Duration::from_millis(config.storage.busy_timeout_ms),
        };
        let router = StorageRouter::open(&config.control_db_path(), &config.sessions_dir(), options)
            .await?;
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(router),
            config.rules.warning_expiry_minutes,
        ));
        let ledger = InfringementLedger::new(
            Arc::clone(&registry),
            RuleEngine::new(&config.rules),
            config.ledger.clone(),
        );
        let notifier = Notifier::spawn(config.notification.clone(), Some(config.logs_dir()));

        if let Some(session) = registry.restore_on_startup().await {
            info!(session = %session.name, "Resuming session");
        }

        Ok(Self {
            config,
            registry,
            ledger,
            notifier,
        })
    }

    pub fn config(&self) -> &StewardConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &InfringementLedger {
        &self.ledger
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn router(&self) -> &Arc<StorageRouter> {
        self.registry.router()
    }

    pub async fn start_session(&self, name: &str) -> Result<Session> {
        let session = self.registry.start(name).await?;
        self.emit_session(EventType::SessionStarted, &session.name, None);
        Ok(session)
    }

    pub async fn load_session(&self, name: &str) -> Result<Session> {
        let session = self.registry.load(name).await?;
        self.emit_session(EventType::SessionLoaded, &session.name, None);
        Ok(session)
    }

    pub async fn close_session(&self, name: &str) -> Result<Session> {
        let session = self.registry.close(name).await?;
        self.emit_session(EventType::SessionClosed, &session.name, None);
        Ok(session)
    }

    pub async fn delete_session(&self, name: &str) -> Result<()> {
        self.registry.delete(name).await?;
        self.emit_session(EventType::SessionDeleted, name, None);
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.registry.list().await
    }

    pub async fn active_session(&self) -> Result<Option<Session>> {
        self.registry.active_session().await
    }

    pub async fn export_session(&self, name: &str) -> Result<SessionSnapshot> {
        self.ledger.export_snapshot(name).await
    }

    /// Exports into the configured export directory and returns the file path.
    pub async fn export_session_to_file(&self, name: &str) -> Result<PathBuf> {
        let snapshot = self.ledger.export_snapshot(name).await?;
        let path = write_snapshot(&snapshot, &self.config.export_dir()).await?;
        info!(session = name, path = %path.display(), "Snapshot written");
        Ok(path)
    }

    pub async fn import_session(
        &self,
        snapshot: SessionSnapshot,
        name_override: Option<&str>,
    ) -> Result<ImportSummary> {
        let summary = self.ledger.import_snapshot(snapshot, name_override).await?;
        self.emit_session(
            EventType::SessionImported,
            &summary.session.name,
            Some(json!({
                "infringements": summary.infringements,
                "history": summary.history,
            })),
        );
        Ok(summary)
    }

    pub async fn import_session_file(
        &self,
        path: &Path,
        name_override: Option<&str>,
    ) -> Result<ImportSummary> {
        let snapshot = read_snapshot(path).await?;
        self.import_session(snapshot, name_override).await
    }

    pub async fn record(&self, input: InfringementInput) -> Result<Infringement> {
        let infringement = self.ledger.record(input).await?;
        self.emit(EventType::NewInfringement, to_payload(&infringement));
        Ok(infringement)
    }

    pub async fn amend(&self, id: i64, input: InfringementInput) -> Result<Infringement> {
        let infringement = self.ledger.amend(id, input).await?;
        self.emit(EventType::UpdateInfringement, to_payload(&infringement));
        Ok(infringement)
    }

    pub async fn remove(&self, id: i64, performed_by: &str) -> Result<Infringement> {
        let removed = self.ledger.remove(id, performed_by).await?;
        self.emit(
            EventType::DeleteInfringement,
            json!({ "id": removed.id, "description": removed.description }),
        );
        Ok(removed)
    }

    pub async fn apply_penalty(&self, id: i64, performed_by: &str) -> Result<Infringement> {
        let applied = self.ledger.apply_penalty(id, performed_by).await?;
        self.emit(
            EventType::PenaltyApplied,
            json!({
                "kart_number": applied.kart_number,
                "infringement_id": applied.id,
                "penalty_description": applied.penalty_description,
                "penalty_taken_at": applied.penalty_taken_at,
            }),
        );
        Ok(applied)
    }

    pub async fn apply_all_pending(
        &self,
        kart_number: i64,
        performed_by: &str,
    ) -> Result<AppliedPenalties> {
        let outcome = self.ledger.apply_all_pending(kart_number, performed_by).await?;
        self.emit(
            EventType::PenaltyApplied,
            json!({
                "kart_number": outcome.kart_number,
                "infringement_ids": outcome.applied.iter().map(|i| i.id).collect::<Vec<_>>(),
                "penalty_taken_at": outcome.penalty_taken_at,
            }),
        );
        Ok(outcome)
    }

    pub async fn list_pending(&self) -> Result<Vec<Infringement>> {
        self.ledger.list_pending().await
    }

    pub async fn list_paginated(
        &self,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<Page<Infringement>> {
        self.ledger.list_paginated(page, page_size).await
    }

    pub async fn list_all(&self) -> Result<Vec<Infringement>> {
        self.ledger.list_all().await
    }

    pub async fn get(&self, id: i64) -> Result<Infringement> {
        self.ledger.get(id).await
    }

    pub async fn history_for_kart(&self, kart_number: i64) -> Result<Vec<HistoryEntry>> {
        self.ledger.history_for_kart(kart_number).await
    }

    pub async fn warning_expiry_minutes(&self) -> Result<i64> {
        self.registry.warning_expiry_minutes().await
    }

    pub async fn set_warning_expiry_minutes(&self, minutes: i64) -> Result<i64> {
        self.registry.set_warning_expiry_minutes(minutes).await
    }

    fn emit(&self, event_type: EventType, data: Value) {
        let mut event = StewardEvent::new(event_type).with_data(data);
        if let Some(session) = self.router().current_session() {
            event = event.with_session(session);
        }
        self.notifier.publish(event);
    }

    fn emit_session(&self, event_type: EventType, name: &str, imported: Option<Value>) {
        let mut data = json!({ "name": name });
        if let Some(imported) = imported {
            data["imported"] = imported;
        }
        self.notifier.publish(
            StewardEvent::new(event_type)
                .with_session(name)
                .with_data(data),
        );
    }
}

fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to encode event payload");
        Value::Null
    })
}
