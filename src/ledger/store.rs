use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info};

use super::types::{
    AppliedPenalties, HistoryAction, HistoryEntry, Infringement, InfringementInput, Page,
};
use crate::config::LedgerConfig;
use crate::error::{Result, StewardError};
use crate::rules::{Category, Decision, PriorInfringement, RuleEngine};
use crate::session::SessionRegistry;
use crate::storage::{NamespaceHandle, encode_ts, now_ts};

const COLUMNS: &str = "id, kart_number, turn_number, description, observer, warning_count, \
                       penalty_due, penalty_description, penalty_taken_at, created_at";

/// Infringement CRUD against whichever namespace the router currently targets.
pub struct InfringementLedger {
    registry: Arc<SessionRegistry>,
    engine: RuleEngine,
    config: LedgerConfig,
}

impl InfringementLedger {
    pub fn new(registry: Arc<SessionRegistry>, engine: RuleEngine, config: LedgerConfig) -> Self {
        Self {
            registry,
            engine,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn current(&self) -> NamespaceHandle {
        self.registry.router().current()
    }

    /// Classifies, persists and audits a new infringement in one transaction.
    pub async fn record(&self, input: InfringementInput) -> Result<Infringement> {
        input.validate()?;
        let window = self.registry.warning_expiry_minutes().await?;
        let engine = self.engine.clone();
        let now = now_ts();

        let infringement = self
            .current()
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let history = prior_for_kart(&tx, input.kart_number, now, i64::MAX)?;
                let decision = engine.decide(
                    &input.description,
                    input.penalty_description.as_deref(),
                    now,
                    window,
                    &history,
                );

                tx.execute(
                    "INSERT INTO infringements (kart_number, turn_number, description, observer,
                         warning_count, penalty_due, penalty_description, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        input.kart_number,
                        input.turn_number,
                        input.description,
                        input.observer,
                        decision.warning_count,
                        decision.penalty_due,
                        decision.penalty_description,
                        encode_ts(&now),
                    ],
                )?;
                let id = tx.last_insert_rowid();
                append_history(
                    &tx,
                    id,
                    HistoryAction::Created,
                    &input.performed_by,
                    input.observer.as_deref(),
                    &describe(&input.description, &decision),
                    now,
                )?;
                let infringement = require(&tx, id)?;
                tx.commit()?;
                Ok(infringement)
            })
            .await?;

        info!(
            id = infringement.id,
            kart = infringement.kart_number,
            warning_count = infringement.warning_count,
            penalty_due = infringement.penalty_due,
            "Infringement recorded"
        );
        Ok(infringement)
    }

    /// Rewrites an infringement and re-derives its decision at its original time.
    ///
    /// Only infringements strictly before this one count as history, so an
    /// unchanged input yields an unchanged warning count. A served penalty
    /// stays served.
    pub async fn amend(&self, id: i64, input: InfringementInput) -> Result<Infringement> {
        input.validate()?;
        let window = self.registry.warning_expiry_minutes().await?;
        let engine = self.engine.clone();

        let infringement = self
            .current()
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let existing = require(&tx, id)?;
                let at = existing.created_at;

                let history = prior_for_kart(&tx, input.kart_number, at, id)?;
                let mut decision = engine.decide(
                    &input.description,
                    input.penalty_description.as_deref(),
                    at,
                    window,
                    &history,
                );
                if existing.penalty_taken_at.is_some() {
                    decision.penalty_due = false;
                    if decision.category.is_line() {
                        decision.warning_count = 0;
                    }
                }

                tx.execute(
                    "UPDATE infringements
                     SET kart_number = ?1, turn_number = ?2, description = ?3, observer = ?4,
                         warning_count = ?5, penalty_due = ?6, penalty_description = ?7
                     WHERE id = ?8",
                    params![
                        input.kart_number,
                        input.turn_number,
                        input.description,
                        input.observer,
                        decision.warning_count,
                        decision.penalty_due,
                        decision.penalty_description,
                        id,
                    ],
                )?;
                append_history(
                    &tx,
                    id,
                    HistoryAction::Updated,
                    &input.performed_by,
                    input.observer.as_deref(),
                    &format!(
                        "Updated infringement {}: {}",
                        id,
                        describe(&input.description, &decision)
                    ),
                    now_ts(),
                )?;
                let infringement = require(&tx, id)?;
                tx.commit()?;
                Ok(infringement)
            })
            .await?;

        info!(id, kart = infringement.kart_number, "Infringement amended");
        Ok(infringement)
    }

    /// Audits then deletes an infringement. The delete cascades to its history.
    pub async fn remove(&self, id: i64, performed_by: &str) -> Result<Infringement> {
        let performed_by = performed_by.to_string();
        let removed = self
            .current()
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let existing = require(&tx, id)?;
                append_history(
                    &tx,
                    id,
                    HistoryAction::Deleted,
                    &performed_by,
                    existing.observer.as_deref(),
                    &format!("Deleted infringement {}: {}", id, existing.description),
                    now_ts(),
                )?;
                tx.execute("DELETE FROM infringements WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(existing)
            })
            .await?;

        info!(id, kart = removed.kart_number, "Infringement removed");
        Ok(removed)
    }

    /// Serves the pending penalty of one infringement.
    pub async fn apply_penalty(&self, id: i64, performed_by: &str) -> Result<Infringement> {
        let performed_by = performed_by.to_string();
        let applied = self
            .current()
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let existing = require(&tx, id)?;
                if !existing.penalty_due {
                    return Err(StewardError::InvalidState(format!(
                        "no pending penalty for infringement {}",
                        id
                    )));
                }

                let now = now_ts();
                serve(&tx, &existing, now)?;
                append_history(
                    &tx,
                    id,
                    HistoryAction::PenaltyApplied,
                    &performed_by,
                    None,
                    &format!(
                        "Individual penalty applied: {}",
                        existing.penalty_description.as_deref().unwrap_or("")
                    ),
                    now,
                )?;
                let applied = require(&tx, id)?;
                tx.commit()?;
                Ok(applied)
            })
            .await?;

        info!(id, kart = applied.kart_number, "Penalty applied");
        Ok(applied)
    }

    /// Serves every pending penalty of a kart in one transaction.
    pub async fn apply_all_pending(
        &self,
        kart_number: i64,
        performed_by: &str,
    ) -> Result<AppliedPenalties> {
        let performed_by = performed_by.to_string();
        let outcome = self
            .current()
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let pending = query_infringements(
                    &tx,
                    &format!(
                        "SELECT {} FROM infringements
                         WHERE kart_number = ?1 AND penalty_due = 1
                         ORDER BY created_at ASC, id ASC",
                        COLUMNS
                    ),
                    params![kart_number],
                )?;
                if pending.is_empty() {
                    return Err(StewardError::InvalidState(format!(
                        "no pending penalty for kart {}",
                        kart_number
                    )));
                }

                let now = now_ts();
                let mut applied = Vec::with_capacity(pending.len());
                for existing in &pending {
                    serve(&tx, existing, now)?;
                    append_history(
                        &tx,
                        existing.id,
                        HistoryAction::PenaltyApplied,
                        &performed_by,
                        None,
                        "Penalty applied and warnings reset if line infringement",
                        now,
                    )?;
                    applied.push(require(&tx, existing.id)?);
                }
                tx.commit()?;
                Ok(AppliedPenalties {
                    kart_number,
                    applied,
                    penalty_taken_at: now,
                })
            })
            .await?;

        info!(
            kart = kart_number,
            count = outcome.applied.len(),
            "Pending penalties applied"
        );
        Ok(outcome)
    }

    /// Outstanding penalties, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<Infringement>> {
        self.current()
            .run(|conn| {
                query_infringements(
                    conn,
                    &format!(
                        "SELECT {} FROM infringements WHERE penalty_due = 1
                         ORDER BY created_at ASC, id ASC",
                        COLUMNS
                    ),
                    [],
                )
            })
            .await
    }

    /// Every infringement of the current session, newest first.
    pub async fn list_all(&self) -> Result<Vec<Infringement>> {
        self.current()
            .run(|conn| {
                query_infringements(
                    conn,
                    &format!(
                        "SELECT {} FROM infringements ORDER BY created_at DESC, id DESC",
                        COLUMNS
                    ),
                    [],
                )
            })
            .await
    }

    /// Newest-first page. Out-of-range pages fall back to page 1 and the page
    /// size is clamped to `[1, max_page_size]`.
    pub async fn list_paginated(
        &self,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<Page<Infringement>> {
        let page_size = page_size
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size.max(1));

        let result = self
            .current()
            .run(move |conn| {
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM infringements", [], |row| row.get(0))?;
                let total = u64::try_from(total).unwrap_or(0);
                let total_pages = u32::try_from(total.div_ceil(u64::from(page_size)))
                    .unwrap_or(u32::MAX);
                let page = if page < 1 || page > total_pages.max(1) {
                    1
                } else {
                    page
                };

                let offset = i64::from(page - 1) * i64::from(page_size);
                let items = query_infringements(
                    conn,
                    &format!(
                        "SELECT {} FROM infringements ORDER BY created_at DESC, id DESC
                         LIMIT ?1 OFFSET ?2",
                        COLUMNS
                    ),
                    params![page_size, offset],
                )?;

                Ok(Page {
                    items,
                    total,
                    page,
                    page_size,
                    total_pages,
                })
            })
            .await?;

        debug!(
            page = result.page,
            page_size = result.page_size,
            total = result.total,
            "Listed infringement page"
        );
        Ok(result)
    }

    pub async fn get(&self, id: i64) -> Result<Infringement> {
        self.current().run(move |conn| require(conn, id)).await
    }

    /// Audit trail of every infringement of a kart, newest first.
    pub async fn history_for_kart(&self, kart_number: i64) -> Result<Vec<HistoryEntry>> {
        self.current()
            .run(move |conn| {
                let known: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM infringements WHERE kart_number = ?1",
                    params![kart_number],
                    |row| row.get(0),
                )?;
                if known == 0 {
                    return Err(StewardError::NotFound(format!(
                        "no infringements for kart {}",
                        kart_number
                    )));
                }

                query_history(
                    conn,
                    "SELECT h.id, h.infringement_id, h.action, h.performed_by, h.observer,
                            h.details, h.timestamp
                     FROM infringement_history h
                     JOIN infringements i ON i.id = h.infringement_id
                     WHERE i.kart_number = ?1
                     ORDER BY h.timestamp DESC, h.id DESC",
                    params![kart_number],
                )
            })
            .await
    }
}

/// Earlier infringements of `kart_number`: created before `at`, or at `at`
/// with a lower id than `before_id`.
fn prior_for_kart(
    conn: &Connection,
    kart_number: i64,
    at: DateTime<Utc>,
    before_id: i64,
) -> Result<Vec<PriorInfringement>> {
    let mut stmt = conn.prepare(
        "SELECT description, created_at, penalty_due, penalty_taken_at
         FROM infringements
         WHERE kart_number = ?1
           AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))",
    )?;
    let rows = stmt.query_map(params![kart_number, encode_ts(&at), before_id], |row| {
        let penalty_due: bool = row.get(2)?;
        let taken: Option<String> = row.get(3)?;
        Ok(PriorInfringement {
            description: row.get(0)?,
            created_at: ts_column(row, 1)?,
            carries_penalty: penalty_due || taken.is_some(),
        })
    })?;

    let mut prior = Vec::new();
    for row in rows {
        prior.push(row?);
    }
    Ok(prior)
}

fn serve(conn: &Connection, existing: &Infringement, now: DateTime<Utc>) -> Result<()> {
    let warning_count = if Category::classify(&existing.description).is_line() {
        0
    } else {
        existing.warning_count
    };
    conn.execute(
        "UPDATE infringements
         SET penalty_due = 0, penalty_taken_at = ?1, warning_count = ?2
         WHERE id = ?3",
        params![encode_ts(&now), warning_count, existing.id],
    )?;
    Ok(())
}

pub(super) fn append_history(
    conn: &Connection,
    infringement_id: i64,
    action: HistoryAction,
    performed_by: &str,
    observer: Option<&str>,
    details: &str,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO infringement_history
             (infringement_id, action, performed_by, observer, details, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            infringement_id,
            action.as_str(),
            performed_by,
            observer,
            details,
            encode_ts(&timestamp)
        ],
    )?;
    Ok(())
}

fn describe(description: &str, decision: &Decision) -> String {
    format!(
        "{} | warning_count={} | penalty_due={} | penalty_description={}",
        description,
        decision.warning_count,
        decision.penalty_due,
        decision.penalty_description.as_deref().unwrap_or("none")
    )
}

pub(super) fn require(conn: &Connection, id: i64) -> Result<Infringement> {
    conn.query_row(
        &format!("SELECT {} FROM infringements WHERE id = ?1", COLUMNS),
        params![id],
        read_infringement,
    )
    .optional()?
    .ok_or_else(|| StewardError::NotFound(format!("infringement {} not found", id)))
}

pub(super) fn query_infringements(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Infringement>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, read_infringement)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub(super) fn query_history(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        let action: String = row.get(2)?;
        Ok(HistoryEntry {
            id: row.get(0)?,
            infringement_id: row.get(1)?,
            action: action.parse::<HistoryAction>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
            })?,
            performed_by: row.get(3)?,
            observer: row.get(4)?,
            details: row.get(5)?,
            timestamp: ts_column(row, 6)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn read_infringement(row: &Row<'_>) -> rusqlite::Result<Infringement> {
    let taken: Option<String> = row.get(8)?;
    Ok(Infringement {
        id: row.get(0)?,
        kart_number: row.get(1)?,
        turn_number: row.get(2)?,
        description: row.get(3)?,
        observer: row.get(4)?,
        warning_count: row.get(5)?,
        penalty_due: row.get(6)?,
        penalty_description: row.get(7)?,
        penalty_taken_at: taken.as_deref().map(|raw| parse_ts(8, raw)).transpose()?,
        created_at: ts_column(row, 9)?,
    })
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
