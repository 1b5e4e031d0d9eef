//! Change Ledger
//!
//! Durable record of staged changes. Every status transition is predicated
//! on `status = 'pending'`, so two racing transitions of the same entry
//! cannot both succeed.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, illegal_transition, not_found, Result};
use crate::repo::{from_millis, in_transaction, to_millis};
use chrono::Utc;
use netstage_core::errors::ExError;
use netstage_core::model::{
    ChangeConfig, ChangeStatus, ChangeType, NewChange, PendingChange, DEFAULT_PRIORITY,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, change_type, action, resource_id, current_config, pending_config, \
                       description, priority, status, last_error, created_at, updated_at";

const APPLY_ORDER: &str = "ORDER BY priority ASC, created_at ASC, seq ASC";

/// Row as stored, before enum and payload decoding
struct StoredChange {
    id: String,
    change_type: String,
    action: String,
    resource_id: String,
    current_config: Option<String>,
    pending_config: String,
    description: String,
    priority: i64,
    status: String,
    last_error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl StoredChange {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            change_type: row.get(1)?,
            action: row.get(2)?,
            resource_id: row.get(3)?,
            current_config: row.get(4)?,
            pending_config: row.get(5)?,
            description: row.get(6)?,
            priority: row.get(7)?,
            status: row.get(8)?,
            last_error: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn decode(self) -> Result<PendingChange> {
        let op = "decode_change";
        let with_id = |e: netstage_core::NetStageError| {
            ExError::from(e).with_op(op).with_change_id(self.id.clone())
        };
        let change_type: ChangeType = self.change_type.parse().map_err(with_id)?;
        let current_config = self
            .current_config
            .as_deref()
            .map(|json| ChangeConfig::from_json(change_type, json))
            .transpose()
            .map_err(with_id)?;
        let pending_config =
            ChangeConfig::from_json(change_type, &self.pending_config).map_err(with_id)?;

        Ok(PendingChange {
            action: self.action.parse().map_err(with_id)?,
            status: self.status.parse().map_err(with_id)?,
            created_at: from_millis(op, self.created_at)?,
            updated_at: from_millis(op, self.updated_at)?,
            id: self.id,
            change_type,
            resource_id: self.resource_id,
            current_config,
            pending_config,
            description: self.description,
            priority: self.priority,
            last_error: self.last_error,
        })
    }
}

/// Staged-change store over an injected connection
pub struct ChangeLedger<'c> {
    conn: &'c Connection,
    default_priority: i64,
}

impl<'c> ChangeLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            default_priority: DEFAULT_PRIORITY,
        }
    }

    /// Priority given to changes staged without one
    pub fn with_default_priority(mut self, priority: i64) -> Self {
        self.default_priority = priority;
        self
    }

    /// Stage a change, replacing the resource's existing pending entry
    ///
    /// Re-staging keeps the entry's id, creation time and the
    /// `current_config` captured when the resource was first staged.
    ///
    /// # Errors
    ///
    /// Returns the validation error for an unusable change, `Serialization`
    /// if a payload cannot be encoded, or `Persistence`.
    pub fn stage(&self, change: NewChange) -> Result<PendingChange> {
        let op = "stage";
        change
            .validate()
            .map_err(|e| ExError::from(e).with_op(op))?;
        let pending_json = change
            .pending_config
            .to_json()
            .map_err(|e| ExError::from(e).with_op(op))?;
        let current_json = change
            .current_config
            .as_ref()
            .map(ChangeConfig::to_json)
            .transpose()
            .map_err(|e| ExError::from(e).with_op(op))?;
        let now = to_millis(Utc::now());
        let change_type = change.change_type.as_str();

        let id = in_transaction(self.conn, |conn| {
            let existing: Option<(String, i64)> = conn
                .query_row(
                    "SELECT id, priority FROM pending_changes
                     WHERE change_type = ?1 AND resource_id = ?2 AND status = 'pending'",
                    params![change_type, change.resource_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(from_rusqlite)?;

            match existing {
                Some((id, priority)) => {
                    conn.execute(
                        "UPDATE pending_changes
                         SET action = ?2, pending_config = ?3, description = ?4,
                             priority = ?5, updated_at = ?6,
                             current_config = COALESCE(current_config, ?7)
                         WHERE id = ?1 AND status = 'pending'",
                        params![
                            id,
                            change.action.as_str(),
                            pending_json,
                            change.description,
                            change.priority.unwrap_or(priority),
                            now,
                            current_json,
                        ],
                    )
                    .map_err(from_rusqlite)?;
                    tracing::debug!(change_id = %id, resource_id = %change.resource_id, "restaged pending change");
                    Ok(id)
                }
                None => {
                    let id = uuid::Uuid::now_v7().to_string();
                    conn.execute(
                        "INSERT INTO pending_changes (
                            id, change_type, action, resource_id, current_config,
                            pending_config, description, priority, status,
                            created_at, updated_at
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?9)",
                        params![
                            id,
                            change_type,
                            change.action.as_str(),
                            change.resource_id,
                            current_json,
                            pending_json,
                            change.description,
                            change.priority.unwrap_or(self.default_priority),
                            now,
                        ],
                    )
                    .map_err(from_rusqlite)?;
                    Ok(id)
                }
            }
        })?;

        self.get(&id)
    }

    /// Stage with an explicit priority
    ///
    /// # Errors
    ///
    /// As for [`ChangeLedger::stage`].
    pub fn stage_with_priority(&self, change: NewChange, priority: i64) -> Result<PendingChange> {
        self.stage(change.with_priority(priority))
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get(&self, id: &str) -> Result<PendingChange> {
        let sql = format!("SELECT {} FROM pending_changes WHERE id = ?1", COLUMNS);
        self.conn
            .query_row(&sql, [id], StoredChange::from_row)
            .optional()
            .map_err(from_rusqlite)?
            .ok_or_else(|| not_found("get_change", "change", id))?
            .decode()
    }

    /// Pending changes in apply order
    ///
    /// # Errors
    ///
    /// Returns `Persistence` or a decoding error.
    pub fn list_pending(&self) -> Result<Vec<PendingChange>> {
        let sql = format!(
            "SELECT {} FROM pending_changes WHERE status = 'pending' {}",
            COLUMNS, APPLY_ORDER
        );
        self.query(&sql, [])
    }

    /// # Errors
    ///
    /// Returns `Persistence` or a decoding error.
    pub fn list_pending_by_type(&self, change_type: ChangeType) -> Result<Vec<PendingChange>> {
        let sql = format!(
            "SELECT {} FROM pending_changes WHERE status = 'pending' AND change_type = ?1 {}",
            COLUMNS, APPLY_ORDER
        );
        self.query(&sql, [change_type.as_str()])
    }

    /// Most recently touched entries in any status, newest first
    ///
    /// # Errors
    ///
    /// Returns `Persistence` or a decoding error.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<PendingChange>> {
        let sql = format!(
            "SELECT {} FROM pending_changes ORDER BY updated_at DESC, seq DESC LIMIT ?1",
            COLUMNS
        );
        self.query(&sql, [limit as i64])
    }

    /// # Errors
    ///
    /// Returns `Persistence`.
    pub fn has_pending(&self) -> Result<(bool, usize)> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM pending_changes WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(from_rusqlite)?;
        Ok((count > 0, count as usize))
    }

    /// # Errors
    ///
    /// Returns `IllegalTransition` if the entry is no longer pending, or
    /// `NotFound`.
    pub fn mark_applied(&self, id: &str) -> Result<()> {
        self.transition(id, ChangeStatus::Applied)
    }

    /// # Errors
    ///
    /// As for [`ChangeLedger::mark_applied`].
    pub fn mark_failed(&self, id: &str) -> Result<()> {
        self.transition(id, ChangeStatus::Failed)
    }

    /// # Errors
    ///
    /// As for [`ChangeLedger::mark_applied`].
    pub fn discard(&self, id: &str) -> Result<()> {
        self.transition(id, ChangeStatus::Discarded)
    }

    /// Discard every pending entry, returning how many were discarded
    ///
    /// # Errors
    ///
    /// Returns `Persistence`.
    pub fn discard_all(&self) -> Result<usize> {
        let now = to_millis(Utc::now());
        let count = self
            .conn
            .execute(
                "UPDATE pending_changes SET status = 'discarded', updated_at = ?1
                 WHERE status = 'pending'",
                [now],
            )
            .map_err(from_rusqlite)?;
        Ok(count)
    }

    /// Attach a failure reason to a pending entry without changing its status
    ///
    /// # Errors
    ///
    /// As for [`ChangeLedger::mark_applied`].
    pub fn record_failure(&self, id: &str, message: &str) -> Result<()> {
        let now = to_millis(Utc::now());
        let updated = self
            .conn
            .execute(
                "UPDATE pending_changes SET last_error = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id, message, now],
            )
            .map_err(from_rusqlite)?;
        if updated == 0 {
            return Err(self.explain_missed_transition("record_failure", id, "pending"));
        }
        Ok(())
    }

    /// Mark several entries applied, all or none
    ///
    /// Joins the caller's transaction when one is open.
    ///
    /// # Errors
    ///
    /// Fails, leaving every entry untouched, if any entry cannot transition.
    pub fn mark_applied_batch(&self, ids: &[String]) -> Result<()> {
        in_transaction(self.conn, |conn| {
            let ledger = ChangeLedger::new(conn);
            for id in ids {
                ledger.mark_applied(id)?;
            }
            Ok(())
        })
    }

    fn transition(&self, id: &str, to: ChangeStatus) -> Result<()> {
        let now = to_millis(Utc::now());
        let updated = self
            .conn
            .execute(
                "UPDATE pending_changes SET status = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id, to.as_str(), now],
            )
            .map_err(from_rusqlite)?;
        if updated == 0 {
            return Err(self.explain_missed_transition("transition_change", id, to.as_str()));
        }
        tracing::debug!(change_id = id, status = to.as_str(), "change transitioned");
        Ok(())
    }

    fn explain_missed_transition(&self, op: &str, id: &str, to: &str) -> ExError {
        let current: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM pending_changes WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or(None);
        match current {
            Some(from) => illegal_transition(op, id, &from, to),
            None => not_found(op, "change", id),
        }
    }

    fn query<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<PendingChange>> {
        let mut stmt = self.conn.prepare(sql).map_err(from_rusqlite)?;
        let rows = stmt
            .query_map(params, StoredChange::from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        rows.into_iter().map(StoredChange::decode).collect()
    }
}
