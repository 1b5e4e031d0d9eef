//! Network snapshot repository
//!
//! Snapshots are immutable once inserted apart from the single status move
//! out of `active`.

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, illegal_transition, not_found, serialization, Result};
use crate::repo::{from_millis, to_millis};
use chrono::Utc;
use netstage_core::errors::ExError;
use netstage_core::model::{NetworkSnapshot, NetworkState, SnapshotStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, created_at, interface_states, route_table, firewall_rules, \
                       firewall_rule_specs, interfaces_file, resolv_conf, status, \
                       applied_at, rolled_back_at";

struct StoredSnapshot {
    id: String,
    created_at: i64,
    interface_states: String,
    route_table: String,
    firewall_rules: String,
    firewall_rule_specs: String,
    interfaces_file: Option<String>,
    resolv_conf: Option<String>,
    status: String,
    applied_at: Option<i64>,
    rolled_back_at: Option<i64>,
}

impl StoredSnapshot {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            interface_states: row.get(2)?,
            route_table: row.get(3)?,
            firewall_rules: row.get(4)?,
            firewall_rule_specs: row.get(5)?,
            interfaces_file: row.get(6)?,
            resolv_conf: row.get(7)?,
            status: row.get(8)?,
            applied_at: row.get(9)?,
            rolled_back_at: row.get(10)?,
        })
    }

    fn decode(self) -> Result<NetworkSnapshot> {
        let op = "decode_snapshot";
        let interface_states = serde_json::from_str(&self.interface_states)
            .map_err(|e| serialization(op, e).with_snapshot_id(self.id.clone()))?;
        let status: SnapshotStatus = self
            .status
            .parse()
            .map_err(|e| ExError::from(e).with_op(op).with_snapshot_id(self.id.clone()))?;

        Ok(NetworkSnapshot {
            created_at: from_millis(op, self.created_at)?,
            applied_at: self.applied_at.map(|ms| from_millis(op, ms)).transpose()?,
            rolled_back_at: self
                .rolled_back_at
                .map(|ms| from_millis(op, ms))
                .transpose()?,
            id: self.id,
            state: NetworkState {
                interface_states,
                route_table: self.route_table,
                firewall_rules: self.firewall_rules,
                firewall_rule_specs: self.firewall_rule_specs,
                interfaces_file: self.interfaces_file,
                resolv_conf: self.resolv_conf,
            },
            status,
        })
    }
}

pub struct SnapshotRepo<'c> {
    conn: &'c Connection,
}

impl<'c> SnapshotRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Persist a freshly captured snapshot
    ///
    /// # Errors
    ///
    /// Returns `Serialization` or `Persistence`.
    pub fn insert(&self, snapshot: &NetworkSnapshot) -> Result<()> {
        let interface_states = serde_json::to_string(&snapshot.state.interface_states)
            .map_err(|e| serialization("insert_snapshot", e))?;
        self.conn
            .execute(
                "INSERT INTO network_snapshots (
                    id, created_at, interface_states, route_table, firewall_rules,
                    firewall_rule_specs, interfaces_file, resolv_conf, status,
                    applied_at, rolled_back_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    snapshot.id,
                    to_millis(snapshot.created_at),
                    interface_states,
                    snapshot.state.route_table,
                    snapshot.state.firewall_rules,
                    snapshot.state.firewall_rule_specs,
                    snapshot.state.interfaces_file,
                    snapshot.state.resolv_conf,
                    snapshot.status.as_str(),
                    snapshot.applied_at.map(to_millis),
                    snapshot.rolled_back_at.map(to_millis),
                ],
            )
            .map_err(from_rusqlite)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get(&self, id: &str) -> Result<NetworkSnapshot> {
        let sql = format!("SELECT {} FROM network_snapshots WHERE id = ?1", COLUMNS);
        self.conn
            .query_row(&sql, [id], StoredSnapshot::from_row)
            .optional()
            .map_err(from_rusqlite)?
            .ok_or_else(|| not_found("get_snapshot", "snapshot", id))?
            .decode()
    }

    /// Snapshots in one status, oldest first
    ///
    /// # Errors
    ///
    /// Returns `Persistence` or a decoding error.
    pub fn list_by_status(&self, status: SnapshotStatus) -> Result<Vec<NetworkSnapshot>> {
        let sql = format!(
            "SELECT {} FROM network_snapshots WHERE status = ?1 ORDER BY created_at ASC, id ASC",
            COLUMNS
        );
        self.query(&sql, [status.as_str()])
    }

    /// Newest snapshots first
    ///
    /// # Errors
    ///
    /// Returns `Persistence` or a decoding error.
    pub fn list(&self, limit: usize) -> Result<Vec<NetworkSnapshot>> {
        let sql = format!(
            "SELECT {} FROM network_snapshots ORDER BY created_at DESC, id DESC LIMIT ?1",
            COLUMNS
        );
        self.query(&sql, [limit as i64])
    }

    /// # Errors
    ///
    /// Returns `IllegalTransition` unless the snapshot is active.
    pub fn mark_applied(&self, id: &str) -> Result<()> {
        self.close(id, SnapshotStatus::Applied, "applied_at")
    }

    /// # Errors
    ///
    /// Returns `IllegalTransition` unless the snapshot is active.
    pub fn mark_rolled_back(&self, id: &str) -> Result<()> {
        self.close(id, SnapshotStatus::RolledBack, "rolled_back_at")
    }

    fn close(&self, id: &str, to: SnapshotStatus, stamp_column: &str) -> Result<()> {
        let sql = format!(
            "UPDATE network_snapshots SET status = ?2, {} = ?3 WHERE id = ?1 AND status = 'active'",
            stamp_column
        );
        let updated = self
            .conn
            .execute(&sql, params![id, to.as_str(), to_millis(Utc::now())])
            .map_err(from_rusqlite)?;
        if updated == 0 {
            let current = self.get(id)?;
            return Err(illegal_transition(
                "close_snapshot",
                id,
                current.status.as_str(),
                to.as_str(),
            )
            .with_snapshot_id(id));
        }
        tracing::debug!(snapshot_id = id, status = to.as_str(), "snapshot closed");
        Ok(())
    }

    fn query<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<NetworkSnapshot>> {
        let mut stmt = self.conn.prepare(sql).map_err(from_rusqlite)?;
        let rows = stmt
            .query_map(params, StoredSnapshot::from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        rows.into_iter().map(StoredSnapshot::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_store_in_memory;
    use netstage_core::model::InterfaceState;

    fn state() -> NetworkState {
        let mut state = NetworkState {
            route_table: "default via 10.0.0.1 dev eth0\n".into(),
            firewall_rule_specs: "-P INPUT ACCEPT\n".into(),
            interfaces_file: Some("auto lo\niface lo inet loopback\n".into()),
            ..NetworkState::default()
        };
        state.interface_states.insert(
            "eth0".into(),
            InterfaceState {
                up: true,
                addresses: vec!["10.0.0.5/24".into()],
                mtu: 1500,
                ..InterfaceState::default()
            },
        );
        state
    }

    #[test]
    fn test_insert_and_get_preserves_state() {
        let conn = open_store_in_memory().unwrap();
        let repo = SnapshotRepo::new(&conn);
        let snapshot = NetworkSnapshot::new(state());

        repo.insert(&snapshot).unwrap();
        let loaded = repo.get(&snapshot.id).unwrap();

        assert_eq!(loaded.state, snapshot.state);
        assert_eq!(loaded.status, SnapshotStatus::Active);
        assert!(loaded.applied_at.is_none());
    }

    #[test]
    fn test_status_moves_once() {
        let conn = open_store_in_memory().unwrap();
        let repo = SnapshotRepo::new(&conn);
        let snapshot = NetworkSnapshot::new(state());
        repo.insert(&snapshot).unwrap();

        repo.mark_rolled_back(&snapshot.id).unwrap();
        let err = repo.mark_applied(&snapshot.id).unwrap_err();

        assert_eq!(err.code(), "ERR_ILLEGAL_TRANSITION");
        let loaded = repo.get(&snapshot.id).unwrap();
        assert_eq!(loaded.status, SnapshotStatus::RolledBack);
        assert!(loaded.rolled_back_at.is_some());
    }

    #[test]
    fn test_list_by_status() {
        let conn = open_store_in_memory().unwrap();
        let repo = SnapshotRepo::new(&conn);
        let first = NetworkSnapshot::new(state());
        let second = NetworkSnapshot::new(state());
        repo.insert(&first).unwrap();
        repo.insert(&second).unwrap();
        repo.mark_applied(&first.id).unwrap();

        let active = repo.list_by_status(SnapshotStatus::Active).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert_eq!(repo.list(10).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_snapshot_is_not_found() {
        let conn = open_store_in_memory().unwrap();
        let err = SnapshotRepo::new(&conn).get("nope").unwrap_err();
        assert_eq!(err.code(), "ERR_NOT_FOUND");
    }
}
