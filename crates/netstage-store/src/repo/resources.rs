//! Persistent bridge and interface definitions

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, serialization, Result};
use crate::repo::{from_millis, to_millis};
use chrono::Utc;
use netstage_core::model::{
    AddressMethod, BridgeConfig, BridgeStatus, InterfaceConfig, PersistentBridge,
    PersistentInterface,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const BRIDGE_COLUMNS: &str = "name, description, ports, ip_address, ipv6_address, gateway, \
                              ipv6_gateway, vlan_aware, autostart, status, last_error, \
                              created_at, updated_at";

const INTERFACE_COLUMNS: &str = "name, method, ip_address, ipv6_address, gateway, \
                                 ipv6_gateway, mtu, autostart, comment, created_at, updated_at";

struct StoredBridge {
    name: String,
    description: Option<String>,
    ports: String,
    ip_address: Option<String>,
    ipv6_address: Option<String>,
    gateway: Option<String>,
    ipv6_gateway: Option<String>,
    vlan_aware: bool,
    autostart: bool,
    status: String,
    last_error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl StoredBridge {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            description: row.get(1)?,
            ports: row.get(2)?,
            ip_address: row.get(3)?,
            ipv6_address: row.get(4)?,
            gateway: row.get(5)?,
            ipv6_gateway: row.get(6)?,
            vlan_aware: row.get(7)?,
            autostart: row.get(8)?,
            status: row.get(9)?,
            last_error: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn decode(self) -> Result<PersistentBridge> {
        let op = "decode_bridge";
        let ports = serde_json::from_str(&self.ports)
            .map_err(|e| serialization(op, e).with_entity_id(self.name.clone()))?;
        let status = BridgeStatus::parse(&self.status).ok_or_else(|| {
            serialization(op, format!("unknown bridge status '{}'", self.status))
                .with_entity_id(self.name.clone())
        })?;
        Ok(PersistentBridge {
            config: BridgeConfig {
                ports,
                ip_address: self.ip_address,
                ipv6_address: self.ipv6_address,
                gateway: self.gateway,
                ipv6_gateway: self.ipv6_gateway,
                vlan_aware: self.vlan_aware,
                autostart: self.autostart,
                description: self.description,
            },
            status,
            last_error: self.last_error,
            created_at: from_millis(op, self.created_at)?,
            updated_at: from_millis(op, self.updated_at)?,
            name: self.name,
        })
    }
}

struct StoredInterface {
    name: String,
    method: Option<String>,
    ip_address: Option<String>,
    ipv6_address: Option<String>,
    gateway: Option<String>,
    ipv6_gateway: Option<String>,
    mtu: Option<u32>,
    autostart: bool,
    comment: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl StoredInterface {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            method: row.get(1)?,
            ip_address: row.get(2)?,
            ipv6_address: row.get(3)?,
            gateway: row.get(4)?,
            ipv6_gateway: row.get(5)?,
            mtu: row.get(6)?,
            autostart: row.get(7)?,
            comment: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn decode(self) -> Result<PersistentInterface> {
        let op = "decode_interface";
        let method = match self.method.as_deref() {
            None => None,
            Some(raw) => Some(AddressMethod::parse(raw).ok_or_else(|| {
                serialization(op, format!("unknown address method '{}'", raw))
                    .with_entity_id(self.name.clone())
            })?),
        };
        Ok(PersistentInterface {
            config: InterfaceConfig {
                method,
                ip_address: self.ip_address,
                ipv6_address: self.ipv6_address,
                gateway: self.gateway,
                ipv6_gateway: self.ipv6_gateway,
                mtu: self.mtu,
                autostart: self.autostart,
                comment: self.comment,
            },
            created_at: from_millis(op, self.created_at)?,
            updated_at: from_millis(op, self.updated_at)?,
            name: self.name,
        })
    }
}

/// Committed bridge and interface definitions replayed at boot
pub struct ResourceRepo<'c> {
    conn: &'c Connection,
}

impl<'c> ResourceRepo<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a bridge definition, keeping its creation time
    ///
    /// # Errors
    ///
    /// Returns `Serialization` or `Persistence`.
    pub fn upsert_bridge(&self, bridge: &PersistentBridge) -> Result<()> {
        let ports = serde_json::to_string(&bridge.config.ports)
            .map_err(|e| serialization("upsert_bridge", e))?;
        let cfg = &bridge.config;
        self.conn
            .execute(
                "INSERT INTO network_bridges (
                    name, description, ports, ip_address, ipv6_address, gateway,
                    ipv6_gateway, vlan_aware, autostart, status, last_error,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(name) DO UPDATE SET
                    description = excluded.description,
                    ports = excluded.ports,
                    ip_address = excluded.ip_address,
                    ipv6_address = excluded.ipv6_address,
                    gateway = excluded.gateway,
                    ipv6_gateway = excluded.ipv6_gateway,
                    vlan_aware = excluded.vlan_aware,
                    autostart = excluded.autostart,
                    status = excluded.status,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at",
                params![
                    bridge.name,
                    cfg.description,
                    ports,
                    cfg.ip_address,
                    cfg.ipv6_address,
                    cfg.gateway,
                    cfg.ipv6_gateway,
                    cfg.vlan_aware,
                    cfg.autostart,
                    bridge.status.as_str(),
                    bridge.last_error,
                    to_millis(bridge.created_at),
                    to_millis(bridge.updated_at),
                ],
            )
            .map_err(from_rusqlite)?;
        Ok(())
    }

    /// Record the outcome of bringing a bridge up
    ///
    /// # Errors
    ///
    /// Returns `Persistence`.
    pub fn set_bridge_status(
        &self,
        name: &str,
        status: BridgeStatus,
        last_error: Option<&str>,
    ) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE network_bridges SET status = ?2, last_error = ?3, updated_at = ?4
                 WHERE name = ?1",
                params![name, status.as_str(), last_error, to_millis(Utc::now())],
            )
            .map_err(from_rusqlite)?;
        Ok(updated > 0)
    }

    /// # Errors
    ///
    /// Returns `Persistence`.
    pub fn delete_bridge(&self, name: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM network_bridges WHERE name = ?1", [name])
            .map_err(from_rusqlite)?;
        Ok(deleted > 0)
    }

    /// # Errors
    ///
    /// Returns `Persistence` or a decoding error.
    pub fn get_bridge(&self, name: &str) -> Result<Option<PersistentBridge>> {
        let sql = format!("SELECT {} FROM network_bridges WHERE name = ?1", BRIDGE_COLUMNS);
        self.conn
            .query_row(&sql, [name], StoredBridge::from_row)
            .optional()
            .map_err(from_rusqlite)?
            .map(StoredBridge::decode)
            .transpose()
    }

    /// # Errors
    ///
    /// Returns `Persistence` or a decoding error.
    pub fn list_bridges(&self) -> Result<Vec<PersistentBridge>> {
        let sql = format!("SELECT {} FROM network_bridges ORDER BY name", BRIDGE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql).map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([], StoredBridge::from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        rows.into_iter().map(StoredBridge::decode).collect()
    }

    /// Insert or replace an interface definition, keeping its creation time
    ///
    /// # Errors
    ///
    /// Returns `Persistence`.
    pub fn upsert_interface(&self, iface: &PersistentInterface) -> Result<()> {
        let cfg = &iface.config;
        self.conn
            .execute(
                "INSERT INTO network_interfaces (
                    name, method, ip_address, ipv6_address, gateway, ipv6_gateway,
                    mtu, autostart, comment, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(name) DO UPDATE SET
                    method = excluded.method,
                    ip_address = excluded.ip_address,
                    ipv6_address = excluded.ipv6_address,
                    gateway = excluded.gateway,
                    ipv6_gateway = excluded.ipv6_gateway,
                    mtu = excluded.mtu,
                    autostart = excluded.autostart,
                    comment = excluded.comment,
                    updated_at = excluded.updated_at",
                params![
                    iface.name,
                    cfg.method.map(|m| m.as_str()),
                    cfg.ip_address,
                    cfg.ipv6_address,
                    cfg.gateway,
                    cfg.ipv6_gateway,
                    cfg.mtu,
                    cfg.autostart,
                    cfg.comment,
                    to_millis(iface.created_at),
                    to_millis(iface.updated_at),
                ],
            )
            .map_err(from_rusqlite)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `Persistence`.
    pub fn delete_interface(&self, name: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM network_interfaces WHERE name = ?1", [name])
            .map_err(from_rusqlite)?;
        Ok(deleted > 0)
    }

    /// # Errors
    ///
    /// Returns `Persistence` or a decoding error.
    pub fn get_interface(&self, name: &str) -> Result<Option<PersistentInterface>> {
        let sql = format!(
            "SELECT {} FROM network_interfaces WHERE name = ?1",
            INTERFACE_COLUMNS
        );
        self.conn
            .query_row(&sql, [name], StoredInterface::from_row)
            .optional()
            .map_err(from_rusqlite)?
            .map(StoredInterface::decode)
            .transpose()
    }

    /// # Errors
    ///
    /// Returns `Persistence` or a decoding error.
    pub fn list_interfaces(&self) -> Result<Vec<PersistentInterface>> {
        let sql = format!(
            "SELECT {} FROM network_interfaces ORDER BY name",
            INTERFACE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([], StoredInterface::from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        rows.into_iter().map(StoredInterface::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_store_in_memory;

    #[test]
    fn test_bridge_upsert_and_status() {
        let conn = open_store_in_memory().unwrap();
        let repo = ResourceRepo::new(&conn);
        let bridge = PersistentBridge::new(
            "br0",
            BridgeConfig {
                ports: vec!["eth0".into()],
                ip_address: Some("192.168.50.1/24".into()),
                ..BridgeConfig::default()
            },
        );

        repo.upsert_bridge(&bridge).unwrap();
        assert!(repo
            .set_bridge_status("br0", BridgeStatus::Error, Some("eth0 missing"))
            .unwrap());

        let loaded = repo.get_bridge("br0").unwrap().unwrap();
        assert_eq!(loaded.config, bridge.config);
        assert_eq!(loaded.status, BridgeStatus::Error);
        assert_eq!(loaded.last_error.as_deref(), Some("eth0 missing"));

        assert!(repo.delete_bridge("br0").unwrap());
        assert!(repo.get_bridge("br0").unwrap().is_none());
        assert!(!repo.delete_bridge("br0").unwrap());
    }

    #[test]
    fn test_interface_round_trip_keeps_method() {
        let conn = open_store_in_memory().unwrap();
        let repo = ResourceRepo::new(&conn);
        let iface = PersistentInterface::new(
            "eth1",
            InterfaceConfig {
                method: Some(AddressMethod::Manual),
                mtu: Some(9000),
                comment: Some("storage".into()),
                ..InterfaceConfig::default()
            },
        );

        repo.upsert_interface(&iface).unwrap();

        let all = repo.list_interfaces().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].config, iface.config);
        assert_eq!(all[0].method(), AddressMethod::Manual);
    }
}
