//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use netstage_core::config::HostFiles;
use netstage_core::model::{
    BridgeConfig, ChangeAction, ChangeConfig, FirewallRule, NewChange, PendingChange,
};
use netstage_store::db::open_store_in_memory;
use netstage_store::ChangeLedger;
use rusqlite::Connection;
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub files: HostFiles,
    pub conn: Connection,
}

pub fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let files = HostFiles::in_dir(dir.path());
    std::fs::write(
        &files.interfaces,
        "auto lo\niface lo inet loopback\n\nauto eth0\niface eth0 inet static\n        address 10.0.0.5/24\n        gateway 10.0.0.1\n",
    )
    .unwrap();
    std::fs::write(&files.resolv_conf, "nameserver 10.0.0.1\nsearch lan\n").unwrap();
    let conn = open_store_in_memory().unwrap();
    Fixture { dir, files, conn }
}

pub fn stage(conn: &Connection, change: NewChange) -> PendingChange {
    ChangeLedger::new(conn).stage(change).unwrap()
}

pub fn br0_on_eth0() -> NewChange {
    NewChange::new(
        ChangeAction::Create,
        "br0",
        ChangeConfig::Bridge(BridgeConfig {
            ports: vec!["eth0".into()],
            ip_address: Some("192.168.50.1/24".into()),
            ..BridgeConfig::default()
        }),
    )
}

pub fn accept_tcp(resource_id: &str, source: &str) -> NewChange {
    NewChange::new(
        ChangeAction::Create,
        resource_id,
        ChangeConfig::Firewall(FirewallRule {
            action: "ACCEPT".into(),
            protocol: Some("tcp".into()),
            source: Some(source.into()),
            destination: None,
        }),
    )
}

pub fn status_of(conn: &Connection, id: &str) -> String {
    ChangeLedger::new(conn).get(id).unwrap().status.to_string()
}
