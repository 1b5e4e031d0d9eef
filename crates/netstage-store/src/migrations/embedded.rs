//! Embedded SQL migrations
//!
//! Migrations are embedded at compile time using include_str!

/// Migration metadata
pub struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

/// Get all embedded migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            id: "001_change_ledger",
            sql: include_str!("../../migrations/001_change_ledger.sql"),
        },
        Migration {
            id: "002_network_snapshots",
            sql: include_str!("../../migrations/002_network_snapshots.sql"),
        },
        Migration {
            id: "003_resource_definitions",
            sql: include_str!("../../migrations/003_resource_definitions.sql"),
        },
    ]
}
