//! Changes reach the host in ledger order, after the snapshot is persisted

mod common;

use common::{accept_tcp, setup, stage};
use netstage_core::errors::Result as CoreResult;
use netstage_core::host::{CommandOutput, CommandRunner, HostCommand, SimulatedHost};
use netstage_engine::commands::apply::apply_pending;
use netstage_engine::EngineContext;
use proptest::prelude::*;
use rusqlite::Connection;
use std::cell::RefCell;

fn applied_sources(host: &SimulatedHost) -> Vec<String> {
    host.input_rules()
        .iter()
        .filter_map(|rule| {
            let words: Vec<&str> = rule.split_whitespace().collect();
            let pos = words.iter().position(|w| *w == "-s")?;
            words.get(pos + 1).map(|s| s.to_string())
        })
        .collect()
}

#[test]
fn test_priority_then_staging_order() {
    // Given: priorities 30, 10, 20 and a second change at 10 staged last
    let fx = setup();
    let host = SimulatedHost::new().with_link("eth0", &["10.0.0.5/24"]);
    stage(&fx.conn, accept_tcp("p30", "10.30.0.0/16").with_priority(30));
    stage(&fx.conn, accept_tcp("p10", "10.10.0.0/16").with_priority(10));
    stage(&fx.conn, accept_tcp("p20", "10.20.0.0/16").with_priority(20));
    stage(&fx.conn, accept_tcp("p10-late", "10.11.0.0/16").with_priority(10));
    let engine = EngineContext::new(&host, fx.files.clone());

    // When: applying
    apply_pending(&fx.conn, &engine).unwrap();

    // Then: rules were appended by priority, ties in staging order
    assert_eq!(
        applied_sources(&host),
        vec!["10.10.0.0/16", "10.11.0.0/16", "10.20.0.0/16", "10.30.0.0/16"]
    );
}

/// Records how many snapshots were persisted when each mutation ran
struct SnapshotWitness<'a> {
    inner: &'a SimulatedHost,
    conn: &'a Connection,
    seen: RefCell<Vec<(String, i64)>>,
}

impl CommandRunner for SnapshotWitness<'_> {
    fn run(&self, command: &HostCommand) -> CoreResult<CommandOutput> {
        if command.is_mutating() {
            let snapshots: i64 = self
                .conn
                .query_row("SELECT COUNT(*) FROM network_snapshots", [], |r| r.get(0))
                .unwrap();
            self.seen.borrow_mut().push((command.to_string(), snapshots));
        }
        self.inner.run(command)
    }
}

#[test]
fn test_snapshot_persisted_before_first_mutation() {
    // Given: a host whose every mutation is checked against the store
    let fx = setup();
    let host = SimulatedHost::new().with_link("eth0", &[]);
    stage(&fx.conn, common::br0_on_eth0().with_priority(50));
    stage(&fx.conn, accept_tcp("allow", "10.1.0.0/16"));
    let witness = SnapshotWitness {
        inner: &host,
        conn: &fx.conn,
        seen: RefCell::new(Vec::new()),
    };
    let engine = EngineContext::new(&witness, fx.files.clone());

    // When: applying
    apply_pending(&fx.conn, &engine).unwrap();

    // Then: every mutation ran with the snapshot already stored
    let seen = witness.seen.borrow();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|(_, count)| *count == 1), "{:?}", seen);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Application order is the stable sort of staging order by priority.
    #[test]
    fn prop_apply_order_is_priority_then_insertion(priorities in prop::collection::vec(0i64..5, 1..7)) {
        let fx = setup();
        let host = SimulatedHost::new();
        for (i, priority) in priorities.iter().enumerate() {
            stage(
                &fx.conn,
                accept_tcp(&format!("rule-{}", i), &format!("10.{}.0.0/16", i)).with_priority(*priority),
            );
        }
        let engine = EngineContext::new(&host, fx.files.clone());

        apply_pending(&fx.conn, &engine).unwrap();

        let mut expected: Vec<usize> = (0..priorities.len()).collect();
        expected.sort_by_key(|i| priorities[*i]);
        let expected: Vec<String> = expected.iter().map(|i| format!("10.{}.0.0/16", i)).collect();
        prop_assert_eq!(applied_sources(&host), expected);
    }
}
