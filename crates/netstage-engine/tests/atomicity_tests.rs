//! A failure anywhere in the transaction leaves the host as it was probed

mod common;

use common::{accept_tcp, setup, stage};
use netstage_core::host::SimulatedHost;
use netstage_core::model::{
    BridgeConfig, ChangeAction, ChangeConfig, DnsConfig, InterfaceConfig, NewChange, RouteConfig,
};
use netstage_engine::commands::apply::apply_pending;
use netstage_engine::{EngineContext, SnapshotCapturer};
use netstage_store::ChangeLedger;
use proptest::prelude::*;

fn lan_host() -> SimulatedHost {
    SimulatedHost::new()
        .with_link("eth0", &["10.0.0.5/24"])
        .with_link("eth1", &[])
        .with_route("default via 10.0.0.1 dev eth0")
        .with_input_rule("-A INPUT -s 10.0.0.0/8 -p tcp -j ACCEPT")
}

/// Changes in apply order, each with the command prefix that makes it fail
fn changes() -> Vec<(NewChange, &'static str)> {
    vec![
        (
            NewChange::new(
                ChangeAction::Update,
                "eth1",
                ChangeConfig::Interface(InterfaceConfig {
                    ip_address: Some("10.9.0.2/24".into()),
                    mtu: Some(9000),
                    ..InterfaceConfig::default()
                }),
            ),
            "ip link set eth1 mtu",
        ),
        (
            NewChange::new(
                ChangeAction::Create,
                "10.20.0.0/16",
                ChangeConfig::Route(RouteConfig {
                    destination: "10.20.0.0/16".into(),
                    gateway: "10.9.0.1".into(),
                    interface: "eth1".into(),
                }),
            ),
            "ip route add 10.20.0.0/16",
        ),
        (accept_tcp("allow-lab", "10.9.0.0/24"), "iptables -A"),
        (
            NewChange::new(
                ChangeAction::Create,
                "br1",
                ChangeConfig::Bridge(BridgeConfig {
                    ip_address: Some("172.16.0.1/24".into()),
                    ..BridgeConfig::default()
                }),
            ),
            "ip link add br1",
        ),
    ]
}

fn resolver_update() -> NewChange {
    NewChange::new(
        ChangeAction::Update,
        "resolver",
        ChangeConfig::Dns(DnsConfig {
            nameservers: vec!["1.1.1.1".into()],
            search_domains: vec!["example.org".into()],
        }),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// `staged` changes go in after a resolver rewrite; `fault` picks the
    /// change that fails, or the reload when it is past the last change.
    #[test]
    fn prop_failure_at_any_position_restores_probe(staged in 1usize..=4, fault in 0usize..=4) {
        let fx = setup();
        let host = lan_host();
        stage(&fx.conn, resolver_update().with_priority(0));

        let mut prefixes = Vec::new();
        for (i, (change, prefix)) in changes().into_iter().take(staged).enumerate() {
            stage(&fx.conn, change.with_priority(10 * (i as i64 + 1)));
            prefixes.push(prefix);
        }
        if fault < prefixes.len() {
            host.fail_on(prefixes[fault]);
        } else {
            host.fail_on("ifreload");
            host.fail_on("systemctl reload");
        }

        let before = SnapshotCapturer::new(&host, &fx.files).probe().unwrap();
        let engine = EngineContext::new(&host, fx.files.clone());

        prop_assert!(apply_pending(&fx.conn, &engine).is_err());

        let after = SnapshotCapturer::new(&host, &fx.files).probe().unwrap();
        prop_assert_eq!(after, before);
        prop_assert!(!ChangeLedger::new(&fx.conn).has_pending().unwrap().0);
    }
}
