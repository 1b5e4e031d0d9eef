//! Structured log events emitted by an apply transaction

mod common;

use common::{accept_tcp, br0_on_eth0, setup, stage};
use netstage_core::host::SimulatedHost;
use netstage_core::logging_facility::test_capture::init_test_capture;
use netstage_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};
use netstage_engine::{ApplyOrchestrator, EngineContext};

#[test]
fn test_committed_apply_logs_every_phase() {
    let capture = init_test_capture();
    let fx = setup();
    let host = SimulatedHost::new().with_link("eth0", &[]);
    stage(&fx.conn, br0_on_eth0());
    let engine = EngineContext::new(&host, fx.files.clone());

    let mut orchestrator = ApplyOrchestrator::new(&fx.conn, &engine);
    orchestrator.run().unwrap();

    let trace_id = orchestrator.trace_id().as_str();
    let events = capture.events_for_trace("apply_pending", trace_id);
    assert_eq!(events.first().unwrap().event.as_deref(), Some(EVENT_START));
    assert_eq!(events.last().unwrap().event.as_deref(), Some(EVENT_END));
    assert_eq!(
        capture.phases("apply_pending", trace_id),
        vec!["checking", "snapshotting", "applying", "reloading", "committed"]
    );
    assert!(events.last().unwrap().fields.contains_key("duration_ms"));
}

#[test]
fn test_failed_apply_logs_rollback_and_error_code() {
    let capture = init_test_capture();
    let fx = setup();
    let host = SimulatedHost::new().with_link("eth0", &[]);
    stage(&fx.conn, accept_tcp("allow", "10.1.0.0/16"));
    host.fail_on("iptables -A");
    let engine = EngineContext::new(&host, fx.files.clone());

    let mut orchestrator = ApplyOrchestrator::new(&fx.conn, &engine);
    orchestrator.run().unwrap_err();

    let trace_id = orchestrator.trace_id().as_str();
    let events = capture.events_for_trace("apply_pending", trace_id);
    assert_eq!(
        capture.phases("apply_pending", trace_id),
        vec!["checking", "snapshotting", "applying", "rolling_back", "rolled_back"]
    );
    let end = events.last().unwrap();
    assert_eq!(end.event.as_deref(), Some(EVENT_END_ERROR));
    assert_eq!(end.field("err_code"), Some("ERR_APPLY_FAILED"));
    capture.assert_event_exists("rollback", EVENT_END);
}
