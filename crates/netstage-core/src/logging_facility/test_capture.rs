//! In-memory event capture for log assertions in tests
//!
//! Events are captured process-wide, so tests running in parallel see each
//! other's output. Filter by a unique `op` or by the `trace_id` of the
//! transaction under test.

use crate::core_types::schema::{EVENT_PHASE, FIELD_PHASE, FIELD_TRACE_ID};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// One captured event; every field is kept in its display form
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub component: Option<String>,
    pub op: Option<String>,
    pub event: Option<String>,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.field(FIELD_TRACE_ID)
    }

    /// Phase name when this is a phase transition event
    pub fn phase(&self) -> Option<&str> {
        (self.event.as_deref() == Some(EVENT_PHASE))
            .then(|| self.field(FIELD_PHASE))
            .flatten()
    }
}

#[derive(Default)]
struct FieldVisitor(HashMap<String, String>);

impl FieldVisitor {
    fn put(&mut self, field: &Field, value: String) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }
}

type EventLog = Arc<Mutex<Vec<CapturedEvent>>>;

/// Layer that appends every event to a shared log
pub struct TestCaptureLayer {
    events: EventLog,
}

impl TestCaptureLayer {
    pub fn new() -> (Self, TestCapture) {
        let events = EventLog::default();
        let capture = TestCapture {
            events: Arc::clone(&events),
        };
        (Self { events }, capture)
    }
}

impl<S> Layer<S> for TestCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let fields = visitor.0;

        let captured = CapturedEvent {
            level: *event.metadata().level(),
            component: fields.get("component").cloned(),
            op: fields.get("op").cloned(),
            event: fields.get("event").cloned(),
            fields,
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(captured);
        }
    }
}

/// Read handle over the captured log
#[derive(Clone)]
pub struct TestCapture {
    events: EventLog,
}

impl TestCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events emitted for one operation, in emission order
    pub fn events_for_op(&self, op: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.op.as_deref() == Some(op))
            .collect()
    }

    /// Events of one operation that belong to a single transaction
    pub fn events_for_trace(&self, op: &str, trace_id: &str) -> Vec<CapturedEvent> {
        self.events_for_op(op)
            .into_iter()
            .filter(|e| e.trace_id() == Some(trace_id))
            .collect()
    }

    /// Phase names a transaction passed through, in order
    pub fn phases(&self, op: &str, trace_id: &str) -> Vec<String> {
        self.events_for_trace(op, trace_id)
            .iter()
            .filter_map(|e| e.phase().map(str::to_string))
            .collect()
    }

    /// # Panics
    ///
    /// Panics when no event with this `op` and `event` was captured.
    pub fn assert_event_exists(&self, op: &str, event: &str) {
        let events = self.events();
        let found = events
            .iter()
            .any(|e| e.op.as_deref() == Some(op) && e.event.as_deref() == Some(event));
        assert!(
            found,
            "Expected event op={} event={} not found in {} captured events",
            op,
            event,
            events.len()
        );
    }
}

static GLOBAL_CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture layer as the global subscriber, once per process
///
/// # Example
///
/// ```
/// use netstage_core::logging_facility::test_capture::init_test_capture;
/// use netstage_core::log_op_start;
///
/// let capture = init_test_capture();
/// log_op_start!("stage_change");
/// capture.assert_event_exists("stage_change", "start");
/// ```
pub fn init_test_capture() -> TestCapture {
    GLOBAL_CAPTURE
        .get_or_init(|| {
            let (layer, capture) = TestCaptureLayer::new();
            tracing_subscriber::registry().with(layer).try_init().ok();
            capture
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_only_reported_for_phase_events() {
        let mut fields = HashMap::new();
        fields.insert("phase".to_string(), "applying".to_string());
        fields.insert("trace_id".to_string(), "t-1".to_string());
        let mut event = CapturedEvent {
            level: Level::INFO,
            component: None,
            op: Some("apply_pending".to_string()),
            event: Some(EVENT_PHASE.to_string()),
            fields,
        };
        assert_eq!(event.phase(), Some("applying"));
        assert_eq!(event.trace_id(), Some("t-1"));

        event.event = Some("end".to_string());
        assert_eq!(event.phase(), None);
    }
}
