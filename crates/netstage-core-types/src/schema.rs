//! Canonical schema constants for structured logging and events
//!
//! These constants ensure consistency across all logging and error reporting.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_TRACE_ID: &str = "trace_id";

// Entity identifiers
pub const FIELD_CHANGE_ID: &str = "change_id";
pub const FIELD_CHANGE_TYPE: &str = "change_type";
pub const FIELD_RESOURCE_ID: &str = "resource_id";
pub const FIELD_SNAPSHOT_ID: &str = "snapshot_id";

// Transaction state
pub const FIELD_PHASE: &str = "phase";
pub const FIELD_PENDING_COUNT: &str = "pending_count";
pub const FIELD_STEP: &str = "step";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_PHASE: &str = "phase";
/// A best-effort step failed and the operation carried on
pub const EVENT_STEP_WARNING: &str = "step_warning";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_distinct() {
        let events = [EVENT_START, EVENT_END, EVENT_END_ERROR, EVENT_PHASE, EVENT_STEP_WARNING];
        for (i, a) in events.iter().enumerate() {
            for b in &events[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_entity_fields_are_snake_case() {
        for field in [
            FIELD_CHANGE_ID,
            FIELD_CHANGE_TYPE,
            FIELD_RESOURCE_ID,
            FIELD_SNAPSHOT_ID,
        ] {
            assert!(field.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
