//! Canonical logging macros
//!
//! These macros provide a structured, consistent way to log operations.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use netstage_core::log_op_start;
/// log_op_start!("stage_change");
/// log_op_start!("stage_change", resource_id = "br0");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use netstage_core::log_op_end;
/// log_op_end!("stage_change", duration_ms = 42);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// # Example
///
/// ```
/// # use netstage_core::{log_op_error, errors::NetStageError};
/// let err = NetStageError::LinkNotFound { name: "eth9".to_string() };
/// log_op_error!("apply_change", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        use $crate::errors::ExError;
        let ex_err: ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            err_message = ex_err.message(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        use $crate::errors::ExError;
        let ex_err: ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            err_message = ex_err.message(),
            $($field)*
        );
    }};
}

/// Log a phase transition inside a long-running operation
///
/// # Example
///
/// ```
/// # use netstage_core::log_phase;
/// log_phase!("apply_pending", "snapshotting");
/// log_phase!("apply_pending", "applying", pending_count = 3);
/// ```
#[macro_export]
macro_rules! log_phase {
    ($op:expr, $phase:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_PHASE,
            phase = $phase,
        );
    };
    ($op:expr, $phase:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_PHASE,
            phase = $phase,
            $($field)*
        );
    };
}

/// Log a best-effort step that failed without failing its operation
///
/// ```
/// # use netstage_core::log_step_warning;
/// log_step_warning!("rollback", "restoring_routes", "route table was not captured");
/// log_step_warning!("snapshot_capture", "routes", "exit status 1", command = "ip route show");
/// ```
#[macro_export]
macro_rules! log_step_warning {
    ($op:expr, $step:expr, $warning:expr) => {
        tracing::warn!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_STEP_WARNING,
            step = $step,
            warning = %$warning,
        );
    };
    ($op:expr, $step:expr, $warning:expr, $($field:tt)*) => {
        tracing::warn!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_STEP_WARNING,
            step = $step,
            warning = %$warning,
            $($field)*
        );
    };
}
