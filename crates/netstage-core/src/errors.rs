use crate::model::{ChangeAction, ChangeType};
use netstage_core_types::{RequestId, TraceId};
use thiserror::Error;

/// Result type alias using NetStageError
pub type Result<T> = std::result::Result<T, NetStageError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure surfaced by the change manager is classified into one of
/// these kinds. Each kind maps to a stable error code used by the CLI exit
/// path, log events and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation
    InvalidInput,
    InvalidConfig,
    Unsupported,
    NotFound,
    IllegalTransition,

    // Transaction lifecycle
    NothingToApply,
    SnapshotFailed,
    ApplyFailed,
    ReloadFailed,
    RollbackFailed,

    // Host
    HostCommand,
    UnsafePortAttach,

    // Integration/IO
    Io,
    Serialization,
    Persistence,
    Timeout,
    Concurrency,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::Unsupported => "ERR_UNSUPPORTED",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::IllegalTransition => "ERR_ILLEGAL_TRANSITION",
            ExErrorKind::NothingToApply => "ERR_NOTHING_TO_APPLY",
            ExErrorKind::SnapshotFailed => "ERR_SNAPSHOT_FAILED",
            ExErrorKind::ApplyFailed => "ERR_APPLY_FAILED",
            ExErrorKind::ReloadFailed => "ERR_RELOAD_FAILED",
            ExErrorKind::RollbackFailed => "ERR_ROLLBACK_FAILED",
            ExErrorKind::HostCommand => "ERR_HOST_COMMAND",
            ExErrorKind::UnsafePortAttach => "ERR_UNSAFE_PORT_ATTACH",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification plus the context needed to correlate a failure
/// with a staged change, a snapshot and the apply attempt that produced it.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    change_id: Option<String>,
    snapshot_id: Option<String>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            change_id: None,
            snapshot_id: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context (interface, bridge or route name)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add pending change ID context
    pub fn with_change_id(mut self, id: impl Into<String>) -> Self {
        self.change_id = Some(id.into());
        self
    }

    /// Add snapshot ID context
    pub fn with_snapshot_id(mut self, id: impl Into<String>) -> Self {
        self.snapshot_id = Some(id.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add trace ID context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity ID context, if any
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Get the change ID context, if any
    pub fn change_id(&self) -> Option<&str> {
        self.change_id.as_deref()
    }

    /// Get the snapshot ID context, if any
    pub fn snapshot_id(&self) -> Option<&str> {
        self.snapshot_id.as_deref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the trace ID context, if any
    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(change_id) = &self.change_id {
            write!(f, " (change_id: {})", change_id)?;
        }
        if let Some(snapshot_id) = &self.snapshot_id {
            write!(f, " (snapshot_id: {})", snapshot_id)?;
        }
        if let Some(source) = &self.source {
            write!(f, "; caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy for change staging, host mutation and file handling
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetStageError {
    // ===== Staging Errors =====
    /// Resource identifier is empty or malformed
    #[error("Invalid resource id '{resource_id}': {reason}")]
    InvalidResourceId { resource_id: String, reason: String },

    /// Change type string is not one of the known types
    #[error("Unknown change type: {value}")]
    UnknownChangeType { value: String },

    /// Change action string is not one of the known actions
    #[error("Unknown change action: {value}")]
    UnknownAction { value: String },

    /// Change status string is not one of the known statuses
    #[error("Unknown change status: {value}")]
    UnknownStatus { value: String },

    /// Snapshot status string is not one of the known statuses
    #[error("Unknown snapshot status: {value}")]
    UnknownSnapshotStatus { value: String },

    /// Config payload does not fit the declared change type
    #[error("Invalid {change_type} config: {reason}")]
    InvalidConfig {
        change_type: ChangeType,
        reason: String,
    },

    /// Address or CIDR could not be parsed
    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    /// Action is not available for this change type
    #[error("{action} is not supported for {change_type} changes: {hint}")]
    UnsupportedAction {
        change_type: ChangeType,
        action: ChangeAction,
        hint: String,
    },

    // ===== Host Errors =====
    /// Host command exited non-zero
    #[error("Command `{command}` failed with status {status}: {stderr}")]
    HostCommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Host command could not be started at all
    #[error("Command `{command}` could not be started: {message}")]
    HostCommandSpawn { command: String, message: String },

    /// Interface or bridge is not present on the host
    #[error("Link not found on host: {name}")]
    LinkNotFound { name: String },

    /// Name exists on the host but is not a bridge
    #[error("Link {name} exists and is not a bridge")]
    NotABridge { name: String },

    /// Attaching the port would strand its addresses
    #[error(
        "Refusing to attach {port} to {bridge}: {port} carries addresses and {bridge} has none, \
         which would drop connectivity"
    )]
    UnsafePortAttach { port: String, bridge: String },

    /// Host output could not be parsed
    #[error("Unexpected output from `{command}`: {reason}")]
    UnparseableOutput { command: String, reason: String },

    // ===== File Errors =====
    /// Interfaces file contains a malformed stanza
    #[error("Interfaces file line {line}: {reason}")]
    InterfacesParse { line: usize, reason: String },

    /// Filesystem operation failed
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Settings file could not be read or parsed
    #[error("Failed to load configuration from {path}: {message}")]
    ConfigLoad { path: String, message: String },

    // ===== Internal Errors =====
    /// JSON encoding or decoding failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// No applier is registered for a change type
    #[error("No applier registered for change type {change_type}")]
    ApplierMissing { change_type: ChangeType },
}

impl NetStageError {
    /// Build an `Io` error from a path and an underlying `std::io::Error`
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        NetStageError::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for NetStageError {
    fn from(err: serde_json::Error) -> Self {
        NetStageError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<NetStageError> for ExError {
    fn from(err: NetStageError) -> Self {
        let message = err.to_string();
        match err {
            NetStageError::InvalidResourceId { resource_id, .. } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_entity_id(resource_id)
                    .with_message(message)
            }
            NetStageError::UnknownChangeType { .. }
            | NetStageError::UnknownAction { .. }
            | NetStageError::UnknownStatus { .. }
            | NetStageError::UnknownSnapshotStatus { .. }
            | NetStageError::InvalidAddress { .. } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(message)
            }
            NetStageError::InvalidConfig { .. } => {
                ExError::new(ExErrorKind::InvalidConfig).with_message(message)
            }
            NetStageError::UnsupportedAction { .. } => {
                ExError::new(ExErrorKind::Unsupported).with_message(message)
            }
            NetStageError::HostCommandFailed { .. }
            | NetStageError::HostCommandSpawn { .. }
            | NetStageError::UnparseableOutput { .. } => {
                ExError::new(ExErrorKind::HostCommand).with_message(message)
            }
            NetStageError::LinkNotFound { name } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(name)
                .with_message(message),
            NetStageError::NotABridge { name } => ExError::new(ExErrorKind::InvalidInput)
                .with_entity_id(name)
                .with_message(message),
            NetStageError::UnsafePortAttach { port, .. } => {
                ExError::new(ExErrorKind::UnsafePortAttach)
                    .with_entity_id(port)
                    .with_message(message)
            }
            NetStageError::InterfacesParse { .. } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(message)
            }
            NetStageError::Io { path, .. } => ExError::new(ExErrorKind::Io)
                .with_entity_id(path)
                .with_message(message),
            NetStageError::ConfigLoad { .. } => {
                ExError::new(ExErrorKind::InvalidConfig).with_message(message)
            }
            NetStageError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
            NetStageError::ApplierMissing { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}
