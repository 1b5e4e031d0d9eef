//! Error handling for netstage-store
//!
//! Wraps netstage-core ExError with store-specific helpers

use netstage_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error for an already-applied migration
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_entity_id(migration_id)
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create a not-found error for a ledger entry, snapshot or definition
pub fn not_found(op: &str, what: &str, id: &str) -> ExError {
    ExError::new(ExErrorKind::NotFound)
        .with_op(op)
        .with_entity_id(id)
        .with_message(format!("{} '{}' not found", what, id))
}

/// Create an error for a status transition the row no longer allows
pub fn illegal_transition(op: &str, id: &str, from: &str, to: &str) -> ExError {
    ExError::new(ExErrorKind::IllegalTransition)
        .with_op(op)
        .with_entity_id(id)
        .with_message(format!("cannot move '{}' from {} to {}", id, from, to))
}

/// Create a serialization error for a stored JSON column
pub fn serialization(op: &str, err: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op(op)
        .with_message(err.to_string())
}
