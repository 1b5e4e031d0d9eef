//! Migration checksums
//!
//! A migration's checksum is the SHA256 of its SQL with line endings
//! normalised, so a CRLF checkout of the same file does not look tampered.

use crate::errors::{checksum_mismatch, Result};
use sha2::{Digest, Sha256};

/// Where a migration stands against the `schema_version` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applied,
}

/// Hex SHA256 of `sql`, ignoring `\r`
pub fn compute_checksum(sql: &str) -> String {
    let mut hasher = Sha256::new();
    for line in sql.split('\n') {
        hasher.update(line.trim_end_matches('\r').as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Compare a recorded checksum with the embedded SQL
///
/// `recorded` is `None` when the migration has no `schema_version` row and
/// `Some(None)` for rows written before checksums were kept.
///
/// # Errors
///
/// Returns a migration error when the recorded checksum differs.
pub fn verify(migration_id: &str, sql: &str, recorded: Option<Option<&str>>) -> Result<MigrationState> {
    match recorded {
        None => Ok(MigrationState::Pending),
        Some(None) => Ok(MigrationState::Applied),
        Some(Some(expected)) => {
            let actual = compute_checksum(sql);
            if expected == actual {
                Ok(MigrationState::Applied)
            } else {
                Err(checksum_mismatch(migration_id, expected, &actual))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_endings_do_not_change_checksum() {
        let unix = "CREATE TABLE t (id INTEGER);\nCREATE INDEX i ON t (id);\n";
        let dos = "CREATE TABLE t (id INTEGER);\r\nCREATE INDEX i ON t (id);\r\n";
        assert_eq!(compute_checksum(unix), compute_checksum(dos));
        assert_eq!(compute_checksum(unix).len(), 64);
        assert_ne!(compute_checksum(unix), compute_checksum("SELECT 1"));
    }

    #[test]
    fn test_verify_states() {
        let sql = "SELECT 1";
        let sum = compute_checksum(sql);

        assert_eq!(verify("001", sql, None).unwrap(), MigrationState::Pending);
        assert_eq!(verify("001", sql, Some(None)).unwrap(), MigrationState::Applied);
        assert_eq!(verify("001", sql, Some(Some(&sum))).unwrap(), MigrationState::Applied);
        assert!(verify("001", sql, Some(Some("deadbeef"))).is_err());
    }
}
