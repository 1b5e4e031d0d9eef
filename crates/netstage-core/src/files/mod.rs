//! Host configuration files
//!
//! Files are replaced by writing a sibling temp file and renaming it over the
//! original. Before the first write of a transaction the original is copied
//! to a backup named after the transaction's start time, so rollback can put
//! back exactly what was there when the snapshot was taken. Backups are
//! removed once the transaction commits or rolls back.

pub mod interfaces;
pub mod resolv;

use crate::errors::{NetStageError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub use interfaces::{InterfacesFile, Stanza, StanzaKind};
pub use resolv::ResolvConf;

/// Backup location for `path` within the transaction started at `started_at`
pub fn backup_path(path: &Path, started_at: DateTime<Utc>) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(
        ".netstage-backup-{}",
        started_at.format("%Y%m%dT%H%M%S%3fZ")
    ));
    path.with_file_name(name)
}

/// Read a file, treating a missing file as `None`
///
/// # Errors
///
/// Returns `Io` for any failure other than the file not existing.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(NetStageError::io(path, e)),
    }
}

/// Replace `path` with `content` via temp file and rename
///
/// # Errors
///
/// Returns `Io` if the temp file cannot be written or renamed.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".netstage-tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, content).map_err(|e| NetStageError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        NetStageError::io(path, e)
    })
}

/// Write `content`, backing up the original once per transaction
///
/// Returns the backup path when one was created by this call.
///
/// # Errors
///
/// Returns `Io` if the backup or the write fails. Nothing is written when
/// the backup cannot be taken.
pub fn write_with_backup(
    path: &Path,
    content: &str,
    started_at: DateTime<Utc>,
) -> Result<Option<PathBuf>> {
    let backup = backup_path(path, started_at);
    let created = if path.exists() && !backup.exists() {
        std::fs::copy(path, &backup).map_err(|e| NetStageError::io(&backup, e))?;
        tracing::info!(file = %path.display(), backup = %backup.display(), "backed up host file");
        Some(backup)
    } else {
        None
    };
    write_atomic(path, content)?;
    Ok(created)
}

/// Put back the backup taken during the transaction started at `started_at`
///
/// Returns `false` when the transaction never backed the file up.
///
/// # Errors
///
/// Returns `Io` if the backup exists but cannot be copied back.
pub fn restore_backup(path: &Path, started_at: DateTime<Utc>) -> Result<bool> {
    let backup = backup_path(path, started_at);
    let Some(original) = read_optional(&backup)? else {
        return Ok(false);
    };
    write_atomic(path, &original)?;
    tracing::info!(file = %path.display(), backup = %backup.display(), "restored host file");
    Ok(true)
}

/// Delete the backup taken during the transaction started at `started_at`
///
/// Returns `false` when there was no backup.
///
/// # Errors
///
/// Returns `Io` if the backup exists but cannot be removed.
pub fn remove_backup(path: &Path, started_at: DateTime<Utc>) -> Result<bool> {
    let backup = backup_path(path, started_at);
    match std::fs::remove_file(&backup) {
        Ok(()) => {
            tracing::debug!(backup = %backup.display(), "removed host file backup");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(NetStageError::io(&backup, e)),
    }
}

/// Make `path` hold `content`, or not exist when `content` is `None`
///
/// # Errors
///
/// Returns `Io` if writing or removing fails.
pub fn reconcile(path: &Path, content: Option<&str>) -> Result<()> {
    let current = read_optional(path)?;
    match content {
        Some(wanted) if current.as_deref() != Some(wanted) => write_atomic(path, wanted),
        Some(_) => Ok(()),
        None if current.is_some() => {
            std::fs::remove_file(path).map_err(|e| NetStageError::io(path, e))
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_backup_path_is_timestamped() {
        let path = Path::new("/etc/network/interfaces");
        assert_eq!(
            backup_path(path, started()),
            PathBuf::from("/etc/network/interfaces.netstage-backup-20240301T123005000Z")
        );
    }

    #[test]
    fn test_backup_taken_once_per_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interfaces");
        std::fs::write(&path, "original\n").unwrap();

        let first = write_with_backup(&path, "first\n", started()).unwrap();
        let second = write_with_backup(&path, "second\n", started()).unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second\n");
        assert_eq!(
            std::fs::read_to_string(backup_path(&path, started())).unwrap(),
            "original\n"
        );

        assert!(restore_backup(&path, started()).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original\n");
    }

    #[test]
    fn test_remove_backup_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interfaces");
        std::fs::write(&path, "original\n").unwrap();
        write_with_backup(&path, "changed\n", started()).unwrap();

        assert!(remove_backup(&path, started()).unwrap());
        assert!(!backup_path(&path, started()).exists());
        assert!(!remove_backup(&path, started()).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "changed\n");
    }

    #[test]
    fn test_restore_without_backup_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolv.conf");
        assert!(!restore_backup(&path, started()).unwrap());
    }

    #[test]
    fn test_reconcile_removes_file_that_did_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolv.conf");
        std::fs::write(&path, "nameserver 1.1.1.1\n").unwrap();

        reconcile(&path, None).unwrap();
        assert!(!path.exists());

        reconcile(&path, Some("nameserver 9.9.9.9\n")).unwrap();
        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("nameserver 9.9.9.9\n"));
    }
}
