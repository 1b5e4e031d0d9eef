//! Process configuration
//!
//! Loaded from a TOML file; every key is optional and falls back to the
//! Debian/Proxmox defaults below.
//!
//! ```toml
//! database_path = "/var/lib/netstage/netstage.db"
//! interfaces_file = "/etc/network/interfaces"
//! resolv_conf = "/etc/resolv.conf"
//! default_priority = 100
//! apply_deadline_secs = 120
//! log_profile = "production"
//! ```

use crate::errors::{NetStageError, Result};
use crate::logging_facility::Profile;
use crate::model::DEFAULT_PRIORITY;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/netstage/netstage.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetStageConfig {
    pub database_path: PathBuf,
    pub interfaces_file: PathBuf,
    pub resolv_conf: PathBuf,
    pub default_priority: i64,
    /// Upper bound on one apply, checked between steps
    pub apply_deadline_secs: Option<u64>,
    pub log_profile: Profile,
}

impl Default for NetStageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("/var/lib/netstage/netstage.db"),
            interfaces_file: PathBuf::from("/etc/network/interfaces"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            default_priority: DEFAULT_PRIORITY,
            apply_deadline_secs: None,
            log_profile: Profile::Development,
        }
    }
}

impl NetStageConfig {
    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoad` for malformed TOML or unknown keys.
    pub fn from_toml(text: &str, origin: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| NetStageError::ConfigLoad {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoad` when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| NetStageError::ConfigLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&text, &path.display().to_string())
    }

    /// Load the file when it exists, defaults otherwise
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoad` when an existing file is unreadable or invalid.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_deadline(&self) -> Option<Duration> {
        self.apply_deadline_secs.map(Duration::from_secs)
    }

    /// Paths of the host files mutated by appliers
    pub fn host_files(&self) -> HostFiles {
        HostFiles {
            interfaces: self.interfaces_file.clone(),
            resolv_conf: self.resolv_conf.clone(),
        }
    }
}

/// Location of the configuration files the change manager rewrites
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFiles {
    pub interfaces: PathBuf,
    pub resolv_conf: PathBuf,
}

impl HostFiles {
    /// Files under one directory, as used by tests and dry runs
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            interfaces: dir.join("interfaces"),
            resolv_conf: dir.join("resolv.conf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_debian_defaults() {
        let cfg = NetStageConfig::from_toml("", "inline").unwrap();
        assert_eq!(cfg, NetStageConfig::default());
        assert_eq!(cfg.interfaces_file, PathBuf::from("/etc/network/interfaces"));
        assert_eq!(cfg.default_priority, 100);
        assert!(cfg.apply_deadline().is_none());
    }

    #[test]
    fn test_overrides_are_applied() {
        let cfg = NetStageConfig::from_toml(
            r#"
            database_path = "/tmp/ns.db"
            default_priority = 50
            apply_deadline_secs = 30
            log_profile = "production"
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(cfg.database_path, PathBuf::from("/tmp/ns.db"));
        assert_eq!(cfg.default_priority, 50);
        assert_eq!(cfg.apply_deadline(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.log_profile, Profile::Production);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = NetStageConfig::from_toml("colour = \"blue\"", "inline").unwrap_err();
        assert!(matches!(err, NetStageError::ConfigLoad { .. }));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NetStageConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, NetStageConfig::default());
    }
}
