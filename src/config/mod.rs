//! Engine configuration.
//!
//! Resolution order: explicit builder values, then the TOML config file,
//! then environment variables, then defaults. The config file lives at
//! `~/.config/vaultsync/config.toml` (platform equivalent via the
//! `directories` crate) and every field is optional.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default window for counting recent sync failures, in hours.
const DEFAULT_FAILURE_WINDOW_HOURS: u64 = 24;

/// Default age past which a pending log row counts as stuck, in minutes.
const DEFAULT_STUCK_PENDING_MINUTES: u64 = 10;

/// Runtime configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Root of the git mirror working tree.
    pub repo_path: PathBuf,
    /// Path to the `SQLite` database file.
    pub db_path: PathBuf,
    /// Window for counting recent sync failures, in hours.
    pub recent_failure_window_hours: u64,
    /// Age past which a pending log row counts as stuck, in minutes.
    pub stuck_pending_minutes: u64,
    /// Remote name to push the mirror to, if pushing is used.
    pub remote: Option<String>,
    /// Branch to push, if pushing is used.
    pub branch: Option<String>,
}

impl VaultConfig {
    /// Creates a configuration with explicit paths and default windows.
    #[must_use]
    pub fn new(repo_path: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            db_path: db_path.into(),
            recent_failure_window_hours: DEFAULT_FAILURE_WINDOW_HOURS,
            stuck_pending_minutes: DEFAULT_STUCK_PENDING_MINUTES,
            remote: None,
            branch: None,
        }
    }

    /// Loads configuration from the default file location, environment
    /// variables, and defaults.
    ///
    /// `VAULTSYNC_REPO` and `VAULTSYNC_DB` override the file; when neither
    /// the file nor the environment provides a path, the platform data
    /// directory is used (`mirror/` for the repo, `vaultsync.db` for the
    /// database).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if no data directory can be determined.
    pub fn load_default() -> Result<Self> {
        let file = ConfigFile::load_default()?;

        let data_dir = || -> Result<PathBuf> {
            directories::ProjectDirs::from("", "", "vaultsync")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| Error::OperationFailed {
                    operation: "resolve_data_dir".to_string(),
                    cause: "no home directory available".to_string(),
                })
        };

        let repo_path = match std::env::var_os("VAULTSYNC_REPO") {
            Some(path) => PathBuf::from(path),
            None => match file.repo_path {
                Some(path) => path,
                None => data_dir()?.join("mirror"),
            },
        };
        let db_path = match std::env::var_os("VAULTSYNC_DB") {
            Some(path) => PathBuf::from(path),
            None => match file.db_path {
                Some(path) => path,
                None => data_dir()?.join("vaultsync.db"),
            },
        };

        Ok(Self {
            repo_path,
            db_path,
            recent_failure_window_hours: file
                .recent_failure_window_hours
                .unwrap_or(DEFAULT_FAILURE_WINDOW_HOURS),
            stuck_pending_minutes: file
                .stuck_pending_minutes
                .unwrap_or(DEFAULT_STUCK_PENDING_MINUTES),
            remote: file.remote,
            branch: file.branch,
        })
    }

    /// Sets the recent-failure window.
    #[must_use]
    pub const fn with_failure_window_hours(mut self, hours: u64) -> Self {
        self.recent_failure_window_hours = hours;
        self
    }

    /// Sets the stuck-pending threshold.
    #[must_use]
    pub const fn with_stuck_pending_minutes(mut self, minutes: u64) -> Self {
        self.stuck_pending_minutes = minutes;
        self
    }

    /// Sets the push remote.
    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    /// Sets the push branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Recent-failure window in seconds, as the log store consumes it.
    #[must_use]
    pub const fn failure_window_secs(&self) -> u64 {
        self.recent_failure_window_hours * 3600
    }

    /// Stuck-pending threshold in seconds.
    #[must_use]
    pub const fn stuck_threshold_secs(&self) -> u64 {
        self.stuck_pending_minutes * 60
    }
}

/// On-disk TOML config shape. All fields optional.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Root of the git mirror working tree.
    pub repo_path: Option<PathBuf>,
    /// Path to the `SQLite` database file.
    pub db_path: Option<PathBuf>,
    /// Window for counting recent sync failures, in hours.
    pub recent_failure_window_hours: Option<u64>,
    /// Age past which a pending log row counts as stuck, in minutes.
    pub stuck_pending_minutes: Option<u64>,
    /// Remote name to push the mirror to.
    pub remote: Option<String>,
    /// Branch to push.
    pub branch: Option<String>,
}

impl ConfigFile {
    /// Parses a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        toml::from_str(&content).map_err(|e| Error::InvalidInput(format!(
            "invalid config file {}: {e}",
            path.display()
        )))
    }

    /// Loads the config file from the default location, or defaults when
    /// no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self> {
        let Some(dirs) = directories::ProjectDirs::from("", "", "vaultsync") else {
            return Ok(Self::default());
        };
        let path = dirs.config_dir().join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }
}
