//! Application settings and paths.
//!
//! Manages XDG-compliant paths for configuration.

use crate::error::{ConfigError, ConfigResult};
use crate::ping::EngineConfig;
use crate::scan::{ResolutionPolicy, SessionSettings};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory paths following XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/pingboard)
    pub config_dir: PathBuf,
}

impl Paths {
    /// Locate the XDG directories, creating the config directory if needed.
    pub fn new() -> ConfigResult<Self> {
        let project = ProjectDirs::from("com", "pingboard", "pingboard")
            .ok_or(ConfigError::DirectoryNotFound)?;

        let paths = Self {
            config_dir: project.config_dir().to_path_buf(),
        };

        fs::create_dir_all(&paths.config_dir)?;

        Ok(paths)
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Default location of the hosts file.
    pub fn hosts_file(&self) -> PathBuf {
        self.config_dir.join("hosts.json")
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Pinger workers per session, 0 for twice the CPU count.
    pub pingers: usize,
    /// Resolver workers per session, 0 for four times the CPU count.
    pub resolvers: usize,
    /// Engine request queue depth and session queue depth.
    pub queue_size: usize,
    /// Probe timeout in milliseconds.
    pub timeout_ms: u64,
    /// Address the `serve` command listens on.
    pub listen_addr: SocketAddr,
    /// Hosts file; the config directory's `hosts.json` when unset.
    pub hosts_path: Option<PathBuf>,
    /// What a failed lookup does to a session.
    pub resolution_policy: ResolutionPolicy,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            pingers: 0,
            resolvers: 0,
            queue_size: 1024,
            timeout_ms: 1000,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            hosts_path: None,
            resolution_policy: ResolutionPolicy::FailFast,
        }
    }
}

impl AppSettings {
    /// Load settings from the default location, or defaults if absent.
    pub fn load() -> ConfigResult<Self> {
        let file = Paths::new()?.settings_file();

        if !file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue_size == 0 || self.queue_size > EngineConfig::MAX_QUEUE_CAPACITY {
            return Err(ConfigError::InvalidValue(format!(
                "queue_size must be between 1 and {}, got {}",
                EngineConfig::MAX_QUEUE_CAPACITY,
                self.queue_size
            )));
        }
        if self.timeout() < EngineConfig::MIN_TIMEOUT {
            return Err(ConfigError::InvalidValue(format!(
                "timeout_ms must be at least {}, got {}",
                EngineConfig::MIN_TIMEOUT.as_millis(),
                self.timeout_ms
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn effective_pingers(&self) -> usize {
        if self.pingers == 0 {
            2 * cpu_count()
        } else {
            self.pingers
        }
    }

    pub fn effective_resolvers(&self) -> usize {
        if self.resolvers == 0 {
            4 * cpu_count()
        } else {
            self.resolvers
        }
    }

    /// Hosts file to load, falling back to the config directory.
    pub fn hosts_file(&self) -> ConfigResult<PathBuf> {
        match &self.hosts_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Paths::new()?.hosts_file()),
        }
    }

    /// Engine sizing derived from these settings.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.effective_pingers(), self.queue_size, self.timeout())
    }

    /// Session sizing derived from these settings.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            resolvers: self.effective_resolvers(),
            pingers: self.effective_pingers(),
            queue_size: self.queue_size,
            policy: self.resolution_policy,
        }
    }
}

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.queue_size, 1024);
        assert_eq!(settings.timeout_ms, 1000);
        assert_eq!(settings.listen_addr.port(), 8080);
        assert_eq!(settings.resolution_policy, ResolutionPolicy::FailFast);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_scale_with_cpus() {
        let settings = AppSettings::default();
        let cpus = cpu_count();
        assert_eq!(settings.effective_pingers(), 2 * cpus);
        assert_eq!(settings.effective_resolvers(), 4 * cpus);

        let fixed = AppSettings {
            pingers: 3,
            resolvers: 5,
            ..AppSettings::default()
        };
        assert_eq!(fixed.session_settings().pingers, 3);
        assert_eq!(fixed.session_settings().resolvers, 5);
        assert_eq!(fixed.engine_config().workers, 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty_queue = AppSettings {
            queue_size: 0,
            ..AppSettings::default()
        };
        assert!(matches!(empty_queue.validate(), Err(ConfigError::InvalidValue(_))));

        let huge_queue = AppSettings {
            queue_size: 70_000,
            ..AppSettings::default()
        };
        assert!(huge_queue.validate().is_err());

        let tiny_timeout = AppSettings {
            timeout_ms: 1,
            ..AppSettings::default()
        };
        assert!(tiny_timeout.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"timeout_ms": 250, "resolution_policy": "continue"}"#).unwrap();

        let settings = AppSettings::load_from(&path).unwrap();
        assert_eq!(settings.timeout_ms, 250);
        assert_eq!(settings.resolution_policy, ResolutionPolicy::Continue);
        assert_eq!(settings.queue_size, 1024);
    }

    #[test]
    fn test_written_file_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let settings = AppSettings {
            hosts_path: Some(PathBuf::from("/etc/pingboard/hosts.json")),
            listen_addr: "127.0.0.1:9000".parse().unwrap(),
            ..AppSettings::default()
        };

        fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
        assert_eq!(AppSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            AppSettings::load_from(&path),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            AppSettings::load_from(&dir.path().join("missing.json")),
            Err(ConfigError::ReadFailed { .. })
        ));
    }
}
