//! Capture daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

fn default_cdp_port() -> u16 {
    9222
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/tabtrace.sock")
}

fn default_identity_path() -> PathBuf {
    PathBuf::from("/tmp/tabtrace-daemon.json")
}

fn default_health_interval_secs() -> u64 {
    60
}

fn default_max_total_buffer_size() -> u64 {
    100_000_000
}

fn default_max_resource_buffer_size() -> u64 {
    10_000_000
}

fn default_body_fetch_grace_secs() -> u64 {
    3
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".tabtrace")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Remote debugging port the browser was started with.
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,

    /// Unix socket path the IPC server listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Where the daemon records its PID and socket path.
    #[serde(default = "default_identity_path")]
    pub identity_path: PathBuf,

    /// Seconds between browser health probes.
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,

    /// Total browser-side capture buffer, in bytes.
    #[serde(default = "default_max_total_buffer_size")]
    pub max_total_buffer_size: u64,

    /// Per-resource browser-side capture buffer, in bytes.
    #[serde(default = "default_max_resource_buffer_size")]
    pub max_resource_buffer_size: u64,

    /// Seconds a background body fetch may take before it is dropped.
    #[serde(default = "default_body_fetch_grace_secs")]
    pub body_fetch_grace_secs: u64,

    /// Directory for daemon log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cdp_port: default_cdp_port(),
            socket_path: default_socket_path(),
            identity_path: default_identity_path(),
            health_interval_secs: default_health_interval_secs(),
            max_total_buffer_size: default_max_total_buffer_size(),
            max_resource_buffer_size: default_max_resource_buffer_size(),
            body_fetch_grace_secs: default_body_fetch_grace_secs(),
            log_dir: default_log_dir(),
        }
    }
}

impl CaptureConfig {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, DaemonError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config: Self = serde_json::from_str(&contents)
                    .map_err(|e| DaemonError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(DaemonError::Io(e)),
        }
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.cdp_port == 0 {
            return Err(DaemonError::InvalidConfig(
                "cdp_port must be non-zero".to_string(),
            ));
        }
        if self.health_interval_secs == 0 {
            return Err(DaemonError::InvalidConfig(
                "health_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.max_resource_buffer_size > self.max_total_buffer_size {
            return Err(DaemonError::InvalidConfig(
                "max_resource_buffer_size cannot exceed max_total_buffer_size".to_string(),
            ));
        }
        Ok(())
    }

    /// HTTP debugging endpoint, e.g. `http://127.0.0.1:9222`.
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.cdp_port)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn body_fetch_grace(&self) -> Duration {
        Duration::from_secs(self.body_fetch_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cdp_port, 9222);
        assert_eq!(config.endpoint(), "http://127.0.0.1:9222");
        assert_eq!(config.health_interval(), Duration::from_secs(60));
        assert_eq!(config.max_total_buffer_size, 100_000_000);
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig::load(&dir.path().join("no-such.json")).unwrap();
        assert_eq!(config.cdp_port, CaptureConfig::default().cdp_port);
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cdp_port": 9333}"#).unwrap();

        let config = CaptureConfig::load(&path).unwrap();
        assert_eq!(config.cdp_port, 9333);
        assert_eq!(config.health_interval_secs, 60);
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            CaptureConfig::load(&path),
            Err(DaemonError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_port() {
        let config = CaptureConfig {
            cdp_port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_buffer_sizes() {
        let config = CaptureConfig {
            max_total_buffer_size: 1_000,
            max_resource_buffer_size: 2_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
