use crate::error::Result;
use crate::io;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the actuator service.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Shared secret required to claim ownership of the device.
    #[serde(default = "default_wearer_secret")]
    pub wearer_secret: String,

    /// Longest continuous pump run, in seconds.
    #[serde(default = "default_max_pump_secs")]
    pub max_pump_secs: u64,

    /// Upper bound on the session balance, in seconds.
    #[serde(default = "default_max_session_secs")]
    pub max_session_secs: u64,

    /// Largest single addition to the session balance, in seconds.
    #[serde(default = "default_max_extension_secs")]
    pub max_extension_secs: u64,

    /// Upper bound on banked time reclaimed from interrupted runs.
    #[serde(default = "default_max_banked_secs")]
    pub max_banked_secs: u64,

    /// Interval between actuator liveness probes.
    #[serde(default = "default_health_poll_secs")]
    pub health_poll_secs: u64,

    /// Timeout applied to liveness probes only.
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,

    /// Timeout applied to all other actuator requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Granularity of the run controller's tick loop.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Where the durable session state lives.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_api_base_url() -> String {
    "http://localhost:80".to_string()
}

fn default_wearer_secret() -> String {
    "changeme".to_string()
}

fn default_max_pump_secs() -> u64 {
    60
}

fn default_max_session_secs() -> u64 {
    1800
}

fn default_max_extension_secs() -> u64 {
    3600
}

fn default_max_banked_secs() -> u64 {
    600
}

fn default_health_poll_secs() -> u64 {
    10
}

fn default_ping_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_tick_interval_ms() -> u64 {
    250
}

fn default_state_file() -> PathBuf {
    PathBuf::from("pumpd-state.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            wearer_secret: default_wearer_secret(),
            max_pump_secs: default_max_pump_secs(),
            max_session_secs: default_max_session_secs(),
            max_extension_secs: default_max_extension_secs(),
            max_banked_secs: default_max_banked_secs(),
            health_poll_secs: default_health_poll_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            state_file: default_state_file(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(path, data.as_bytes())
    }

    /// Load the config, writing the defaults to disk first when the file is
    /// missing so a fresh deployment has something to edit.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }
        Self::load(path)
    }

    /// Sanity-check the configuration. Error-level warnings must abort
    /// startup; warning-level findings are advisory.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.wearer_secret == default_wearer_secret() || self.wearer_secret.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "default wearer secret detected: edit the config and set \
                          'wearer_secret' to a real password before starting; anyone \
                          who knows the default can claim the device"
                    .to_string(),
            });
        }
        if self.tick_interval_ms == 0 || self.tick_interval_ms > 1000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "tick_interval_ms must be between 1 and 1000, got {}",
                    self.tick_interval_ms
                ),
            });
        }
        if self.health_poll_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "health_poll_secs must be greater than 0".to_string(),
            });
        }
        if self.max_pump_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "max_pump_secs is 0: every run request will be rejected".to_string(),
            });
        }
        if self.max_pump_secs > self.max_session_secs {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "max_pump_secs exceeds max_session_secs: runs are always \
                          clamped by the session balance first"
                    .to_string(),
            });
        }

        warnings
    }

    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_or_default_writes_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pumpd.yaml");
        let config = Config::load_or_default(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.max_pump_secs, 60);
        assert_eq!(config.api_base_url, "http://localhost:80");
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pumpd.yaml");
        std::fs::write(&path, "wearer_secret: hunter2\nmax_pump_secs: 90\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.wearer_secret, "hunter2");
        assert_eq!(config.max_pump_secs, 90);
        assert_eq!(config.max_session_secs, 1800);
    }

    #[test]
    fn default_secret_is_an_error() {
        let config = Config::default();
        assert!(config.has_errors());
    }

    #[test]
    fn real_secret_passes_validation() {
        let config = Config {
            wearer_secret: "hunter2".into(),
            ..Config::default()
        };
        assert!(!config.has_errors());
    }

    #[test]
    fn zero_tick_interval_is_an_error() {
        let config = Config {
            wearer_secret: "hunter2".into(),
            tick_interval_ms: 0,
            ..Config::default()
        };
        assert!(config.has_errors());
    }

    #[test]
    fn oversized_pump_duration_warns_but_does_not_block() {
        let config = Config {
            wearer_secret: "hunter2".into(),
            max_pump_secs: 7200,
            ..Config::default()
        };
        assert!(!config.has_errors());
        assert!(config
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Warning));
    }
}
