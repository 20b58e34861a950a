use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the panel settings file, relative to the working dir.
pub const DEFAULT_SETTINGS_FILE: &str = "panel.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StatusSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSettings {
    /// Freshness window of a memoized status snapshot.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_ttl_secs() -> u64 {
    5
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl StatusSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// RemoteSettings
// ---------------------------------------------------------------------------

/// Names and paths of the runner automation as installed on each host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    #[serde(default = "default_runner_user")]
    pub runner_user: String,
    #[serde(default = "default_timer_unit")]
    pub timer_unit: String,
    #[serde(default = "default_log_path")]
    pub log_path: String,
    #[serde(default = "default_scan_command")]
    pub scan_command: String,
    /// `ansible` executable to run; looked up on PATH when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible_program: Option<PathBuf>,
}

fn default_action_timeout_secs() -> u64 {
    10
}

fn default_runner_user() -> String {
    "github-runner".to_string()
}

fn default_timer_unit() -> String {
    "github-runner-auto-register.timer".to_string()
}

fn default_log_path() -> String {
    "/var/log/github-runner-auto-register.log".to_string()
}

fn default_scan_command() -> String {
    "/usr/local/bin/register-github-runners".to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            action_timeout_secs: default_action_timeout_secs(),
            runner_user: default_runner_user(),
            timer_unit: default_timer_unit(),
            log_path: default_log_path(),
            scan_command: default_scan_command(),
            ansible_program: None,
        }
    }
}

impl RemoteSettings {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// ServerSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_inventory")]
    pub inventory: PathBuf,
    #[serde(default = "default_vault")]
    pub vault: PathBuf,
    /// Inventory group every ad-hoc command is addressed to.
    #[serde(default = "default_host_group")]
    pub host_group: String,
    #[serde(default)]
    pub status: StatusSettings,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

fn default_inventory() -> PathBuf {
    PathBuf::from("../inventory/hosts")
}

fn default_vault() -> PathBuf {
    PathBuf::from("../group_vars/runner-hosts/vault.yml")
}

fn default_host_group() -> String {
    "runner-hosts".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inventory: default_inventory(),
            vault: default_vault(),
            host_group: default_host_group(),
            status: StatusSettings::default(),
            remote: RemoteSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults; a file
    /// that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(&data)?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !self.inventory.exists() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("inventory file {} does not exist", self.inventory.display()),
            });
        }
        if !self.vault.exists() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("vault file {} does not exist", self.vault.display()),
            });
        }
        if self.status.ttl_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "status.ttl_secs is 0: every request probes every host".to_string(),
            });
        }
        for (name, secs) in [
            ("status.probe_timeout_secs", self.status.probe_timeout_secs),
            ("remote.action_timeout_secs", self.remote.action_timeout_secs),
        ] {
            if secs == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name} must be greater than 0"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
