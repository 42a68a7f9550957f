use crate::credentials::{CredentialStore, Credentials};
use crate::platform::PlatformTag;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
/// Loaded from ~/.config/vcsched/scheduler.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub machines: Vec<MachineConfig>,
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Address the scheduler connects to (host or host:port).
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    pub platform: PlatformTag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Override for the per-run local artifact root.
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            chunk_size: default_chunk_size(),
            artifacts_dir: None,
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    8
}

fn default_chunk_size() -> usize {
    32 * 1024
}

impl Config {
    /// Load config from the default path (~/.config/vcsched/scheduler.yaml).
    pub fn load_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::empty())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("vcsched")
            .join("scheduler.yaml")
    }

    /// Empty config with no machines.
    pub fn empty() -> Self {
        Self {
            machines: Vec::new(),
            defaults: Defaults::default(),
        }
    }

    /// Find a machine config by address.
    pub fn find_machine(&self, address: &str) -> Option<&MachineConfig> {
        self.machines.iter().find(|m| m.address == address)
    }
}

impl MachineConfig {
    /// SSH port, falling back to 22.
    pub fn ssh_port(&self) -> u16 {
        self.port.unwrap_or(22)
    }
}

impl CredentialStore for Config {
    fn get_credentials(&self, machine: &str) -> Option<Credentials> {
        let entry = self.find_machine(machine)?;
        let password = entry.password.as_deref()?;
        Some(Credentials::new(entry.username.clone(), password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_machines_and_defaults() {
        let yaml = r#"
machines:
  - address: bench-01.lab
    username: alice
    password: s3cret
    platform: linux-x64
  - address: win-bench.lab
    port: 2222
    username: operator
    platform: windows-x64
defaults:
  connect_timeout_secs: 10
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.machines.len(), 2);
        assert_eq!(config.defaults.connect_timeout_secs, 10);
        assert_eq!(config.defaults.chunk_size, 32 * 1024);
        assert_eq!(config.machines[1].ssh_port(), 2222);
        assert_eq!(config.machines[0].ssh_port(), 22);

        let creds = config.get_credentials("bench-01.lab").unwrap();
        assert_eq!(creds.username, "alice");
        // No password configured means no credentials, not a partial pair.
        assert!(config.get_credentials("win-bench.lab").is_none());
        assert!(config.get_credentials("unknown.lab").is_none());
    }
}
