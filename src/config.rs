use crate::session::{Credentials, HostTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub hosts: Vec<HostConfig>,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default = "default_max_concurrent_hosts")]
    pub max_concurrent_hosts: usize,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SshConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_username_env")]
    pub username_env: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CronConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cron_log_path")]
    pub log_path: String,
    #[serde(default = "default_service_probe")]
    pub service_probe: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_network_interface")]
    pub network_interface: String,
    #[serde(default = "default_disk_mounts")]
    pub disk_mounts: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            username: None,
            username_env: default_username_env(),
            password: None,
            password_env: default_password_env(),
            identity_file: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            log_path: default_cron_log_path(),
            service_probe: default_service_probe(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            network_interface: default_network_interface(),
            disk_mounts: default_disk_mounts(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    /// Reads and parses the file. Validation is left to the caller so that
    /// command-line overrides can be applied first.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_hosts < 1 {
            return Err(ConfigError::Validation(
                "max_concurrent_hosts must be >= 1".to_string(),
            ));
        }
        if self.log_file.trim().is_empty() {
            return Err(ConfigError::Validation(
                "log_file must not be empty".to_string(),
            ));
        }
        if !self.cron.enabled && !self.stats.enabled {
            return Err(ConfigError::Validation(
                "at least one of cron.enabled and stats.enabled must be true".to_string(),
            ));
        }

        validate_hosts(&self.hosts)?;
        validate_ssh(&self.ssh)?;
        validate_cron(&self.cron)?;
        validate_stats(&self.stats)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.command_timeout_secs)
    }

    /// Resolves one [`HostTarget`] per configured host. `lookup_env` is
    /// consulted for the username and password variables named in `ssh`.
    pub fn targets<F>(&self, lookup_env: F) -> Vec<HostTarget>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_username = non_empty(lookup_env(&self.ssh.username_env));
        let password = non_empty(self.ssh.password.clone())
            .or_else(|| non_empty(lookup_env(&self.ssh.password_env)));

        self.hosts
            .iter()
            .map(|host| HostTarget {
                host: host.host.trim().to_string(),
                port: host.port.unwrap_or(self.ssh.port),
                username: non_empty(host.username.clone())
                    .or_else(|| non_empty(self.ssh.username.clone()))
                    .or_else(|| env_username.clone()),
                credentials: Credentials {
                    password: password.clone(),
                    identity_file: self.ssh.identity_file.clone(),
                },
            })
            .collect()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_hosts(hosts: &[HostConfig]) -> Result<(), ConfigError> {
    if hosts.is_empty() {
        return Err(ConfigError::Validation(
            "hosts must contain at least one entry".to_string(),
        ));
    }
    let mut names = HashSet::new();
    for host in hosts {
        let name = host.host.trim();
        if name.is_empty() {
            return Err(ConfigError::Validation(
                "hosts[*].host must not be empty".to_string(),
            ));
        }
        if name.starts_with('-') || name.chars().any(char::is_whitespace) {
            return Err(ConfigError::Validation(format!(
                "host '{name}' is not a valid host name"
            )));
        }
        if !names.insert(name.to_string()) {
            return Err(ConfigError::Validation(format!(
                "host '{name}' must be unique"
            )));
        }
        if host.port == Some(0) {
            return Err(ConfigError::Validation(format!(
                "host '{name}' port must be in range 1..65535"
            )));
        }
    }
    Ok(())
}

fn validate_ssh(cfg: &SshConfig) -> Result<(), ConfigError> {
    if cfg.port == 0 {
        return Err(ConfigError::Validation(
            "ssh.port must be in range 1..65535".to_string(),
        ));
    }
    if cfg.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "ssh.connect_timeout_secs must be >= 1".to_string(),
        ));
    }
    if cfg.command_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "ssh.command_timeout_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_cron(cfg: &CronConfig) -> Result<(), ConfigError> {
    if !cfg.enabled {
        return Ok(());
    }
    if cfg.log_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "cron.log_path must not be empty".to_string(),
        ));
    }
    if cfg.service_probe.trim().is_empty() {
        return Err(ConfigError::Validation(
            "cron.service_probe must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_stats(cfg: &StatsConfig) -> Result<(), ConfigError> {
    if !cfg.enabled {
        return Ok(());
    }
    let iface = &cfg.network_interface;
    if iface.is_empty()
        || !iface
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
    {
        return Err(ConfigError::Validation(format!(
            "stats.network_interface '{iface}' may only contain [A-Za-z0-9_.:-]"
        )));
    }
    if cfg.disk_mounts.is_empty() {
        return Err(ConfigError::Validation(
            "stats.disk_mounts must contain at least one mount point".to_string(),
        ));
    }
    let mut mounts = HashSet::new();
    for mount in &cfg.disk_mounts {
        if !mount.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "stats.disk_mounts '{mount}' must be an absolute path"
            )));
        }
        if mount
            .chars()
            .any(|c| matches!(c, '\'' | '"' | '\\' | '$' | '`') || c.is_control())
        {
            return Err(ConfigError::Validation(format!(
                "stats.disk_mounts '{mount}' contains characters that cannot be probed"
            )));
        }
        if !mounts.insert(mount.as_str()) {
            return Err(ConfigError::Validation(format!(
                "stats.disk_mounts '{mount}' is listed twice"
            )));
        }
    }
    Ok(())
}

const fn default_max_concurrent_hosts() -> usize {
    1
}

fn default_log_file() -> String {
    "remote_stats.log".to_string()
}

const fn default_port() -> u16 {
    22
}

fn default_username_env() -> String {
    "MONITOR_USERNAME".to_string()
}

fn default_password_env() -> String {
    "MONITOR_PASSWORD".to_string()
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_command_timeout_secs() -> u64 {
    30
}

const fn default_enabled() -> bool {
    true
}

fn default_cron_log_path() -> String {
    "/var/log/cron".to_string()
}

fn default_service_probe() -> String {
    "systemctl is-active crond || service cron status | grep -E 'Active|running'".to_string()
}

fn default_network_interface() -> String {
    "wlp1s0".to_string()
}

fn default_disk_mounts() -> Vec<String> {
    ["/", "/home", "/var", "/tmp"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            hosts: vec![HostConfig {
                host: "rhel2".to_string(),
                port: None,
                username: None,
            }],
            ssh: SshConfig::default(),
            max_concurrent_hosts: 1,
            log_file: "remote_stats.log".to_string(),
            cron: CronConfig::default(),
            stats: StatsConfig::default(),
        }
    }

    #[test]
    fn example_yaml_is_valid() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example parses");
        cfg.validate().expect("example validates");
        assert_eq!(cfg.stats.disk_mounts, default_disk_mounts());
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("hosts:\n  - host: web1\n").expect("parses");
        cfg.validate().expect("validates");
        assert_eq!(cfg.ssh.port, 22);
        assert_eq!(cfg.ssh.connect_timeout_secs, 10);
        assert_eq!(cfg.ssh.command_timeout_secs, 30);
        assert_eq!(cfg.max_concurrent_hosts, 1);
        assert_eq!(cfg.cron.log_path, "/var/log/cron");
        assert_eq!(cfg.stats.network_interface, "wlp1s0");
    }

    #[test]
    fn rejects_empty_and_duplicate_hosts() {
        let mut cfg = valid_config();
        cfg.hosts.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config();
        cfg.hosts.push(cfg.hosts[0].clone());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unsafe_interface_and_mounts() {
        let mut cfg = valid_config();
        cfg.stats.network_interface = "eth0; rm -rf /".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config();
        cfg.stats.disk_mounts = vec!["/data'".to_string()];
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config();
        cfg.stats.disk_mounts = vec!["relative".to_string()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_disk_mounts_only_when_stats_enabled() {
        let mut cfg = valid_config();
        cfg.stats.disk_mounts.clear();
        assert!(cfg.validate().is_err());

        cfg.stats.enabled = false;
        cfg.validate().expect("disk mounts unused without stats");
    }

    #[test]
    fn rejects_everything_disabled() {
        let mut cfg = valid_config();
        cfg.cron.enabled = false;
        cfg.stats.enabled = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn targets_resolve_credentials_with_overrides() {
        let mut cfg = valid_config();
        cfg.hosts.push(HostConfig {
            host: "db1".to_string(),
            port: Some(2222),
            username: Some("postgres".to_string()),
        });

        let targets = cfg.targets(|name| match name {
            "MONITOR_USERNAME" => Some("ops".to_string()),
            "MONITOR_PASSWORD" => Some("hunter2".to_string()),
            _ => None,
        });

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].host, "rhel2");
        assert_eq!(targets[0].port, 22);
        assert_eq!(targets[0].username.as_deref(), Some("ops"));
        assert_eq!(targets[1].port, 2222);
        assert_eq!(targets[1].username.as_deref(), Some("postgres"));
        assert_eq!(targets[1].credentials.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn targets_ignore_blank_env_values() {
        let cfg = valid_config();
        let targets = cfg.targets(|_| Some("  ".to_string()));
        assert_eq!(targets[0].username, None);
        assert_eq!(targets[0].credentials.password, None);
    }
}
