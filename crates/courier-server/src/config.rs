//! Server configuration: TOML file + CLI overrides.

use crate::auth::Identity;
use crate::connection::Keepalive;
use courier_core::{CourierError, CourierResult, MAX_FRAME_BYTES};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub keepalive: KeepaliveSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub notifications: NotificationsSection,
    #[serde(default)]
    pub contacts: ContactsSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_capacity")]
    pub mailbox_capacity: usize,
    #[serde(default = "default_capacity")]
    pub intake_capacity: usize,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            mailbox_capacity: default_capacity(),
            intake_capacity: default_capacity(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

/// `[keepalive]` section: liveness probing and idle deadlines, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct KeepaliveSection {
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_read_deadline")]
    pub read_deadline_secs: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

impl Default for KeepaliveSection {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            read_deadline_secs: default_read_deadline(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    /// Base URL of the auth service. Absent ⇒ static tokens only.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_auth_timeout")]
    pub request_timeout_secs: u64,
    /// `token = { user_id = 1, name = "alice" }`
    #[serde(default)]
    pub tokens: HashMap<String, Identity>,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            url: None,
            cache_ttl_secs: default_cache_ttl(),
            request_timeout_secs: default_auth_timeout(),
            tokens: HashMap::new(),
        }
    }
}

/// `[notifications]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsSection {
    /// Base URL of a remote notification service. Absent ⇒ in-process.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for NotificationsSection {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout_secs: default_notify_timeout(),
        }
    }
}

/// `[contacts]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactsSection {
    #[serde(default = "default_request_window")]
    pub request_window_days: i64,
}

impl Default for ContactsSection {
    fn default() -> Self {
        Self {
            request_window_days: default_request_window(),
        }
    }
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_port() -> u16 {
    8085
}
fn default_capacity() -> usize {
    256
}
fn default_max_frame_bytes() -> usize {
    MAX_FRAME_BYTES
}
fn default_ping_interval() -> u64 {
    54
}
fn default_read_deadline() -> u64 {
    60
}
fn default_write_timeout() -> u64 {
    10
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_auth_timeout() -> u64 {
    2
}
fn default_notify_timeout() -> u64 {
    5
}
fn default_request_window() -> i64 {
    30
}

/// Longest accepted `contacts.request_window_days`.
const MAX_REQUEST_WINDOW_DAYS: i64 = 3650;

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
    pub auth_url: Option<String>,
    pub notification_url: Option<String>,
    pub seed: Option<String>,
}

/// Resolved auth settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub url: Option<String>,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub tokens: HashMap<String, Identity>,
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub mailbox_capacity: usize,
    pub intake_capacity: usize,
    pub max_frame_bytes: usize,
    pub keepalive: Keepalive,
    pub auth: AuthConfig,
    pub notification_url: Option<String>,
    pub notification_timeout: Duration,
    pub request_window: chrono::Duration,
    pub seed_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::build(ConfigFile::default(), Overrides::default())
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> CourierResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| CourierError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };
        Self::resolve(file_config, overrides)
    }

    /// Merge a parsed file with CLI overrides and validate the result.
    pub fn resolve(file: ConfigFile, overrides: Overrides) -> CourierResult<Self> {
        let ka = &file.keepalive;
        if ka.ping_interval_secs == 0 || ka.ping_interval_secs >= ka.read_deadline_secs {
            return Err(CourierError::Config(format!(
                "keepalive.ping_interval_secs ({}) must be non-zero and below read_deadline_secs ({})",
                ka.ping_interval_secs, ka.read_deadline_secs
            )));
        }
        if file.server.mailbox_capacity == 0 || file.server.intake_capacity == 0 {
            return Err(CourierError::Config(
                "server.mailbox_capacity and server.intake_capacity must be non-zero".into(),
            ));
        }
        let window = file.contacts.request_window_days;
        if !(1..=MAX_REQUEST_WINDOW_DAYS).contains(&window) {
            return Err(CourierError::Config(format!(
                "contacts.request_window_days ({window}) must be between 1 and {MAX_REQUEST_WINDOW_DAYS}"
            )));
        }
        Ok(Self::build(file, overrides))
    }

    fn build(file: ConfigFile, overrides: Overrides) -> Self {
        let ka = &file.keepalive;
        let keepalive = Keepalive {
            ping_interval: Duration::from_secs(ka.ping_interval_secs),
            read_deadline: Duration::from_secs(ka.read_deadline_secs),
            write_timeout: Duration::from_secs(ka.write_timeout_secs),
        };

        Self {
            bind: overrides.bind.unwrap_or(file.server.bind),
            port: overrides.port.unwrap_or(file.server.port),
            mailbox_capacity: file.server.mailbox_capacity,
            intake_capacity: file.server.intake_capacity,
            max_frame_bytes: file.server.max_frame_bytes,
            keepalive,
            auth: AuthConfig {
                url: overrides.auth_url.or(file.auth.url),
                cache_ttl: Duration::from_secs(file.auth.cache_ttl_secs),
                request_timeout: Duration::from_secs(file.auth.request_timeout_secs),
                tokens: file.auth.tokens,
            },
            notification_url: overrides.notification_url.or(file.notifications.url),
            notification_timeout: Duration::from_secs(file.notifications.request_timeout_secs),
            request_window: chrono::Duration::days(file.contacts.request_window_days),
            seed_path: overrides.seed.as_deref().map(expand_tilde_str),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
