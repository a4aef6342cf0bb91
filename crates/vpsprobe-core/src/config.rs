//! Runtime configuration.
//!
//! Built once at startup from whatever front end parsed the settings and
//! passed by reference to the components; nothing below reads the
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

/// Validated agent configuration.
#[derive(Clone)]
pub struct Config {
    pub server_url: Url,
    pub secret: Vec<u8>,
    pub node_id: String,
    pub hostname: Option<String>,
    pub interval: Duration,
    pub disk_path: PathBuf,
    pub state_path: PathBuf,
    pub proc_path: PathBuf,
    /// Upper bound for one metrics collection.
    pub collect_timeout: Duration,
    /// Upper bound for one report delivery.
    pub send_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &self.server_url.as_str())
            .field("secret", &"<redacted>")
            .field("node_id", &self.node_id)
            .field("hostname", &self.hostname)
            .field("interval", &self.interval)
            .field("disk_path", &self.disk_path)
            .field("state_path", &self.state_path)
            .field("proc_path", &self.proc_path)
            .field("collect_timeout", &self.collect_timeout)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

/// Error type for invalid or incomplete configuration. Always fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingServerUrl,
    MissingSecret,
    InvalidServerUrl(String),
    InvalidInterval,
    MissingNodeId,
    /// Node id the collector would reject.
    InvalidNodeId(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingServerUrl => write!(f, "PROBE_SERVER_URL is required"),
            ConfigError::MissingSecret => write!(f, "PROBE_HMAC_SECRET is required"),
            ConfigError::InvalidServerUrl(msg) => write!(f, "invalid server URL: {}", msg),
            ConfigError::InvalidInterval => write!(f, "interval must be at least one second"),
            ConfigError::MissingNodeId => {
                write!(f, "node id is empty and no hostname is available")
            }
            ConfigError::InvalidNodeId(id) => write!(
                f,
                "invalid node id '{}': use 1-64 of A-Z a-z 0-9 _ . -, starting alphanumeric",
                id
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Collects raw settings and validates them into a `Config`.
#[derive(Clone)]
pub struct ConfigBuilder {
    server_url: Option<String>,
    secret: Option<String>,
    node_id: Option<String>,
    hostname: Option<String>,
    interval: Duration,
    disk_path: PathBuf,
    state_path: PathBuf,
    proc_path: PathBuf,
    collect_timeout: Duration,
    send_timeout: Duration,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            server_url: None,
            secret: None,
            node_id: None,
            hostname: None,
            interval: Self::DEFAULT_INTERVAL,
            disk_path: PathBuf::from("/"),
            state_path: PathBuf::from(Self::DEFAULT_STATE_PATH),
            proc_path: PathBuf::from("/proc"),
            collect_timeout: Self::DEFAULT_COLLECT_TIMEOUT,
            send_timeout: Self::DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl ConfigBuilder {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
    pub const DEFAULT_STATE_PATH: &'static str = "/var/lib/vps-probe/state.json";
    pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Node identifier; defaults to the hostname when unset or blank.
    pub fn node_id(mut self, node_id: Option<String>) -> Self {
        self.node_id = node_id;
        self
    }

    pub fn hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn disk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_path = path.into();
        self
    }

    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    pub fn proc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_path = path.into();
        self
    }

    pub fn collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let raw_url = non_blank(self.server_url).ok_or(ConfigError::MissingServerUrl)?;
        let secret = self
            .secret
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret)?;

        let server_url =
            Url::parse(&raw_url).map_err(|e| ConfigError::InvalidServerUrl(e.to_string()))?;
        if !matches!(server_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidServerUrl(format!(
                "unsupported scheme '{}'",
                server_url.scheme()
            )));
        }

        if self.interval < Duration::from_secs(1) {
            return Err(ConfigError::InvalidInterval);
        }

        let hostname = non_blank(self.hostname);
        let node_id = non_blank(self.node_id)
            .or_else(|| hostname.clone())
            .ok_or(ConfigError::MissingNodeId)?;
        if !is_valid_node_id(&node_id) {
            return Err(ConfigError::InvalidNodeId(node_id));
        }

        Ok(Config {
            server_url,
            secret: secret.into_bytes(),
            node_id,
            hostname,
            interval: self.interval,
            disk_path: self.disk_path,
            state_path: self.state_path,
            proc_path: self.proc_path,
            collect_timeout: self.collect_timeout,
            send_timeout: self.send_timeout,
        })
    }
}

/// Node ids the collector accepts: `[A-Za-z0-9][A-Za-z0-9_.-]{0,63}`.
fn is_valid_node_id(id: &str) -> bool {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    id.len() <= 64
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
