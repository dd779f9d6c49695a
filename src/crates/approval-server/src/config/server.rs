//! Server configuration for approval-server
//!
//! Loads approval-server.toml, then applies environment overrides. Every
//! section and field has a default, so a missing file or an empty one yields
//! a runnable development server (in-memory storage, log-only notifier).
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [approvals]
//! reminder_delay_secs = 180
//! reminder_cooldown_secs = 300
//! min_comment_chars = 10
//! fallback_recipient = "approvals@example.com"
//! edd_recipient = "edd-team@example.com"
//! base_url = "https://review.example.com"
//!
//! [storage]
//! backend = "file"
//! path = "/var/lib/approval-server"
//!
//! [notifier]
//! mode = "webhook"
//! webhook_url = "https://mail-relay.internal/send"
//! timeout_secs = 10
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::services::ApprovalSettings;

/// Upper bound for reminder delay and cooldown
pub const MAX_REMINDER_TIMING_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Listen address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Approval workflow tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub reminder_delay_secs: u64,
    pub reminder_cooldown_secs: u64,
    pub min_comment_chars: usize,
    pub fallback_recipient: Option<String>,
    pub edd_recipient: Option<String>,
    pub base_url: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            reminder_delay_secs: 180,
            reminder_cooldown_secs: 300,
            min_comment_chars: 10,
            fallback_recipient: None,
            edd_recipient: None,
            base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

/// Storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Lost on restart
    Memory,
    /// `<path>/checkpoints/<run_id>.json` and `<path>/tokens.json`
    File,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.path.join("checkpoints")
    }

    pub fn tokens_file(&self) -> PathBuf {
        self.path.join("tokens.json")
    }
}

/// Notification sender mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierMode {
    /// Log notifications only
    Log,
    /// POST notifications to `webhook_url`
    Webhook,
}

impl FromStr for NotifierMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(NotifierMode::Log),
            "webhook" => Ok(NotifierMode::Webhook),
            other => Err(format!("unknown notifier mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub mode: NotifierMode,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            mode: NotifierMode::Log,
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ListenConfig,
    pub approvals: ApprovalConfig,
    pub storage: StorageConfig,
    pub notifier: NotifierConfig,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServerConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ServerConfigError::ReadError)?;
        Self::from_str(&content)
    }

    /// Load configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ServerConfigError> {
        toml::from_str(content).map_err(ServerConfigError::ParseError)
    }

    /// Load configuration from the default locations
    ///
    /// Searches for config in:
    /// 1. `explicit` (the `--config` flag) or the CONFIG_PATH environment variable
    /// 2. ./config/approval-server.toml
    /// 3. ./approval-server.toml
    ///
    /// Falls back to defaults when no file exists. Environment overrides are
    /// applied in every case.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ServerConfigError> {
        let env_path = std::env::var("CONFIG_PATH").ok().map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(path)?,
            None => {
                let paths = [
                    PathBuf::from("config/approval-server.toml"),
                    PathBuf::from("./approval-server.toml"),
                ];
                match paths.iter().find(|p| p.exists()) {
                    Some(path) => {
                        tracing::info!(path = %path.display(), "Loading configuration file");
                        Self::from_file(path)?
                    }
                    None => {
                        tracing::info!("No configuration file found; using defaults");
                        Self::default()
                    }
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HOST`, `PORT` and `APPROVAL_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ServerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_var(&lookup, "PORT")? {
            self.server.port = port;
        }
        if let Some(secs) = parse_var(&lookup, "APPROVAL_REMINDER_DELAY_SECS")? {
            self.approvals.reminder_delay_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, "APPROVAL_REMINDER_COOLDOWN_SECS")? {
            self.approvals.reminder_cooldown_secs = secs;
        }
        if let Some(chars) = parse_var(&lookup, "APPROVAL_MIN_COMMENT_CHARS")? {
            self.approvals.min_comment_chars = chars;
        }
        if let Some(recipient) = lookup("APPROVAL_FALLBACK_RECIPIENT") {
            self.approvals.fallback_recipient = non_empty(recipient);
        }
        if let Some(recipient) = lookup("APPROVAL_EDD_RECIPIENT") {
            self.approvals.edd_recipient = non_empty(recipient);
        }
        if let Some(base_url) = lookup("APPROVAL_BASE_URL") {
            self.approvals.base_url = base_url;
        }
        if let Some(backend) = parse_var(&lookup, "APPROVAL_STORAGE_BACKEND")? {
            self.storage.backend = backend;
        }
        if let Some(path) = lookup("APPROVAL_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(mode) = parse_var(&lookup, "APPROVAL_NOTIFIER")? {
            self.notifier.mode = mode;
        }
        if let Some(url) = lookup("APPROVAL_WEBHOOK_URL") {
            self.notifier.webhook_url = non_empty(url);
        }
        if let Some(secs) = parse_var(&lookup, "APPROVAL_NOTIFY_TIMEOUT_SECS")? {
            self.notifier.timeout_secs = secs;
        }
        Ok(())
    }

    /// Reject configurations the services cannot run with
    pub fn validate(&self) -> Result<(), ServerConfigError> {
        if self.approvals.min_comment_chars == 0 {
            return Err(ServerConfigError::InvalidConfig(
                "approvals.min_comment_chars must be at least 1".to_string(),
            ));
        }
        if self.approvals.base_url.trim().is_empty() {
            return Err(ServerConfigError::InvalidConfig(
                "approvals.base_url cannot be empty".to_string(),
            ));
        }
        if self.notifier.timeout_secs == 0 {
            return Err(ServerConfigError::InvalidConfig(
                "notifier.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.notifier.mode == NotifierMode::Webhook && self.notifier.webhook_url.is_none() {
            return Err(ServerConfigError::InvalidConfig(
                "notifier.webhook_url is required in webhook mode".to_string(),
            ));
        }
        for (name, secs) in [
            ("approvals.reminder_delay_secs", self.approvals.reminder_delay_secs),
            ("approvals.reminder_cooldown_secs", self.approvals.reminder_cooldown_secs),
        ] {
            if secs > MAX_REMINDER_TIMING_SECS {
                return Err(ServerConfigError::InvalidConfig(format!(
                    "{} must be at most {} (one year), got {}",
                    name, MAX_REMINDER_TIMING_SECS, secs
                )));
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ServerConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                ServerConfigError::InvalidConfig(format!(
                    "invalid listen address {}:{}: {}",
                    self.server.host, self.server.port, e
                ))
            })
    }

    /// Service tunables derived from this configuration
    pub fn approval_settings(&self) -> ApprovalSettings {
        ApprovalSettings {
            reminder_delay: chrono::Duration::seconds(self.approvals.reminder_delay_secs as i64),
            reminder_cooldown: chrono::Duration::seconds(self.approvals.reminder_cooldown_secs as i64),
            min_comment_chars: self.approvals.min_comment_chars,
            fallback_recipient: self.approvals.fallback_recipient.clone(),
            edd_recipient: self.approvals.edd_recipient.clone(),
            base_url: self.approvals.base_url.clone(),
            notify_timeout: std::time::Duration::from_secs(self.notifier.timeout_secs),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ServerConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ServerConfigError::InvalidConfig(format!(
                "Failed to parse environment variable {}: {}",
                key, e
            ))
        }),
        None => Ok(None),
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
