// ============================
// partyline-backend/src/config.rs
// ============================
//! Configuration management.
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "partyline.toml";

/// Prefix for environment overrides, e.g. `PARTYLINE_CHAT__HISTORY_LIMIT=20`
pub const ENV_PREFIX: &str = "PARTYLINE_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path
    pub data_dir: PathBuf,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// Identity token TTL in seconds
    pub session_ttl_secs: u64,
    /// Capacity of each connection's outbound event queue
    pub outbound_buffer: usize,
    /// Party limits
    pub party: PartySettings,
    /// Chat limits
    pub chat: ChatSettings,
    /// Profile view
    pub profile: ProfileSettings,
}

/// Limits applied when creating parties
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartySettings {
    pub max_members_limit: u32,
    pub max_description_len: usize,
    pub max_mode_len: usize,
}

/// Chat history and message limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Messages replayed on room entry and shown in the detail view
    pub history_limit: usize,
    pub max_message_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSettings {
    /// Number of recent memberships listed for a user
    pub recent_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            session_ttl_secs: 60 * 60 * 24 * 7, // 7 days
            outbound_buffer: 64,
            party: PartySettings::default(),
            chat: ChatSettings::default(),
            profile: ProfileSettings::default(),
        }
    }
}

impl Default for PartySettings {
    fn default() -> Self {
        Self {
            max_members_limit: 16,
            max_description_len: 500,
            max_mode_len: 40,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_limit: 50,
            max_message_len: 1000,
        }
    }
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self { recent_limit: 5 }
    }
}

impl Settings {
    /// Load settings from `partyline.toml` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from a specific TOML file and the environment.
    /// A missing file is not an error; defaults fill the gaps.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            bail!("invalid log level: {}", self.log_level);
        }
        if self.session_ttl_secs == 0 {
            bail!("session_ttl_secs must be greater than zero");
        }
        if self.outbound_buffer == 0 {
            bail!("outbound_buffer must be greater than zero");
        }
        if self.party.max_members_limit == 0 {
            bail!("party.max_members_limit must be greater than zero");
        }
        if self.chat.history_limit == 0 {
            bail!("chat.history_limit must be greater than zero");
        }
        if self.chat.max_message_len == 0 {
            bail!("chat.max_message_len must be greater than zero");
        }
        Ok(())
    }
}
