use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Channel whose membership gates downloads (e.g. "@my_channel").
    channel_username: String,
    /// SQLite file. Defaults to `{data_dir}/database.db`.
    database_path: Option<String>,
    /// Directory for state files (logs, database). Defaults to current directory.
    data_dir: Option<String>,
    /// Base directory for relative file paths registered by admins.
    files_dir: Option<String>,
    log_chat_id: Option<i64>,
    #[serde(default = "default_oracle_timeout_secs")]
    oracle_timeout_secs: u64,
    oracle_api_base: Option<String>,
    /// Text shown for the "Info" button.
    info_text: Option<String>,
    /// Whether known keywords are only redeemable by channel members.
    #[serde(default)]
    require_subscription: bool,
}

fn default_oracle_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    /// Always starts with `@`.
    pub channel_username: String,
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub files_dir: Option<PathBuf>,
    pub log_chat_id: Option<ChatId>,
    pub oracle_timeout: Duration,
    pub oracle_api_base: String,
    pub info_text: Option<String>,
    pub require_subscription: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_valid = match file.telegram_bot_token.split_once(':') {
            Some((id, secret)) => id.parse::<u64>().is_ok() && !secret.is_empty() && !secret.contains(':'),
            None => false,
        };
        if !token_valid {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let channel = file.channel_username.trim();
        if channel.trim_start_matches('@').is_empty() {
            return Err(ConfigError::Validation("channel_username is required".into()));
        }
        let channel_username = if channel.starts_with('@') {
            channel.to_string()
        } else {
            format!("@{channel}")
        };

        if file.oracle_timeout_secs == 0 {
            return Err(ConfigError::Validation("oracle_timeout_secs must be greater than 0".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let database_path = file
            .database_path
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("database.db"));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            channel_username,
            database_path,
            data_dir,
            files_dir: file.files_dir.map(PathBuf::from),
            log_chat_id: file.log_chat_id.map(ChatId),
            oracle_timeout: Duration::from_secs(file.oracle_timeout_secs),
            oracle_api_base: file
                .oracle_api_base
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            info_text: file.info_text,
            require_subscription: file.require_subscription,
        })
    }

    /// Public link to the gated channel.
    pub fn channel_link(&self) -> String {
        format!("https://t.me/{}", self.channel_username.trim_start_matches('@'))
    }
}
