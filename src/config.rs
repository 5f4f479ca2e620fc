use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Site
    pub site_url: String,
    pub ws_token: String,
    pub site_id: String,
    pub user_id: i64,
    pub request_timeout: Duration,

    // Posts cache
    pub posts_cache_ttl: Duration,

    // Offline queue
    pub database_path: PathBuf,

    // Synchronization
    pub auto_sync_enabled: bool,
    pub auto_sync_interval: Duration,
    pub event_channel_capacity: usize,

    // Discussion view
    pub reply_prefix: String,
    pub watch: Option<WatchedDiscussion>,
}

/// Discussion the binary opens and follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchedDiscussion {
    pub forum_id: i64,
    pub discussion_id: i64,
    pub cmid: i64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let site_url = required_env("SITE_URL")?;
        let site_id = match optional_env("SITE_ID") {
            Some(id) => id,
            None => site_id_from_url(&site_url)?,
        };

        Ok(Self {
            // Site
            ws_token: required_env("WS_TOKEN")?,
            site_id,
            user_id: parse_required_i64("USER_ID")?,
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 30)?),
            site_url,

            // Posts cache
            posts_cache_ttl: Duration::from_secs(parse_env_u64("POSTS_CACHE_TTL_SECS", 300)?),

            // Offline queue
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/offline.sqlite")),

            // Synchronization
            auto_sync_enabled: parse_env_bool("AUTO_SYNC_ENABLED", true)?,
            auto_sync_interval: Duration::from_secs(parse_env_u64("AUTO_SYNC_INTERVAL_SECS", 600)?),
            event_channel_capacity: parse_env_usize("EVENT_CHANNEL_CAPACITY", 64)?,

            // Discussion view
            reply_prefix: env_or_default("REPLY_PREFIX", "Re:"),
            watch: parse_watched_discussion()?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.site_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "SITE_URL".to_string(),
                message: format!("not a valid URL: '{}'", self.site_url),
            });
        }
        if self.ws_token.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "WS_TOKEN".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.user_id <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "USER_ID".to_string(),
                message: "must be a positive user id".to_string(),
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "EVENT_CHANNEL_CAPACITY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.auto_sync_enabled && self.auto_sync_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "AUTO_SYNC_INTERVAL_SECS".to_string(),
                message: "must be at least 1 when auto sync is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration suitable for tests: no network, no auto sync.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            site_url: "http://127.0.0.1:9".to_string(),
            ws_token: "test-token".to_string(),
            site_id: "test-site".to_string(),
            user_id: 2,
            request_timeout: Duration::from_secs(5),
            posts_cache_ttl: Duration::from_secs(300),
            database_path: PathBuf::from("./data/test-offline.sqlite"),
            auto_sync_enabled: false,
            auto_sync_interval: Duration::from_secs(600),
            event_channel_capacity: 16,
            reply_prefix: "Re:".to_string(),
            watch: None,
        }
    }
}

fn site_id_from_url(site_url: &str) -> Result<String, ConfigError> {
    url::Url::parse(site_url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .ok_or_else(|| ConfigError::InvalidValue {
            name: "SITE_URL".to_string(),
            message: format!("cannot derive a site id from '{site_url}'"),
        })
}

fn parse_watched_discussion() -> Result<Option<WatchedDiscussion>, ConfigError> {
    let Some(discussion) = optional_env("DISCUSSION_ID") else {
        return Ok(None);
    };
    let discussion_id = parse_i64("DISCUSSION_ID", &discussion)?;
    Ok(Some(WatchedDiscussion {
        forum_id: parse_required_i64("FORUM_ID")?,
        discussion_id,
        cmid: parse_env_i64("CMID", 0)?,
    }))
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_i64(name: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse().map_err(|e| ConfigError::ParseInt {
        name: name.to_string(),
        source: e,
    })
}

fn parse_required_i64(name: &str) -> Result<i64, ConfigError> {
    parse_i64(name, &required_env(name)?)
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => parse_i64(name, &val),
        _ => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
