//! Session Controller configuration.
//!
//! Configuration is loaded from environment variables. Sensitive fields are
//! redacted in Debug output.
//!
//! The embedding service owns the wiring: [`Config::room_limits`] feeds the
//! room factory, [`Config::status_feed`] sizes the status-subscriber feed,
//! `max_rooms` caps the registry, and `database_url` goes to whatever
//! implements the persistence trait.

use crate::actors::RoomLimits;
use crate::status::StatusFeed;

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default maximum number of live rooms per instance.
pub const DEFAULT_MAX_ROOMS: usize = 1000;

/// Default maximum peers per room.
pub const DEFAULT_MAX_PEERS_PER_ROOM: usize = 500;

/// Default maximum chat message length in characters.
pub const DEFAULT_CHAT_MAX_LENGTH: usize = 2000;

/// Default buffered snapshots per status-subscriber channel.
pub const DEFAULT_STATUS_FEED_CAPACITY: usize = 64;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "sc";

/// Session Controller configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    /// Connection URL handed to the persistence collaborator.
    /// Protected by `SecretString` to prevent accidental logging.
    pub database_url: SecretString,

    /// Unique identifier for this controller instance.
    pub instance_id: String,

    /// Maximum concurrent live rooms.
    pub max_rooms: usize,

    /// Maximum peers admitted to a single room.
    pub max_peers_per_room: usize,

    /// Maximum chat message length.
    pub chat_max_length: usize,

    /// Buffered snapshots per status-subscriber channel.
    pub status_feed_capacity: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("instance_id", &self.instance_id)
            .field("max_rooms", &self.max_rooms)
            .field("max_peers_per_room", &self.max_peers_per_room)
            .field("chat_max_length", &self.chat_max_length)
            .field("status_feed_capacity", &self.status_feed_capacity)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = SecretString::from(
            vars.get("SC_DATABASE_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("SC_DATABASE_URL".to_string()))?
                .clone(),
        );

        let max_rooms = vars
            .get("SC_MAX_ROOMS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_ROOMS);

        let max_peers_per_room = vars
            .get("SC_MAX_PEERS_PER_ROOM")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_PEERS_PER_ROOM);

        let chat_max_length = vars
            .get("SC_CHAT_MAX_LENGTH")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CHAT_MAX_LENGTH);

        let status_feed_capacity = vars
            .get("SC_STATUS_FEED_CAPACITY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_STATUS_FEED_CAPACITY);

        if max_peers_per_room == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_MAX_PEERS_PER_ROOM must be at least 1".to_string(),
            ));
        }

        let instance_id = vars.get("SC_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            database_url,
            instance_id,
            max_rooms,
            max_peers_per_room,
            chat_max_length,
            status_feed_capacity,
        })
    }

    /// Per-room limits handed to the room factory.
    #[must_use]
    pub fn room_limits(&self) -> RoomLimits {
        RoomLimits {
            max_peers: self.max_peers_per_room,
            chat_max_length: self.chat_max_length,
        }
    }

    /// A status-subscriber feed sized per configuration.
    #[must_use]
    pub fn status_feed(&self) -> StatusFeed {
        StatusFeed::new(self.status_feed_capacity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "SC_DATABASE_URL".to_string(),
            "postgres://localhost:5432/castline".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(
            config.database_url.expose_secret(),
            "postgres://localhost:5432/castline"
        );
        assert_eq!(config.max_rooms, DEFAULT_MAX_ROOMS);
        assert_eq!(config.max_peers_per_room, DEFAULT_MAX_PEERS_PER_ROOM);
        assert_eq!(config.chat_max_length, DEFAULT_CHAT_MAX_LENGTH);
        assert_eq!(config.status_feed_capacity, DEFAULT_STATUS_FEED_CAPACITY);
        assert!(config.instance_id.starts_with("sc-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("SC_MAX_ROOMS".to_string(), "50".to_string());
        vars.insert("SC_MAX_PEERS_PER_ROOM".to_string(), "10".to_string());
        vars.insert("SC_CHAT_MAX_LENGTH".to_string(), "280".to_string());
        vars.insert("SC_STATUS_FEED_CAPACITY".to_string(), "8".to_string());
        vars.insert("SC_INSTANCE_ID".to_string(), "sc-custom-001".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.max_rooms, 50);
        assert_eq!(config.max_peers_per_room, 10);
        assert_eq!(config.chat_max_length, 280);
        assert_eq!(config.status_feed_capacity, 8);
        assert_eq!(config.instance_id, "sc-custom-001");
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SC_DATABASE_URL"));
    }

    #[test]
    fn test_from_vars_rejects_zero_peer_limit() {
        let mut vars = base_vars();
        vars.insert("SC_MAX_PEERS_PER_ROOM".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_room_limits_follow_config() {
        let mut vars = base_vars();
        vars.insert("SC_MAX_PEERS_PER_ROOM".to_string(), "10".to_string());
        vars.insert("SC_CHAT_MAX_LENGTH".to_string(), "280".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        let limits = config.room_limits();

        assert_eq!(limits.max_peers, 10);
        assert_eq!(limits.chat_max_length, 280);
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgres://"));
    }
}
