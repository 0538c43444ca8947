//! Client configuration from the environment.
//!
//! Supported environment variables:
//! - SATCHEL_BACKEND_URL: backend base URL, http or https
//!   (default `http://localhost:8000/dnd/backend`)
//! - SATCHEL_JOIN_CODE: session to join on startup
//! - SATCHEL_PLAYER_ID: player to select once the game is known
//! - SATCHEL_DM_PASSWORD: take the Dungeon Master seat instead
//! - SATCHEL_RETRY_DELAY_SECS: delay between reconnect attempts (default 5)
//! - SATCHEL_MAX_RETRY_ATTEMPTS: reconnect budget (default 30)

use std::path::Path;
use std::time::Duration;

use satchel_domain::PlayerId;
use thiserror::Error;
use url::Url;

use crate::infrastructure::websocket::{
    action_address, ManagerSettings, RetryPolicy, MAX_RETRY_ATTEMPTS, RETRY_DELAY,
};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/dnd/backend";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid URL: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("{var} must use http or https, got {scheme}")]
    UnsupportedScheme { var: &'static str, scheme: String },

    #[error("{var} is not a valid number: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Who to play as once the session is joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seat {
    Player(PlayerId),
    DungeonMaster { password: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub backend_url: Url,
    pub join_code: Option<String>,
    pub seat: Option<Seat>,
    pub retry_policy: RetryPolicy,
}

impl ClientConfig {
    /// Load `.env.local` then `.env` from `root` and read the process
    /// environment.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        // Prefer local overrides.
        for filename in [".env.local", ".env"] {
            let path = root.join(filename);
            if path.exists() {
                if let Err(e) = dotenvy::from_path(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read env file");
                }
            }
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let backend_url = parse_backend_url(
            "SATCHEL_BACKEND_URL",
            read("SATCHEL_BACKEND_URL")
                .as_deref()
                .unwrap_or(DEFAULT_BACKEND_URL),
        )?;

        let seat = match (read("SATCHEL_DM_PASSWORD"), read("SATCHEL_PLAYER_ID")) {
            (Some(password), _) => Some(Seat::DungeonMaster { password }),
            (None, Some(raw)) => {
                let id = parse_number::<i64>("SATCHEL_PLAYER_ID", &raw)?;
                Some(Seat::Player(PlayerId::new(id)))
            }
            (None, None) => None,
        };

        let delay_secs = match read("SATCHEL_RETRY_DELAY_SECS") {
            Some(raw) => parse_positive("SATCHEL_RETRY_DELAY_SECS", &raw)?,
            None => RETRY_DELAY.as_secs(),
        };
        let max_attempts = match read("SATCHEL_MAX_RETRY_ATTEMPTS") {
            Some(raw) => parse_positive("SATCHEL_MAX_RETRY_ATTEMPTS", &raw)?,
            None => MAX_RETRY_ATTEMPTS,
        };

        Ok(Self {
            backend_url,
            join_code: read("SATCHEL_JOIN_CODE"),
            seat,
            retry_policy: RetryPolicy {
                max_attempts,
                delay: Duration::from_secs(delay_secs),
            },
        })
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            backend_url: self.backend_url.clone(),
            retry_policy: self.retry_policy,
        }
    }

    /// Where commands are posted.
    pub fn action_url(&self) -> Result<Url, ConfigError> {
        action_address(&self.backend_url).ok_or_else(|| ConfigError::InvalidUrl {
            var: "SATCHEL_BACKEND_URL",
            reason: "cannot be used as a base URL".into(),
        })
    }
}

fn parse_backend_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        var,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme {
            var,
            scheme: other.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.to_string(),
    })
}

fn parse_positive<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let value = parse_number::<T>(var, raw)?;
    if value == T::default() {
        return Err(ConfigError::Zero { var });
    }
    Ok(value)
}
