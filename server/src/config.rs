//! Server configuration parsed from environment variables.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` reads this once at startup. The presence of `DATABASE_URL` decides
//! the storage backend: Postgres when set, the in-memory store otherwise.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key} `{value}`")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Insert the demo messages at startup when the message table is empty.
    pub seed_demo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            seed_demo: false,
        }
    }
}

impl ServerConfig {
    /// Build typed server config from environment variables.
    ///
    /// Optional:
    /// - `HOST`: default `0.0.0.0`
    /// - `PORT`: default 8000
    /// - `DATABASE_URL`: unset or empty means in-memory storage
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `SEED_DEMO`: `1`/`true` seeds the demo messages at startup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `HOST` or `PORT` is set but does
    /// not parse. A bad `DB_MAX_CONNECTIONS` falls back to the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: env_required_parse("HOST", defaults.host)?,
            port: env_required_parse("PORT", defaults.port)?,
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            seed_demo: env_flag("SEED_DEMO"),
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn backend(&self) -> &'static str {
        if self.database_url.is_some() { "postgres" } else { "memory" }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_required_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
