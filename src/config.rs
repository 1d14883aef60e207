use std::{str::FromStr, time::Duration};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Upper bound on a single storage round-trip in the realtime send path.
    pub persist_timeout: Duration,
    /// Outbound queue depth per live connection.
    pub outbound_buffer: usize,
    pub push_notifications: bool,
    pub session_inactivity: time::Duration,
    pub allow_dev_login: bool,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Config> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_owned()))?;

        Ok(Config {
            database_url,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_owned()),
            persist_timeout: Duration::from_millis(parse_or(&lookup, "PERSIST_TIMEOUT_MS", 5_000)?),
            outbound_buffer: parse_or(&lookup, "OUTBOUND_BUFFER", 256)?,
            push_notifications: parse_or(&lookup, "PUSH_NOTIFICATIONS", true)?,
            session_inactivity: time::Duration::minutes(parse_or(&lookup, "SESSION_INACTIVITY_MINUTES", 60)?),
            allow_dev_login: parse_or(&lookup, "ALLOW_DEV_LOGIN", false)?,
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw:?}"))),
    }
}
