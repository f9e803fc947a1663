use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Process configuration, read from `INCUBATOR_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub tick_interval: Duration,
    pub db_timeout: Duration,
    pub reader_pool_size: usize,
    pub session_ttl: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let tick_secs: u64 = parse_or(&lookup, "INCUBATOR_TICK_SECS", 5)?;
        let timeout_ms: u64 = parse_or(&lookup, "INCUBATOR_DB_TIMEOUT_MS", 5000)?;
        let ttl_hours: u64 = parse_or(&lookup, "INCUBATOR_SESSION_TTL_HOURS", 24)?;

        if tick_secs == 0 {
            anyhow::bail!("INCUBATOR_TICK_SECS must be at least 1");
        }

        Ok(Self {
            db_path: lookup("INCUBATOR_DB_PATH").unwrap_or_else(|| "incubator.db".into()),
            host: lookup("INCUBATOR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "INCUBATOR_PORT", 5000)?,
            tick_interval: Duration::from_secs(tick_secs),
            db_timeout: Duration::from_millis(timeout_ms),
            reader_pool_size: parse_or(&lookup, "INCUBATOR_READER_POOL", 4)?,
            session_ttl: Duration::from_secs(ttl_hours * 3600),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
