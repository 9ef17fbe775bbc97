use std::time::Duration;

use anyhow::{Context as _, Result};

use crate::worker::{WorkerConfig, DEFAULT_REQUEUE_AFTER};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub operator_namespace: String,
    pub resync_interval: Duration,
    pub max_conflict_retries: u32,
    pub retry_window: Duration,
    pub workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which returns `None` for unset names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let log_level = lookup("KFORGE_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let operator_namespace =
            lookup("KFORGE_OPERATOR_NAMESPACE").unwrap_or_else(|| "default".to_string());

        let resync_secs: u64 = parse_or(&lookup, "KFORGE_RESYNC_INTERVAL_SECS", 30)?;
        let max_conflict_retries = parse_or(&lookup, "KFORGE_MAX_CONFLICT_RETRIES", 3)?;
        let retry_window_secs: u64 = parse_or(&lookup, "KFORGE_RETRY_WINDOW_SECS", 600)?;
        let workers: usize = parse_or(&lookup, "KFORGE_WORKERS", 4)?;

        if resync_secs == 0 {
            anyhow::bail!("KFORGE_RESYNC_INTERVAL_SECS must be positive");
        }
        if workers == 0 {
            anyhow::bail!("KFORGE_WORKERS must be positive");
        }

        Ok(Self {
            log_level,
            operator_namespace,
            resync_interval: Duration::from_secs(resync_secs),
            max_conflict_retries,
            retry_window: Duration::from_secs(retry_window_secs),
            workers,
        })
    }

    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            resync_interval: self.resync_interval,
            requeue_after: DEFAULT_REQUEUE_AFTER,
            max_conflict_retries: self.max_conflict_retries,
            retry_window: self.retry_window,
            workers: self.workers,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {name}: {raw:?}")),
        None => Ok(default),
    }
}
