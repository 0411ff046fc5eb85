use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use campaigner_dispatch::{ConsumerConfig, DispatchSettings, RecipientFailurePolicy, RetryPolicy};

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_in_flight: usize,
    pub page_size: u32,
    pub on_recipient_error: RecipientFailurePolicy,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub retry_backoff_max: Duration,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            db_path: get("CAMPAIGNER_DB_PATH", "campaigner.db").into(),
            host: get("CAMPAIGNER_HOST", "0.0.0.0"),
            port: parse(&lookup, "CAMPAIGNER_PORT", 4150)?,
            workers: parse(&lookup, "CAMPAIGNER_WORKERS", 20)?,
            max_in_flight: parse(&lookup, "CAMPAIGNER_MAX_IN_FLIGHT", 200)?,
            page_size: parse(&lookup, "CAMPAIGNER_PAGE_SIZE", 1000)?,
            on_recipient_error: parse(&lookup, "CAMPAIGNER_ON_RECIPIENT_ERROR", RecipientFailurePolicy::Abort)?,
            max_attempts: parse(&lookup, "CAMPAIGNER_MAX_ATTEMPTS", 1)?,
            retry_backoff: Duration::from_millis(parse(&lookup, "CAMPAIGNER_RETRY_BACKOFF_MS", 2000)?),
            retry_backoff_max: Duration::from_millis(parse(&lookup, "CAMPAIGNER_RETRY_BACKOFF_MAX_MS", 60_000)?),
            log_json: parse(&lookup, "CAMPAIGNER_LOG_JSON", false)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("CAMPAIGNER_WORKERS must be at least 1");
        }
        if self.max_in_flight == 0 {
            bail!("CAMPAIGNER_MAX_IN_FLIGHT must be at least 1");
        }
        if self.page_size == 0 {
            bail!("CAMPAIGNER_PAGE_SIZE must be at least 1");
        }
        if self.max_attempts == 0 {
            bail!("CAMPAIGNER_MAX_ATTEMPTS must be at least 1");
        }
        if self.retry_backoff > self.retry_backoff_max {
            bail!("CAMPAIGNER_RETRY_BACKOFF_MS exceeds CAMPAIGNER_RETRY_BACKOFF_MAX_MS");
        }
        Ok(())
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            page_size: self.page_size,
            on_recipient_error: self.on_recipient_error,
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            workers: self.workers,
            max_in_flight: self.max_in_flight,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                backoff_base: self.retry_backoff,
                backoff_max: self.retry_backoff_max,
            },
        }
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.db_path, PathBuf::from("campaigner.db"));
        assert_eq!(c.addr().unwrap(), "0.0.0.0:4150".parse::<SocketAddr>().unwrap());
        assert_eq!(c.workers, 20);
        assert_eq!(c.max_in_flight, 200);
        assert_eq!(c.page_size, 1000);
        assert_eq!(c.on_recipient_error, RecipientFailurePolicy::Abort);
        assert_eq!(c.consumer_config().retry.max_attempts, 1);
        assert!(!c.log_json);
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("CAMPAIGNER_PORT", "8080"),
            ("CAMPAIGNER_WORKERS", "4"),
            ("CAMPAIGNER_ON_RECIPIENT_ERROR", "skip"),
            ("CAMPAIGNER_MAX_ATTEMPTS", "3"),
            ("CAMPAIGNER_RETRY_BACKOFF_MS", "500"),
            ("CAMPAIGNER_LOG_JSON", "true"),
        ])
        .unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.dispatch_settings().on_recipient_error, RecipientFailurePolicy::SkipAndContinue);
        let consumer = c.consumer_config();
        assert_eq!(consumer.workers, 4);
        assert_eq!(consumer.retry.max_attempts, 3);
        assert_eq!(consumer.retry.backoff_base, Duration::from_millis(500));
        assert!(c.log_json);
    }

    #[test]
    fn rejects_garbage_and_zeroes() {
        assert!(config(&[("CAMPAIGNER_PORT", "http")]).is_err());
        assert!(config(&[("CAMPAIGNER_ON_RECIPIENT_ERROR", "retry")]).is_err());
        assert!(config(&[("CAMPAIGNER_WORKERS", "0")]).is_err());
        assert!(config(&[("CAMPAIGNER_MAX_IN_FLIGHT", "0")]).is_err());
        assert!(config(&[("CAMPAIGNER_PAGE_SIZE", "0")]).is_err());
        assert!(config(&[("CAMPAIGNER_MAX_ATTEMPTS", "0")]).is_err());
        assert!(config(&[("CAMPAIGNER_RETRY_BACKOFF_MS", "90000")]).is_err());
    }
}
