//! Runtime configuration. Everything is read from environment variables once at startup and
//! passed down explicitly; nothing below this module reads the environment.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::{Error, Result};

pub const ENV_BUCKET_NAME: &str = "BUCKET_NAME";
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";
pub const ENV_MAX_PAYLOAD_SIZE: &str = "MAX_PAYLOAD_SIZE";
pub const ENV_BATCH_WRITE_THRESHOLD: &str = "BATCH_WRITE_THRESHOLD";
pub const ENV_MAX_RETRIES: &str = "MAX_RETRIES";
pub const ENV_KEY_PREFIX: &str = "KEY_PREFIX";
pub const ENV_METRICS_NAMESPACE: &str = "METRICS_NAMESPACE";
pub const ENV_RETRY_INITIAL_INTERVAL_MS: &str = "RETRY_INITIAL_INTERVAL_MS";
pub const ENV_RETRY_MAX_INTERVAL_MS: &str = "RETRY_MAX_INTERVAL_MS";
pub const ENV_RETRY_FACTOR: &str = "RETRY_FACTOR";
pub const ENV_RETRY_JITTER: &str = "RETRY_JITTER";

const DEFAULT_MAX_PAYLOAD_SIZE: usize = 6 * 1024 * 1024;
const DEFAULT_BATCH_WRITE_THRESHOLD: usize = 50;
const DEFAULT_MAX_RETRIES: u16 = 3;
const DEFAULT_KEY_PREFIX: &str = "logs";
const DEFAULT_METRICS_NAMESPACE: &str = "LogAnalytics";
const DEFAULT_RETRY_INITIAL_INTERVAL_MS: u32 = 100;
const DEFAULT_RETRY_MAX_INTERVAL_MS: u32 = 2000;
const DEFAULT_RETRY_FACTOR: f64 = 2.0;
const DEFAULT_RETRY_JITTER: f64 = 0.1;

/// How the durable writer retries a failed put. `max_attempts` counts the first attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u16,
    pub initial_interval_in_ms: u32,
    pub max_interval_in_ms: u32,
    pub factor: f64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            initial_interval_in_ms: DEFAULT_RETRY_INITIAL_INTERVAL_MS,
            max_interval_in_ms: DEFAULT_RETRY_MAX_INTERVAL_MS,
            factor: DEFAULT_RETRY_FACTOR,
            jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Destination bucket of the archives.
    pub bucket_name: String,
    /// Environment tag stamped on every record, object and metric.
    pub environment: String,
    /// Payloads strictly larger than this are rejected before decoding.
    pub max_payload_size: usize,
    /// Number of buffered records that forces a flush.
    pub batch_write_threshold: usize,
    /// First path segment of every archive key.
    pub key_prefix: String,
    pub metrics_namespace: String,
    pub retry: RetryConfig,
}

impl Settings {
    /// Settings with defaults for everything but the two required values.
    pub fn new(bucket_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            environment: environment.into(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            batch_write_threshold: DEFAULT_BATCH_WRITE_THRESHOLD,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            metrics_namespace: DEFAULT_METRICS_NAMESPACE.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = env::vars().collect();
        vars.try_into()
    }
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String> {
    match vars.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::Config(format!("Environment variable {key} is not set"))),
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(key) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| Error::Config(format!("Parsing {key}={v}: {e}"))),
        None => Ok(default),
    }
}

impl TryFrom<HashMap<String, String>> for Settings {
    type Error = Error;

    fn try_from(vars: HashMap<String, String>) -> Result<Self> {
        let mut settings = Settings::new(
            required(&vars, ENV_BUCKET_NAME)?,
            required(&vars, ENV_ENVIRONMENT)?,
        );

        settings.max_payload_size =
            parse_or(&vars, ENV_MAX_PAYLOAD_SIZE, DEFAULT_MAX_PAYLOAD_SIZE)?;
        if settings.max_payload_size == 0 {
            return Err(Error::Config(format!(
                "{ENV_MAX_PAYLOAD_SIZE} must be greater than zero"
            )));
        }

        settings.batch_write_threshold =
            parse_or(&vars, ENV_BATCH_WRITE_THRESHOLD, DEFAULT_BATCH_WRITE_THRESHOLD)?;
        if settings.batch_write_threshold == 0 {
            return Err(Error::Config(format!(
                "{ENV_BATCH_WRITE_THRESHOLD} must be at least 1"
            )));
        }

        if let Some(prefix) = vars.get(ENV_KEY_PREFIX) {
            let prefix = prefix.trim().trim_matches('/');
            if prefix.is_empty() {
                return Err(Error::Config(format!("{ENV_KEY_PREFIX} must not be empty")));
            }
            settings.key_prefix = prefix.to_string();
        }

        if let Some(namespace) = vars.get(ENV_METRICS_NAMESPACE) {
            settings.metrics_namespace = namespace.trim().to_string();
        }

        settings.retry = RetryConfig {
            max_attempts: parse_or(&vars, ENV_MAX_RETRIES, DEFAULT_MAX_RETRIES)?,
            initial_interval_in_ms: parse_or(
                &vars,
                ENV_RETRY_INITIAL_INTERVAL_MS,
                DEFAULT_RETRY_INITIAL_INTERVAL_MS,
            )?,
            max_interval_in_ms: parse_or(
                &vars,
                ENV_RETRY_MAX_INTERVAL_MS,
                DEFAULT_RETRY_MAX_INTERVAL_MS,
            )?,
            factor: parse_or(&vars, ENV_RETRY_FACTOR, DEFAULT_RETRY_FACTOR)?,
            jitter: parse_or(&vars, ENV_RETRY_JITTER, DEFAULT_RETRY_JITTER)?,
        };

        if settings.retry.max_attempts == 0 {
            return Err(Error::Config(format!("{ENV_MAX_RETRIES} must be at least 1")));
        }
        if !(0.0..=1.0).contains(&settings.retry.jitter) {
            return Err(Error::Config(format!(
                "{ENV_RETRY_JITTER} must be between 0 and 1, got {}",
                settings.retry.jitter
            )));
        }
        if settings.retry.factor < 1.0 {
            return Err(Error::Config(format!(
                "{ENV_RETRY_FACTOR} must be at least 1, got {}",
                settings.retry.factor
            )));
        }

        Ok(settings)
    }
}
