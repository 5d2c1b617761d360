//! Runtime configuration for the garment AI features, loaded from the environment.

use std::{str::FromStr, time::Duration};

use secrecy::SecretString;
use thiserror::Error;

use super::ai_gateway::{DEFAULT_API_URL, DEFAULT_MODEL, RetryPolicy};

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "GARMENT_AI_BASE_URL";
pub const ENV_MODEL: &str = "GARMENT_AI_MODEL";
pub const ENV_MAX_TOKENS: &str = "GARMENT_AI_MAX_TOKENS";
pub const ENV_TIMEOUT_SECS: &str = "GARMENT_AI_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "GARMENT_AI_MAX_RETRIES";
pub const ENV_MAX_CONCURRENCY: &str = "GARMENT_AI_MAX_CONCURRENCY";
pub const ENV_BATCH_CONCURRENCY: &str = "GARMENT_AI_BATCH_CONCURRENCY";
pub const ENV_BATCH_DELAY_MS: &str = "GARMENT_AI_BATCH_DELAY_MS";

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_BATCH_CONCURRENCY: usize = 3;
const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Settings for the gateway and the batch helpers.
///
/// The credential is optional here; calls fail with `MissingApiKey` before any
/// network I/O when it is absent.
#[derive(Debug)]
pub struct GarmentAiConfig {
    pub api_key: Option<SecretString>,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Per-call timeout; `None` disables it
    pub request_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    /// Upper bound on requests in flight through one gateway; `None` is unbounded
    pub max_concurrency: Option<usize>,
    pub batch_concurrency: usize,
    /// Pause before each batch call after the first
    pub batch_delay: Duration,
}

impl Default for GarmentAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: Some(0.3),
            request_timeout: Some(DEFAULT_TIMEOUT),
            retry: RetryPolicy::default(),
            max_concurrency: None,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

impl GarmentAiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        config.api_key = get(ENV_API_KEY).map(SecretString::from);
        if let Some(endpoint) = get(ENV_BASE_URL) {
            config.endpoint = endpoint;
        }
        if let Some(model) = get(ENV_MODEL) {
            config.model = model;
        }
        if let Some(max_tokens) = parse::<u32>(ENV_MAX_TOKENS, get(ENV_MAX_TOKENS))? {
            config.max_tokens = max_tokens;
        }
        if let Some(secs) = parse::<u64>(ENV_TIMEOUT_SECS, get(ENV_TIMEOUT_SECS))? {
            config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(retries) = parse::<usize>(ENV_MAX_RETRIES, get(ENV_MAX_RETRIES))? {
            config.retry.max_retries = retries;
        }
        if let Some(limit) = parse::<usize>(ENV_MAX_CONCURRENCY, get(ENV_MAX_CONCURRENCY))? {
            config.max_concurrency = (limit > 0).then_some(limit);
        }
        if let Some(limit) = parse::<usize>(ENV_BATCH_CONCURRENCY, get(ENV_BATCH_CONCURRENCY))? {
            config.batch_concurrency = limit.max(1);
        }
        if let Some(ms) = parse::<u64>(ENV_BATCH_DELAY_MS, get(ENV_BATCH_DELAY_MS))? {
            config.batch_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| v.parse::<T>().map_err(|_| ConfigError::Invalid { key, value: v }))
        .transpose()
}
