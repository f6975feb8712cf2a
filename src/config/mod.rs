//! Configuration (layered: defaults < TOML file < environment).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnwiseError};
use crate::util::retry::RetryPolicy;

/// Default number of turns for one operate run.
pub const DEFAULT_MAX_TURNS: u32 = 10;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable → provider mappings for API keys.
const API_KEY_VARS: [(&str, &str); 1] = [("OPENAI_API_KEY", "openai")];

/// Environment variable → provider mappings for base URL overrides.
const BASE_URL_VARS: [(&str, &str); 1] = [("OPENAI_BASE_URL", "openai")];

/// Layered configuration for turnwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnwiseConfig {
    /// Turn limit applied when options leave it unset.
    pub max_turns: Option<u32>,
    pub retry: RetrySettings,
    pub providers: HashMap<String, ProviderSettings>,
}

/// Retry settings in their serialized (millisecond) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_factor: policy.backoff_factor,
            max_retries: policy.max_retries,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            max_retries: self.max_retries,
        }
    }
}

/// Credentials and endpoint for one provider.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TurnwiseConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| TurnwiseError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            TurnwiseError::Configuration(msg) => {
                TurnwiseError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Platform config location, e.g. `~/.config/turnwise/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "turnwise")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load the default config file if it exists, then apply the environment.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        let _ = dotenvy::dotenv();
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment variables (`.env` is loaded if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables. Invalid values are logged and skipped.
    pub fn apply_env(&mut self) {
        if let Some(turns) = env_parse::<u32>("TURNWISE_MAX_TURNS") {
            if turns == 0 {
                tracing::warn!(var = "TURNWISE_MAX_TURNS", "ignoring zero turn limit");
            } else {
                self.max_turns = Some(turns);
            }
        }
        if let Some(ms) = env_parse("TURNWISE_RETRY_INITIAL_DELAY_MS") {
            self.retry.initial_delay_ms = ms;
        }
        if let Some(ms) = env_parse("TURNWISE_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = ms;
        }
        if let Some(factor) = env_parse::<f64>("TURNWISE_RETRY_BACKOFF_FACTOR") {
            if factor.is_finite() && factor > 0.0 {
                self.retry.backoff_factor = factor;
            } else {
                tracing::warn!(
                    var = "TURNWISE_RETRY_BACKOFF_FACTOR",
                    factor,
                    "ignoring non-positive backoff factor"
                );
            }
        }
        if let Some(retries) = env_parse("TURNWISE_RETRY_MAX_RETRIES") {
            self.retry.max_retries = retries;
        }
        for (var, provider) in API_KEY_VARS {
            if let Ok(key) = std::env::var(var) {
                self.set_api_key(provider, key);
            }
        }
        for (var, provider) in BASE_URL_VARS {
            if let Ok(url) = std::env::var(var) {
                self.set_base_url(provider, url);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_turns == Some(0) {
            return Err(TurnwiseError::Configuration(
                "max_turns must be at least 1".into(),
            ));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor <= 0.0 {
            return Err(TurnwiseError::Configuration(format!(
                "retry.backoff_factor must be positive, got {}",
                self.retry.backoff_factor
            )));
        }
        Ok(())
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns.unwrap_or(DEFAULT_MAX_TURNS)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.providers.get(provider)?.api_key.as_deref()
    }

    pub fn base_url(&self, provider: &str) -> Option<&str> {
        self.providers.get(provider)?.base_url.as_deref()
    }

    pub fn set_api_key(&mut self, provider: &str, key: impl Into<String>) {
        self.providers.entry(provider.to_string()).or_default().api_key = Some(key.into());
    }

    pub fn set_base_url(&mut self, provider: &str, url: impl Into<String>) {
        self.providers.entry(provider.to_string()).or_default().base_url = Some(url.into());
    }
}

fn env_parse<T>(var: &'static str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(var, value = %raw, error = %e, "ignoring invalid environment value");
            None
        }
    }
}
