//! Startup configuration.
//!
//! Read once from the environment (after `.env` is loaded by the binary) and
//! passed explicitly to whatever needs it. Nothing else in the engine reads
//! the environment.
//!
//! | variable | default |
//! |----------|---------|
//! | `ANTHROPIC_API_KEY` | required |
//! | `INFINOVEL_MODEL` | client default |
//! | `INFINOVEL_APP_ID` | `infinovel` |
//! | `INFINOVEL_DATA_DIR` | `./infinovel-data` |
//! | `INFINOVEL_GENERATION_TIMEOUT_SECS` | `60` |
//! | `INFINOVEL_MAX_TOKENS` | `4096` |
//! | `INFINOVEL_TEMPERATURE` | `0.9` |
//! | `INFINOVEL_CUSTOM_PROMPT` | none |
//! | `INFINOVEL_USER` | anonymous id per run |

use crate::narrator::NarratorConfig;
use crate::store::Namespace;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_APP_ID: &str = "infinovel";
pub const DEFAULT_DATA_DIR: &str = "./infinovel-data";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_TOKENS: usize = 4096;
pub const DEFAULT_TEMPERATURE: f32 = 0.9;

/// Errors from reading configuration. All are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration.
#[derive(Clone, PartialEq)]
pub struct Config {
    pub api_key: String,
    pub model: Option<String>,
    pub app_id: String,
    pub data_dir: PathBuf,
    pub generation_timeout: Duration,
    pub max_tokens: usize,
    pub temperature: f32,
    pub custom_prompt: Option<String>,
    /// Stable user id; `None` means a fresh anonymous identity each run.
    pub user: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("model", &self.model)
            .field("app_id", &self.app_id)
            .field("data_dir", &self.data_dir)
            .field("generation_timeout", &self.generation_timeout)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

fn is_path_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
        && value != "."
        && value != ".."
}

fn parse<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get("ANTHROPIC_API_KEY").ok_or(ConfigError::Missing("ANTHROPIC_API_KEY"))?;

        let app_id = get("INFINOVEL_APP_ID").unwrap_or_else(|| DEFAULT_APP_ID.to_string());
        if !is_path_safe(&app_id) {
            return Err(ConfigError::Invalid {
                name: "INFINOVEL_APP_ID",
                value: app_id,
                reason: "only letters, digits, '_', '-', '.' and '@' are allowed".to_string(),
            });
        }

        let user = get("INFINOVEL_USER");
        if let Some(user) = &user {
            if !is_path_safe(user) {
                return Err(ConfigError::Invalid {
                    name: "INFINOVEL_USER",
                    value: user.clone(),
                    reason: "only letters, digits, '_', '-', '.' and '@' are allowed".to_string(),
                });
            }
        }

        let timeout_secs = match get("INFINOVEL_GENERATION_TIMEOUT_SECS") {
            Some(v) => parse::<u64>("INFINOVEL_GENERATION_TIMEOUT_SECS", v)?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "INFINOVEL_GENERATION_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let max_tokens = match get("INFINOVEL_MAX_TOKENS") {
            Some(v) => parse::<usize>("INFINOVEL_MAX_TOKENS", v)?,
            None => DEFAULT_MAX_TOKENS,
        };
        if max_tokens == 0 {
            return Err(ConfigError::Invalid {
                name: "INFINOVEL_MAX_TOKENS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let temperature = match get("INFINOVEL_TEMPERATURE") {
            Some(v) => parse::<f32>("INFINOVEL_TEMPERATURE", v)?,
            None => DEFAULT_TEMPERATURE,
        };
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ConfigError::Invalid {
                name: "INFINOVEL_TEMPERATURE",
                value: temperature.to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }

        Ok(Self {
            api_key,
            model: get("INFINOVEL_MODEL"),
            app_id,
            data_dir: get("INFINOVEL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            generation_timeout: Duration::from_secs(timeout_secs),
            max_tokens,
            temperature,
            custom_prompt: get("INFINOVEL_CUSTOM_PROMPT"),
            user,
        })
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.app_id.clone())
    }

    pub fn narrator_config(&self) -> NarratorConfig {
        NarratorConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
            custom_prompt: self.custom_prompt.clone(),
        }
    }
}
