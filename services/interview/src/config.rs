//! Application Configuration Module
//!
//! Loads settings from environment variables into a single struct shared by
//! the CLI and the HTTP API.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 20;
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    /// Canned replies, no network access.
    Offline,
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub chat_model: Option<String>,
    pub log_level: Level,
    pub provider: LlmProvider,
    pub gateway_timeout: Duration,
    pub scenario_dir: Option<PathBuf>,
    pub rate_limit_burst: u32,
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `LLM_PROVIDER`: "openai", "gemini" or "offline". Defaults to "openai".
    // *   `OPENAI_API_KEY`: Required if provider is "openai".
    // *   `GEMINI_API_KEY`: Required if provider is "gemini".
    // *   `CHAT_MODEL`: (Optional) Model name for the selected provider.
    // *   `RUST_LOG`: (Optional) Logging level. Defaults to "INFO".
    // *   `GATEWAY_TIMEOUT_SECS`: (Optional) Per-call model timeout. Defaults to 30.
    // *   `SCENARIO_DIR`: (Optional) Directory of extra scenario files.
    // *   `RATE_LIMIT_BURST`, `RATE_LIMIT_PER_MINUTE`: (Optional) Per-session turn limits.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. Ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider = match lookup("LLM_PROVIDER")
            .unwrap_or_else(|| "openai".to_string())
            .to_lowercase()
            .as_str()
        {
            "gemini" => LlmProvider::Gemini,
            "offline" => LlmProvider::Offline,
            // Default to OpenAI for "openai" or any other value
            _ => LlmProvider::OpenAI,
        };

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let config = Self {
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|k| !k.is_empty()),
            chat_model: lookup("CHAT_MODEL").filter(|m| !m.is_empty()),
            log_level,
            provider,
            gateway_timeout: Duration::from_secs(parse_number(
                &lookup,
                "GATEWAY_TIMEOUT_SECS",
                DEFAULT_GATEWAY_TIMEOUT_SECS,
            )?),
            scenario_dir: lookup("SCENARIO_DIR").map(PathBuf::from),
            rate_limit_burst: parse_number(&lookup, "RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST)?,
            rate_limit_per_minute: parse_number(
                &lookup,
                "RATE_LIMIT_PER_MINUTE",
                DEFAULT_RATE_LIMIT_PER_MINUTE,
            )?,
        };

        // Validate that the required API key is present for the selected provider.
        match config.provider {
            LlmProvider::OpenAI if config.openai_api_key.is_none() => Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for openai provider".to_string(),
            )),
            LlmProvider::Gemini if config.gemini_api_key.is_none() => Err(ConfigError::MissingVar(
                "GEMINI_API_KEY must be set for gemini provider".to_string(),
            )),
            _ => Ok(config),
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_openai_key() {
        let config = load(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.gateway_timeout, Duration::from_secs(30));
        assert_eq!(config.rate_limit_burst, 10);
        assert_eq!(config.rate_limit_per_minute, 20);
        assert!(config.scenario_dir.is_none());
    }

    #[test]
    fn test_missing_key_for_provider() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(_))));
        assert!(matches!(
            load(&[("LLM_PROVIDER", "gemini"), ("OPENAI_API_KEY", "sk")]),
            Err(ConfigError::MissingVar(_))
        ));
    }

    #[test]
    fn test_offline_needs_no_key() {
        let config = load(&[("LLM_PROVIDER", "Offline"), ("RUST_LOG", "debug")]).unwrap();
        assert_eq!(config.provider, LlmProvider::Offline);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("LLM_PROVIDER", "offline"), ("RUST_LOG", "loud")]),
            Err(ConfigError::InvalidLogLevel(_))
        ));
        assert!(matches!(
            load(&[("LLM_PROVIDER", "offline"), ("GATEWAY_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidNumber {
                var: "GATEWAY_TIMEOUT_SECS",
                ..
            })
        ));
    }
}
