use gemini_realtime::Endpoint;
use std::net::SocketAddr;
use tracing::Level;

pub const DEFAULT_GEMINI_WS_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-2.0-flash-exp";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_ws_url: String,
    pub gemini_model: String,
    pub log_level: Level,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_ws_url", &self.gemini_ws_url)
            .field("gemini_model", &self.gemini_model)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let gemini_ws_url =
            std::env::var("GEMINI_WS_URL").unwrap_or_else(|_| DEFAULT_GEMINI_WS_URL.to_string());
        if !(gemini_ws_url.starts_with("ws://") || gemini_ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(
                "GEMINI_WS_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", gemini_ws_url),
            ));
        }

        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            gemini_ws_url,
            gemini_model,
            log_level,
        })
    }

    /// The endpoint every upstream session connects to, with the API key as the `key` query parameter.
    pub fn upstream_endpoint(&self) -> Endpoint {
        let separator = if self.gemini_ws_url.contains('?') { '&' } else { '?' };
        Endpoint {
            url: format!("{}{}key={}", self.gemini_ws_url, separator, self.gemini_api_key),
            model: self.gemini_model.clone(),
        }
    }
}
