//! Configuration management for the bridge server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Values that fail to parse fall back to their default; [`Config::validate`]
//! rejects values that parse but make no sense.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use wechat_bridge_backend::WECHAT_API_BASE;
use wechat_bridge_core::EndpointSettings;
use wechat_bridge_core::settings::DEFAULT_TEMP_RESPONSE;
use wechat_bridge_runtime::CoordinatorConfig;

/// Default chat-messages API root.
pub const DEFAULT_CHAT_API_BASE: &str = "https://api.dify.ai/v1";

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value parsed but is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    /// Host and port do not form a socket address
    #[error("Invalid bind address {0}")]
    BindAddress(String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Official account configuration
    pub wechat: WechatConfig,
    /// Chat backend configuration
    pub chat: ChatConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host (default: 0.0.0.0)
    pub host: String,
    /// Bind port (default: 8080)
    pub port: u16,
    /// Seconds to drain in-flight requests on shutdown (default: 30)
    pub shutdown_timeout_secs: u64,
}

/// Official account configuration
#[derive(Debug, Clone)]
pub struct WechatConfig {
    /// Server token for signatures
    pub token: Option<String>,
    /// `EncodingAESKey`; enables encrypted mode
    pub encoding_aes_key: Option<String>,
    /// Official account app id
    pub app_id: Option<String>,
    /// Official account app secret
    pub app_secret: Option<String>,
    /// Transitional reply text
    pub temp_response: String,
    /// Platform API root
    pub api_base: String,
    /// Seconds the first request waits for the handler (default: 5.0)
    pub handler_timeout_secs: f64,
    /// Fraction of the handler timeout a retry waits (default: 0.8)
    pub retry_wait_ratio: f64,
    /// Retries answered with 500 before the transitional reply (default: 2)
    pub max_http_retries: u32,
}

/// Chat backend configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat-messages API root
    pub api_base: String,
    /// API key; selects the backend app
    pub api_key: String,
    /// Backend app id, used for logging and handler checks
    pub app_id: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of
    /// a variable if set.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| text(key).and_then(|v| v.trim().parse::<f64>().ok());

        Self {
            server: ServerConfig {
                host: text("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: text("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
                shutdown_timeout_secs: text("SHUTDOWN_TIMEOUT")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            },
            wechat: WechatConfig {
                token: text("WECHAT_TOKEN"),
                encoding_aes_key: text("WECHAT_ENCODING_AES_KEY"),
                app_id: text("WECHAT_APP_ID"),
                app_secret: text("WECHAT_APP_SECRET"),
                temp_response: text("WECHAT_TEMP_RESPONSE")
                    .unwrap_or_else(|| DEFAULT_TEMP_RESPONSE.to_string()),
                api_base: text("WECHAT_API_BASE").unwrap_or_else(|| WECHAT_API_BASE.to_string()),
                handler_timeout_secs: parsed("WECHAT_HANDLER_TIMEOUT_SECS").unwrap_or(5.0),
                retry_wait_ratio: parsed("WECHAT_RETRY_WAIT_RATIO").unwrap_or(0.8),
                max_http_retries: text("WECHAT_MAX_HTTP_RETRIES")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            },
            chat: ChatConfig {
                api_base: text("CHAT_API_BASE")
                    .unwrap_or_else(|| DEFAULT_CHAT_API_BASE.to_string()),
                api_key: text("CHAT_API_KEY").unwrap_or_default(),
                app_id: text("CHAT_APP_ID"),
            },
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if a timing value is out of range or the port is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("PORT must be > 0".to_string()));
        }
        let timeout = self.wechat.handler_timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "WECHAT_HANDLER_TIMEOUT_SECS must be a positive number, got {timeout}"
            )));
        }
        let ratio = self.wechat.retry_wait_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::Invalid(format!(
                "WECHAT_RETRY_WAIT_RATIO must be between 0.0 and 1.0, got {ratio}"
            )));
        }
        Ok(())
    }

    /// Socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns error if host and port do not parse as a socket address.
    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        let address = format!("{}:{}", self.server.host, self.server.port);
        address
            .parse()
            .map_err(|_| ConfigError::BindAddress(address))
    }

    /// Drain budget on shutdown.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Endpoint settings handed to the webhook.
    #[must_use]
    pub fn endpoint_settings(&self) -> EndpointSettings {
        EndpointSettings {
            wechat_token: self.wechat.token.clone(),
            encoding_aes_key: self.wechat.encoding_aes_key.clone(),
            app_id: self.wechat.app_id.clone(),
            app_secret: self.wechat.app_secret.clone(),
            chat_app_id: self.chat.app_id.clone(),
            temp_response: self.wechat.temp_response.clone(),
        }
    }

    /// Coordinator timing.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let defaults = CoordinatorConfig::default();
        let handler_timeout = Duration::try_from_secs_f64(self.wechat.handler_timeout_secs)
            .unwrap_or(defaults.handler_timeout);

        CoordinatorConfig::builder()
            .handler_timeout(handler_timeout)
            .retry_wait_ratio(self.wechat.retry_wait_ratio)
            .max_http_retries(self.wechat.max_http_retries)
            .build()
    }
}
