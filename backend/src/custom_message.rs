//! Customer-service message API.
//!
//! Sending needs an access token, which the platform rate-limits and which
//! lives for two hours. Tokens are cached per `(app_id, app_secret)` in an
//! [`AccessTokenCache`] shared by every sender in the process, and refreshed
//! once they are within five minutes of expiry. Two senders refreshing at the
//! same moment both fetch; the later write wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use wechat_bridge_core::environment::Clock;
use wechat_bridge_core::error::PushError;
use wechat_bridge_core::push::PushSender;

use crate::types::{CustomTextMessage, PlatformStatus, TokenResponse};

/// Production API root.
pub const WECHAT_API_BASE: &str = "https://api.weixin.qq.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_EXPIRES_IN: i64 = 7200;
const REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Access tokens keyed by credential pair.
pub struct AccessTokenCache {
    entries: Mutex<HashMap<(String, String), CachedToken>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AccessTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl AccessTokenCache {
    /// Empty cache reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Cached token for the pair, unless it expires within the refresh margin.
    #[must_use]
    pub fn fresh(&self, app_id: &str, app_secret: &str) -> Option<String> {
        let cutoff = self.clock.now() + chrono::Duration::seconds(REFRESH_MARGIN_SECS);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(app_id.to_string(), app_secret.to_string()))
            .filter(|cached| cached.expires_at > cutoff)
            .map(|cached| cached.token.clone())
    }

    /// Remember `token`, valid for `expires_in` seconds from now.
    pub fn store(&self, app_id: &str, app_secret: &str, token: String, expires_in: i64) {
        let expires_at = self.clock.now() + chrono::Duration::seconds(expires_in);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (app_id.to_string(), app_secret.to_string()),
                CachedToken { token, expires_at },
            );
    }

    /// Number of cached credential pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sends text messages through the customer-service API.
#[derive(Clone)]
pub struct CustomMessageSender {
    client: Client,
    api_base: String,
    app_id: String,
    app_secret: String,
    tokens: Arc<AccessTokenCache>,
}

impl std::fmt::Debug for CustomMessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomMessageSender")
            .field("api_base", &self.api_base)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl CustomMessageSender {
    /// Sender for one official account against the production API.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        tokens: Arc<AccessTokenCache>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: WECHAT_API_BASE.to_string(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            tokens,
        }
    }

    /// Point at a different API root.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Cached token, or a freshly fetched one.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Token`] if the platform does not issue a token.
    pub async fn access_token(&self) -> Result<String, PushError> {
        if let Some(token) = self.tokens.fresh(&self.app_id, &self.app_secret) {
            return Ok(token);
        }

        tracing::info!(app_id = %self.app_id, "Fetching access token");
        let response = self
            .client
            .get(format!("{}/cgi-bin/token", self.api_base))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.app_id.as_str()),
                ("secret", self.app_secret.as_str()),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| PushError::Token(e.to_string()))?
            .json::<TokenResponse>()
            .await
            .map_err(|e| PushError::Token(e.to_string()))?;

        let Some(token) = response.access_token.filter(|t| !t.is_empty()) else {
            return Err(PushError::Token(format!(
                "errcode {}: {}",
                response.errcode.unwrap_or_default(),
                response.errmsg.unwrap_or_default()
            )));
        };

        self.tokens.store(
            &self.app_id,
            &self.app_secret,
            token.clone(),
            response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
        );
        Ok(token)
    }
}

#[async_trait]
impl PushSender for CustomMessageSender {
    async fn send_text(&self, open_id: &str, content: &str) -> Result<(), PushError> {
        let token = self.access_token().await?;

        let status = self
            .client
            .post(format!("{}/cgi-bin/message/custom/send", self.api_base))
            .query(&[("access_token", token.as_str())])
            .json(&CustomTextMessage::new(open_id, content))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| PushError::RequestFailed(e.to_string()))?
            .json::<PlatformStatus>()
            .await
            .map_err(|e| PushError::RequestFailed(e.to_string()))?;

        if status.errcode != 0 {
            return Err(PushError::Platform {
                code: status.errcode,
                message: status.errmsg,
            });
        }

        tracing::info!(open_id = %open_id, "Customer-service message sent");
        Ok(())
    }
}
