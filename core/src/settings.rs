//! Per-endpoint settings.

use serde::{Deserialize, Serialize};

/// Transitional reply sent once the platform's retry budget is spent.
pub const DEFAULT_TEMP_RESPONSE: &str = "内容生成耗时较长，请稍等...";

/// Credentials and reply texts for one official account.
///
/// Blank strings are treated the same as absent values by every accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// Server token configured on the platform console
    pub wechat_token: Option<String>,
    /// `EncodingAESKey`; absent means plaintext mode
    pub encoding_aes_key: Option<String>,
    /// Official account app id
    pub app_id: Option<String>,
    /// Official account app secret, needed for push messages
    pub app_secret: Option<String>,
    /// Chat backend application id
    pub chat_app_id: Option<String>,
    /// Transitional reply text
    pub temp_response: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            wechat_token: None,
            encoding_aes_key: None,
            app_id: None,
            app_secret: None,
            chat_app_id: None,
            temp_response: DEFAULT_TEMP_RESPONSE.to_string(),
        }
    }
}

impl EndpointSettings {
    /// Server token, if configured.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        non_blank(self.wechat_token.as_ref())
    }

    /// `EncodingAESKey`, if configured.
    #[must_use]
    pub fn aes_key(&self) -> Option<&str> {
        non_blank(self.encoding_aes_key.as_ref())
    }

    /// Official account app id, if configured.
    #[must_use]
    pub fn account_app_id(&self) -> Option<&str> {
        non_blank(self.app_id.as_ref())
    }

    /// `(app_id, app_secret)` when both are configured.
    #[must_use]
    pub fn push_credentials(&self) -> Option<(&str, &str)> {
        Some((
            non_blank(self.app_id.as_ref())?,
            non_blank(self.app_secret.as_ref())?,
        ))
    }

    /// Chat backend application id, if configured.
    #[must_use]
    pub fn chat_app(&self) -> Option<&str> {
        non_blank(self.chat_app_id.as_ref())
    }

    /// Whether inbound traffic may be AES-encrypted.
    #[must_use]
    pub fn is_encrypted_mode(&self) -> bool {
        self.aes_key().is_some()
    }

    /// Transitional reply, falling back to the default when blank.
    #[must_use]
    pub fn temp_response(&self) -> &str {
        if self.temp_response.trim().is_empty() {
            DEFAULT_TEMP_RESPONSE
        } else {
            &self.temp_response
        }
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_count_as_missing() {
        let settings = EndpointSettings {
            wechat_token: Some("  ".into()),
            app_id: Some("wx1".into()),
            app_secret: Some(String::new()),
            temp_response: String::new(),
            ..EndpointSettings::default()
        };
        assert_eq!(settings.token(), None);
        assert_eq!(settings.push_credentials(), None);
        assert!(!settings.is_encrypted_mode());
        assert_eq!(settings.temp_response(), DEFAULT_TEMP_RESPONSE);
    }

    #[test]
    fn push_credentials_need_both_halves() {
        let settings = EndpointSettings {
            app_id: Some("wx1".into()),
            app_secret: Some("secret".into()),
            ..EndpointSettings::default()
        };
        assert_eq!(settings.push_credentials(), Some(("wx1", "secret")));
    }
}
