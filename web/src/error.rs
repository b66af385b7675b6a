//! Error types for web handlers.
//!
//! The platform shows nothing of these bodies to end users; they are plain
//! text for whoever is reading the webhook logs on the console side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use wechat_bridge_core::CryptoError;

/// Failures that end a webhook request with a non-200 status.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// No server token configured
    #[error("微信Token未配置")]
    TokenNotConfigured,

    /// Crypto settings incomplete or invalid
    #[error("配置错误")]
    Configuration(#[source] CryptoError),

    /// URL verification signature or echo did not check out
    #[error("验证失败")]
    VerificationFailed,

    /// Inbound envelope failed verification or decryption
    #[error("解密失败")]
    Decryption(#[source] CryptoError),
}

impl EndpointError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::TokenNotConfigured | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::VerificationFailed => StatusCode::FORBIDDEN,
            Self::Decryption(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        let status = self.status();
        let cause = std::error::Error::source(&self).map(ToString::to_string);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, cause = ?cause, "Endpoint misconfigured");
        } else {
            tracing::warn!(status = %status, error = %self, cause = ?cause, "Request rejected");
        }

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            EndpointError::TokenNotConfigured.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            EndpointError::Configuration(CryptoError::MissingConfig("app_id")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(EndpointError::VerificationFailed.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            EndpointError::Decryption(CryptoError::SignatureMismatch).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn bodies_are_plain_text() {
        assert_eq!(EndpointError::Decryption(CryptoError::SignatureMismatch).to_string(), "解密失败");
        assert_eq!(EndpointError::TokenNotConfigured.to_string(), "微信Token未配置");
    }
}
