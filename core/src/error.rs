//! Error types for the bridge core.

use thiserror::Error;

/// Errors raised while reading an inbound message body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The body is empty
    #[error("message body is empty")]
    Empty,

    /// A required element is missing
    #[error("missing required element <{0}>")]
    MissingElement(&'static str),

    /// An element that must be numeric is not
    #[error("element <{element}> is not a number: {value}")]
    InvalidNumber {
        /// Element name
        element: &'static str,
        /// Raw value
        value: String,
    },
}

/// Errors raised by signature checks and the AES envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Required crypto configuration is absent
    #[error("crypto configuration missing: {0}")]
    MissingConfig(&'static str),

    /// The `EncodingAESKey` does not decode to a 32-byte key
    #[error("invalid EncodingAESKey: {0}")]
    InvalidKey(String),

    /// `msg_signature` did not match the computed signature
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The request carried no `Encrypt` field
    #[error("encrypted payload missing Encrypt field")]
    MissingCiphertext,

    /// Base64 decoding failed
    #[error("ciphertext is not valid base64: {0}")]
    Base64(String),

    /// Block decryption or padding failed
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Block encryption failed
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Decrypted frame is malformed
    #[error("malformed plaintext frame: {0}")]
    Frame(String),

    /// Trailing app id does not match the configured one
    #[error("app id mismatch")]
    AppIdMismatch,
}

/// Errors from the conversational backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// HTTP request failed
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Response parsing failed
    #[error("response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Backend rejected the credentials
    #[error("unauthorized - invalid API key")]
    Unauthorized,

    /// Backend is rate limiting
    #[error("rate limited - too many requests")]
    RateLimited,

    /// Backend returned an error status
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error body
        message: String,
    },

    /// Stream broke mid-way
    #[error("stream failed: {0}")]
    StreamFailed(String),
}

/// Errors from conversation storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backing store failed
    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Errors surfaced by a message handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The backend call failed
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Conversation storage failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// Errors from the customer-service push channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushError {
    /// Credentials are not configured
    #[error("app_id or app_secret not configured")]
    MissingCredentials,

    /// Access token could not be obtained
    #[error("access token request failed: {0}")]
    Token(String),

    /// Transport failure
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Platform returned a non-zero `errcode`
    #[error("platform error {code}: {message}")]
    Platform {
        /// `errcode`
        code: i64,
        /// `errmsg`
        message: String,
    },
}
