//! Signature checks and the AES-CBC message envelope.
//!
//! The platform's "safe mode" wraps every payload as
//! `base64(AES-256-CBC(random16 ‖ len_be32 ‖ message ‖ app_id))`, padded
//! PKCS#7-style to 32-byte blocks, with the IV taken from the first 16
//! key bytes. Every envelope is signed with a SHA-1 over the sorted
//! concatenation of token, timestamp, nonce and ciphertext.

use aes::Aes256;
use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::error::CryptoError;
use crate::formatter::cdata;
use crate::parser::element_text;
use crate::settings::EndpointSettings;

const BLOCK_SIZE: usize = 32;
const RANDOM_PREFIX_LEN: usize = 16;

// Console-generated keys are not always canonical base64 in their last symbol.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Query parameters the platform appends to callback URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackQuery {
    /// Plain-mode URL signature
    pub signature: Option<String>,
    /// Request timestamp
    pub timestamp: Option<String>,
    /// Request nonce
    pub nonce: Option<String>,
    /// Verification echo string (GET only)
    pub echostr: Option<String>,
    /// `aes` when the body is encrypted
    pub encrypt_type: Option<String>,
    /// Envelope signature
    pub msg_signature: Option<String>,
    /// Sender open id
    pub openid: Option<String>,
}

impl CallbackQuery {
    fn param(value: Option<&String>) -> &str {
        value.map_or("", String::as_str)
    }

    /// `timestamp`, or empty.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        Self::param(self.timestamp.as_ref())
    }

    /// `nonce`, or empty.
    #[must_use]
    pub fn nonce(&self) -> &str {
        Self::param(self.nonce.as_ref())
    }

    /// `msg_signature`, or empty.
    #[must_use]
    pub fn msg_signature(&self) -> &str {
        Self::param(self.msg_signature.as_ref())
    }

    /// `signature`, or empty.
    #[must_use]
    pub fn signature(&self) -> &str {
        Self::param(self.signature.as_ref())
    }

    /// `echostr`, or empty.
    #[must_use]
    pub fn echostr(&self) -> &str {
        Self::param(self.echostr.as_ref())
    }

    /// Whether the platform declared an AES body.
    #[must_use]
    pub fn is_aes(&self) -> bool {
        self.encrypt_type.as_deref() == Some("aes")
    }
}

/// Wire shape of an encrypted reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeFormat {
    /// `<xml><Encrypt>..</Encrypt>..</xml>`
    Xml,
    /// `{"Encrypt": .., ..}`
    Json,
}

impl EnvelopeFormat {
    /// JSON when the request content type was JSON, XML otherwise.
    #[must_use]
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.contains("application/json") => Self::Json,
            _ => Self::Xml,
        }
    }
}

/// Hex SHA-1 over the lexicographically sorted concatenation of `parts`.
#[must_use]
pub fn sorted_sha1(parts: &mut [&str]) -> String {
    parts.sort_unstable();
    let mut sha = Sha1::new();
    sha.update(parts.concat());
    hex::encode(sha.finalize())
}

/// Plain-mode URL verification: `signature == sha1(sort(token, timestamp, nonce))`.
#[must_use]
pub fn verify_url_signature(token: &str, timestamp: &str, nonce: &str, signature: &str) -> bool {
    sorted_sha1(&mut [token, timestamp, nonce]) == signature
}

/// Envelope codec bound to one account's token, key and app id.
#[derive(Clone)]
pub struct WechatCrypto {
    token: String,
    key: [u8; 32],
    app_id: String,
}

impl std::fmt::Debug for WechatCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatCrypto")
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl WechatCrypto {
    /// Build a codec from the console's `EncodingAESKey`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the key does not base64-decode
    /// (with its missing `=` restored) to exactly 32 bytes.
    pub fn new(
        token: impl Into<String>,
        encoding_aes_key: &str,
        app_id: impl Into<String>,
    ) -> Result<Self, CryptoError> {
        let raw = KEY_ENGINE
            .decode(format!("{}=", encoding_aes_key.trim()))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = raw.try_into().map_err(|raw: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected 32 bytes, got {}", raw.len()))
        })?;

        Ok(Self {
            token: token.into(),
            key,
            app_id: app_id.into(),
        })
    }

    /// Envelope signature over `timestamp`, `nonce` and `encrypt`.
    #[must_use]
    pub fn signature(&self, timestamp: &str, nonce: &str, encrypt: &str) -> String {
        sorted_sha1(&mut [self.token.as_str(), timestamp, nonce, encrypt])
    }

    /// Encrypt and sign a reply.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encrypt`] if the message cannot be framed.
    pub fn encrypt_message(
        &self,
        reply: &str,
        nonce: &str,
        timestamp: &str,
        format: EnvelopeFormat,
    ) -> Result<String, CryptoError> {
        let encrypt = self.encrypt(reply)?;
        let signature = self.signature(timestamp, nonce, &encrypt);

        Ok(match format {
            EnvelopeFormat::Xml => format!(
                "<xml>\n<Encrypt>{}</Encrypt>\n<MsgSignature>{}</MsgSignature>\n<TimeStamp>{}</TimeStamp>\n<Nonce>{}</Nonce>\n</xml>",
                cdata(&encrypt),
                cdata(&signature),
                timestamp,
                cdata(nonce),
            ),
            EnvelopeFormat::Json => serde_json::json!({
                "Encrypt": encrypt,
                "MsgSignature": signature,
                "TimeStamp": timestamp,
                "Nonce": nonce,
            })
            .to_string(),
        })
    }

    /// Verify and decrypt an inbound envelope (XML or JSON).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the ciphertext is missing, the signature
    /// does not match, or the payload fails to decrypt.
    pub fn decrypt_message(
        &self,
        post_data: &str,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<String, CryptoError> {
        let body = post_data.trim_start();
        let encrypt = if body.starts_with('<') {
            element_text(body, "Encrypt")
        } else {
            serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get("Encrypt").and_then(|e| e.as_str()).map(str::to_string))
        }
        .ok_or(CryptoError::MissingCiphertext)?;

        if self.signature(timestamp, nonce, &encrypt) != msg_signature {
            return Err(CryptoError::SignatureMismatch);
        }

        self.decrypt(&encrypt)
    }

    /// Base64 ciphertext for `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encrypt`] if the plaintext is longer than `u32::MAX`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let message = plaintext.as_bytes();
        let length = u32::try_from(message.len())
            .map_err(|_| CryptoError::Encrypt("message too long".to_string()))?;

        let prefix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_PREFIX_LEN)
            .map(char::from)
            .collect();

        let mut frame = Vec::with_capacity(
            RANDOM_PREFIX_LEN + 4 + message.len() + self.app_id.len() + BLOCK_SIZE,
        );
        frame.extend_from_slice(prefix.as_bytes());
        frame.extend_from_slice(&length.to_be_bytes());
        frame.extend_from_slice(message);
        frame.extend_from_slice(self.app_id.as_bytes());
        pad(&mut frame);

        let frame_len = frame.len();
        let ciphertext = cbc::Encryptor::<Aes256>::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?
            .encrypt_padded_mut::<NoPadding>(&mut frame, frame_len)
            .map_err(|_| CryptoError::Encrypt("frame is not block aligned".to_string()))?;

        Ok(STANDARD.encode(ciphertext))
    }

    /// Plaintext message inside a base64 ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] for bad base64, bad padding, a malformed
    /// frame, or a trailing app id that is not ours.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let mut buf = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CryptoError::Base64(e.to_string()))?;

        let plaintext = cbc::Decryptor::<Aes256>::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| CryptoError::Decrypt("ciphertext is not block aligned".to_string()))?;

        let frame = unpad(plaintext)?;
        if frame.len() < RANDOM_PREFIX_LEN + 4 {
            return Err(CryptoError::Frame("payload too short".to_string()));
        }

        let len_bytes = [frame[16], frame[17], frame[18], frame[19]];
        let msg_len = u32::from_be_bytes(len_bytes) as usize;
        let msg_start = RANDOM_PREFIX_LEN + 4;
        let msg_end = msg_start.saturating_add(msg_len);
        if msg_end > frame.len() {
            return Err(CryptoError::Frame("declared length exceeds payload".to_string()));
        }

        let message = std::str::from_utf8(&frame[msg_start..msg_end])
            .map_err(|e| CryptoError::Frame(e.to_string()))?;
        let from_app_id = std::str::from_utf8(&frame[msg_end..])
            .map_err(|e| CryptoError::Frame(e.to_string()))?;
        if from_app_id != self.app_id {
            return Err(CryptoError::AppIdMismatch);
        }

        Ok(message.to_string())
    }
}

// amount is always in 1..=32
#[allow(clippy::cast_possible_truncation)]
fn pad(buf: &mut Vec<u8>) {
    let amount = BLOCK_SIZE - buf.len() % BLOCK_SIZE;
    buf.resize(buf.len() + amount, amount as u8);
}

fn unpad(buf: &[u8]) -> Result<&[u8], CryptoError> {
    let Some(&last) = buf.last() else {
        return Err(CryptoError::Frame("empty payload".to_string()));
    };
    let amount = usize::from(last);
    if amount == 0 || amount > BLOCK_SIZE || amount > buf.len() {
        return Err(CryptoError::Frame("invalid padding".to_string()));
    }
    Ok(&buf[..buf.len() - amount])
}

/// Request-level view of the envelope: decides per request whether to
/// decrypt the body and whether to encrypt the reply.
#[derive(Debug, Clone)]
pub struct MessageCrypto {
    crypto: Option<WechatCrypto>,
}

impl MessageCrypto {
    /// Plaintext mode unless an `EncodingAESKey` is configured.
    ///
    /// # Errors
    ///
    /// In encrypted mode, returns [`CryptoError::MissingConfig`] if the token
    /// or app id is absent, or [`CryptoError::InvalidKey`] for a bad key.
    pub fn from_settings(settings: &EndpointSettings) -> Result<Self, CryptoError> {
        let Some(aes_key) = settings.aes_key() else {
            return Ok(Self { crypto: None });
        };
        let token = settings
            .token()
            .ok_or(CryptoError::MissingConfig("wechat_token"))?;
        let app_id = settings
            .account_app_id()
            .ok_or(CryptoError::MissingConfig("app_id"))?;

        Ok(Self {
            crypto: Some(WechatCrypto::new(token, aes_key, app_id)?),
        })
    }

    /// Whether an AES key is configured.
    #[must_use]
    pub const fn is_encrypted_mode(&self) -> bool {
        self.crypto.is_some()
    }

    /// The underlying codec in encrypted mode.
    #[must_use]
    pub const fn codec(&self) -> Option<&WechatCrypto> {
        self.crypto.as_ref()
    }

    /// Plaintext body of an inbound request.
    ///
    /// Bodies pass through unchanged in plaintext mode, when the request is
    /// not marked as encrypted, or when the signing parameters are incomplete.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if an encrypted body fails verification or decryption.
    pub fn decrypt_request(&self, query: &CallbackQuery, body: &str) -> Result<String, CryptoError> {
        let Some(crypto) = &self.crypto else {
            return Ok(body.to_string());
        };

        if !query.is_aes() && query.msg_signature().is_empty() {
            tracing::debug!("No encrypt_type or msg_signature, treating body as plaintext");
            return Ok(body.to_string());
        }

        let (msg_signature, timestamp, nonce) =
            (query.msg_signature(), query.timestamp(), query.nonce());
        if msg_signature.is_empty() || timestamp.is_empty() || nonce.is_empty() {
            tracing::warn!("Incomplete signing parameters, treating body as plaintext");
            return Ok(body.to_string());
        }

        crypto.decrypt_message(body, msg_signature, timestamp, nonce)
    }

    /// Wire form of a reply: encrypted when the request was, plaintext otherwise.
    ///
    /// An encryption failure is logged and the plaintext reply is returned.
    #[must_use]
    pub fn encrypt_reply(
        &self,
        reply: String,
        query: &CallbackQuery,
        content_type: Option<&str>,
    ) -> String {
        let Some(crypto) = &self.crypto else {
            return reply;
        };
        if !query.is_aes() {
            return reply;
        }

        let (nonce, timestamp) = (query.nonce(), query.timestamp());
        if nonce.is_empty() || timestamp.is_empty() {
            tracing::warn!("Missing nonce or timestamp, replying in plaintext");
            return reply;
        }

        let format = EnvelopeFormat::for_content_type(content_type);
        match crypto.encrypt_message(&reply, nonce, timestamp, format) {
            Ok(encrypted) => encrypted,
            Err(e) => {
                tracing::error!(error = %e, "Reply encryption failed, replying in plaintext");
                reply
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // 43 characters, decodes to 32 bytes once "=" is appended.
    const AES_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";

    fn crypto() -> WechatCrypto {
        WechatCrypto::new("token", AES_KEY, "wx_app").unwrap()
    }

    #[test]
    fn rejects_short_key() {
        assert!(matches!(
            WechatCrypto::new("token", "c2hvcnQ", "wx_app"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn padding_fills_whole_blocks() {
        let mut exact = vec![0u8; 32];
        pad(&mut exact);
        assert_eq!(exact.len(), 64);
        assert_eq!(exact[63], 32);

        let mut partial = vec![0u8; 5];
        pad(&mut partial);
        assert_eq!(partial.len(), 32);
        assert_eq!(unpad(&partial).unwrap().len(), 5);
    }

    #[test]
    fn unpad_rejects_out_of_range_bytes() {
        assert!(unpad(&[1, 2, 0]).is_err());
        assert!(unpad(&[33; 40]).is_err());
        assert!(unpad(&[]).is_err());
    }

    #[test]
    fn envelope_round_trip() {
        let crypto = crypto();
        let reply = crypto
            .encrypt_message("<xml>你好</xml>", "nonce1", "1700000000", EnvelopeFormat::Xml)
            .unwrap();

        let signature = element_text(&reply, "MsgSignature").unwrap();
        assert_eq!(element_text(&reply, "TimeStamp").as_deref(), Some("1700000000"));

        let plain = crypto
            .decrypt_message(&reply, &signature, "1700000000", "nonce1")
            .unwrap();
        assert_eq!(plain, "<xml>你好</xml>");
    }

    #[test]
    fn json_envelope_decrypts() {
        let crypto = crypto();
        let reply = crypto
            .encrypt_message("payload", "n", "1", EnvelopeFormat::Json)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        let signature = value["MsgSignature"].as_str().unwrap();

        assert_eq!(crypto.decrypt_message(&reply, signature, "1", "n").unwrap(), "payload");
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let crypto = crypto();
        let reply = crypto
            .encrypt_message("payload", "n", "1", EnvelopeFormat::Xml)
            .unwrap();
        assert_eq!(
            crypto.decrypt_message(&reply, "deadbeef", "1", "n"),
            Err(CryptoError::SignatureMismatch)
        );
    }

    #[test]
    fn foreign_app_id_is_rejected() {
        let ours = crypto();
        let theirs = WechatCrypto::new("token", AES_KEY, "wx_other").unwrap();
        let ciphertext = theirs.encrypt("payload").unwrap();
        assert_eq!(ours.decrypt(&ciphertext), Err(CryptoError::AppIdMismatch));
    }

    #[test]
    fn url_signature_matches_sorted_sha1() {
        let expected = sorted_sha1(&mut ["token", "1700000000", "nonce"]);
        assert!(verify_url_signature("token", "1700000000", "nonce", &expected));
        assert!(!verify_url_signature("token", "1700000001", "nonce", &expected));
        // Order of the inputs does not matter.
        assert_eq!(expected, sorted_sha1(&mut ["nonce", "token", "1700000000"]));
    }

    fn encrypted_settings() -> EndpointSettings {
        EndpointSettings {
            wechat_token: Some("token".into()),
            encoding_aes_key: Some(AES_KEY.into()),
            app_id: Some("wx_app".into()),
            ..EndpointSettings::default()
        }
    }

    #[test]
    fn adapter_requires_token_and_app_id() {
        let mut settings = encrypted_settings();
        settings.app_id = None;
        assert_eq!(
            MessageCrypto::from_settings(&settings).unwrap_err(),
            CryptoError::MissingConfig("app_id")
        );
        assert!(!MessageCrypto::from_settings(&EndpointSettings::default())
            .unwrap()
            .is_encrypted_mode());
    }

    #[test]
    fn adapter_passes_unmarked_requests_through() {
        let adapter = MessageCrypto::from_settings(&encrypted_settings()).unwrap();
        let query = CallbackQuery::default();
        assert_eq!(adapter.decrypt_request(&query, "<xml/>").unwrap(), "<xml/>");
        assert_eq!(adapter.encrypt_reply("<xml/>".into(), &query, None), "<xml/>");
    }

    #[test]
    fn adapter_round_trips_marked_requests() {
        let adapter = MessageCrypto::from_settings(&encrypted_settings()).unwrap();
        let query = CallbackQuery {
            timestamp: Some("1700000000".into()),
            nonce: Some("abc".into()),
            encrypt_type: Some("aes".into()),
            ..CallbackQuery::default()
        };

        let envelope = adapter.encrypt_reply("<xml>hi</xml>".into(), &query, Some("text/xml"));
        let signature = element_text(&envelope, "MsgSignature").unwrap();
        let inbound = CallbackQuery {
            msg_signature: Some(signature),
            ..query.clone()
        };
        assert_eq!(adapter.decrypt_request(&inbound, &envelope).unwrap(), "<xml>hi</xml>");

        let bad = CallbackQuery {
            msg_signature: Some("bad".into()),
            ..query
        };
        assert!(adapter.decrypt_request(&bad, &envelope).is_err());
    }
}
