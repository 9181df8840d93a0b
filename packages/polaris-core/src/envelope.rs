//! # Envelope Codec
//!
//! Builds and parses the self-contained wire envelope: wrapped key material
//! plus AES-256-GCM ciphertext.
//!
//! ## Wire Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ENVELOPE LAYOUT                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  offset 0..4     u32 big-endian header length L                        │
//! │  offset 4..4+L   UTF-8 JSON header                                      │
//! │                  {                                                      │
//! │                    "wrappedKey":   base64(RSA-OAEP(key)),              │
//! │                    "wrappedNonce": base64(RSA-OAEP(nonce)),            │
//! │                    "authTag":      base64(16-byte GCM tag)             │
//! │                  }                                                      │
//! │  offset 4+L..    AES-256-GCM ciphertext (tag excluded)                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every envelope carries its own key, so envelopes can be decrypted in any
//! order and on any number of tasks at once.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::{
    CryptoProvider, KeyHandler, RecipientKey, SymmetricCipherResult, SymmetricKey, TAG_SIZE,
};
use crate::error::{Error, Result};

/// Size of the header length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// JSON header of an envelope (all fields standard base64)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeHeader {
    /// RSA-OAEP wrapped AES key
    pub wrapped_key: String,
    /// RSA-OAEP wrapped GCM nonce
    pub wrapped_nonce: String,
    /// GCM authentication tag
    pub auth_tag: String,
}

/// A parsed envelope borrowing its ciphertext from the input buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Decoded header
    pub header: EnvelopeHeader,
    /// Everything after the header
    pub ciphertext: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Split a wire message into header and ciphertext.
    ///
    /// Only the framing is checked here; nothing is decrypted.
    pub fn parse(message: &'a [u8], max_header_len: usize) -> Result<Self> {
        if message.len() < LENGTH_PREFIX_SIZE {
            return Err(Error::Format(format!(
                "message is {} bytes, too short for the length prefix",
                message.len()
            )));
        }

        let (prefix, rest) = message.split_at(LENGTH_PREFIX_SIZE);
        let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
        len_buf.copy_from_slice(prefix);
        let header_len = u32::from_be_bytes(len_buf) as usize;

        if header_len > max_header_len {
            return Err(Error::Format(format!(
                "declared header length {} exceeds the maximum of {}",
                header_len, max_header_len
            )));
        }
        if header_len > rest.len() {
            return Err(Error::Format(format!(
                "declared header length {} exceeds the {} bytes available",
                header_len,
                rest.len()
            )));
        }

        let (header_bytes, ciphertext) = rest.split_at(header_len);
        let header: EnvelopeHeader = serde_json::from_slice(header_bytes)
            .map_err(|e| Error::Format(format!("invalid header: {}", e)))?;

        Ok(Self { header, ciphertext })
    }

    /// Serialize to the wire format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = serde_json::to_vec(&self.header)?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| Error::Internal("envelope header exceeds u32::MAX".into()))?;

        let mut out =
            Vec::with_capacity(LENGTH_PREFIX_SIZE + header.len() + self.ciphertext.len());
        out.extend_from_slice(&header_len.to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(self.ciphertext);
        Ok(out)
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| Error::Format(format!("{} is not valid base64: {}", name, e)))
}

// ============================================================================
// CODEC
// ============================================================================

/// Encrypts payloads for a recipient and decrypts payloads sent to the local
/// key handler
#[derive(Clone)]
pub struct EnvelopeCodec {
    provider: CryptoProvider,
    key_handler: Arc<dyn KeyHandler>,
    max_header_len: usize,
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("provider", &self.provider)
            .field("max_header_len", &self.max_header_len)
            .finish_non_exhaustive()
    }
}

impl EnvelopeCodec {
    /// Create a codec
    pub fn new(
        provider: CryptoProvider,
        key_handler: Arc<dyn KeyHandler>,
        max_header_len: usize,
    ) -> Self {
        Self {
            provider,
            key_handler,
            max_header_len,
        }
    }

    /// Encrypt `plaintext` for the holder of `recipient_pem`
    pub async fn encrypt(&self, plaintext: &[u8], recipient_pem: &str) -> Result<Vec<u8>> {
        let recipient = RecipientKey::from_pem(recipient_pem)?;
        self.encrypt_for(plaintext, &recipient).await
    }

    /// Encrypt `plaintext` for an already parsed recipient key
    pub async fn encrypt_for(&self, plaintext: &[u8], recipient: &RecipientKey) -> Result<Vec<u8>> {
        let result = self.provider.encrypt_with_random_key(plaintext).await?;

        let (wrapped_key, wrapped_nonce) = futures::try_join!(
            self.provider.wrap_key_for(result.key.key_bytes(), recipient),
            self.provider.wrap_key_for(result.key.nonce_bytes(), recipient),
        )?;

        let envelope = Envelope {
            header: EnvelopeHeader {
                wrapped_key: BASE64.encode(wrapped_key),
                wrapped_nonce: BASE64.encode(wrapped_nonce),
                auth_tag: BASE64.encode(result.auth_tag),
            },
            ciphertext: &result.ciphertext,
        };
        envelope.to_bytes()
    }

    /// Decrypt an envelope addressed to the local key handler
    pub async fn decrypt(&self, message: &[u8]) -> Result<Vec<u8>> {
        let envelope = Envelope::parse(message, self.max_header_len)?;
        let wrapped_key = decode_field("wrappedKey", &envelope.header.wrapped_key)?;
        let wrapped_nonce = decode_field("wrappedNonce", &envelope.header.wrapped_nonce)?;

        let auth_tag: [u8; TAG_SIZE] = BASE64
            .decode(&envelope.header.auth_tag)
            .ok()
            .and_then(|tag| tag.try_into().ok())
            .ok_or(Error::Authentication)?;

        let (key, nonce) = futures::try_join!(
            self.key_handler.unwrap_key(&wrapped_key),
            self.key_handler.unwrap_key(&wrapped_nonce),
        )?;

        let key = SymmetricKey::from_slices(&key, &nonce).map_err(|_| Error::Authentication)?;

        self.provider
            .decrypt_data(SymmetricCipherResult {
                ciphertext: envelope.ciphertext.to_vec(),
                auth_tag,
                key,
            })
            .await
    }
}

// ============================================================================
// TESTS
// ============================================================================
