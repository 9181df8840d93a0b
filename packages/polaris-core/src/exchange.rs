//! # Response Key Exchange
//!
//! Lets a requester pre-establish the key its reply will be encrypted with,
//! so the responder does not need the requester's public key.
//!
//! ```text
//! Requester                                         Responder
//! ─────────                                         ─────────
//! offer_response_key(responder_pem)
//!   PresetKey K  ──wrap(K.key), wrap(K.nonce)──►
//!   keeps K as a PresetOpener      header value     accept_response_key()
//!                                                     unwrap ──► K
//!                                                   ReplyPlan::resolve()
//!                                  ◄── reply ──────   sealed under K
//!                                                     (or a full envelope for
//!                                                      the requester's key
//!                                                      when nothing was offered)
//! ```
//!
//! The wrapped pair travels as out-of-band metadata next to the request,
//! hex-encoded so it survives as a header value.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::{PresetKey, PresetSealer, RecipientKey};
use crate::error::{Error, Result};
use crate::stream::SealMode;
use crate::PolarisSdk;

/// A preset key wrapped under the responder's public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedPresetKey {
    /// RSA-OAEP wrapped AES key
    pub wrapped_key: Vec<u8>,
    /// RSA-OAEP wrapped base nonce
    pub wrapped_nonce: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeaderValue {
    wrapped_key: String,
    wrapped_nonce: String,
}

impl WrappedPresetKey {
    /// Encode for transport as a header value: hex of
    /// `{"wrappedKey": b64, "wrappedNonce": b64}`
    pub fn to_header_value(&self) -> Result<String> {
        let json = serde_json::to_vec(&HeaderValue {
            wrapped_key: BASE64.encode(&self.wrapped_key),
            wrapped_nonce: BASE64.encode(&self.wrapped_nonce),
        })?;
        Ok(hex::encode(json))
    }

    /// Decode a value produced by [`to_header_value`](Self::to_header_value)
    pub fn from_header_value(value: &str) -> Result<Self> {
        let json = hex::decode(value.trim())
            .map_err(|e| Error::Format(format!("response key is not valid hex: {}", e)))?;
        let header: HeaderValue = serde_json::from_slice(&json)
            .map_err(|e| Error::Format(format!("invalid response key: {}", e)))?;

        let decode = |name: &str, field: &str| {
            BASE64
                .decode(field)
                .map_err(|e| Error::Format(format!("{} is not valid base64: {}", name, e)))
        };

        Ok(Self {
            wrapped_key: decode("wrappedKey", &header.wrapped_key)?,
            wrapped_nonce: decode("wrappedNonce", &header.wrapped_nonce)?,
        })
    }
}

impl PolarisSdk {
    /// Create a preset key for the reply and wrap it for the responder.
    ///
    /// Keep the returned [`PresetKey`] and turn it into an opener for the
    /// reply; send the [`WrappedPresetKey`] along with the request.
    pub async fn offer_response_key(
        &self,
        responder_pem: &str,
    ) -> Result<(PresetKey, WrappedPresetKey)> {
        let recipient = RecipientKey::from_pem(responder_pem)?;
        let key = self.create_random_aes_key();

        let provider = self.provider();
        let (wrapped_key, wrapped_nonce) = futures::try_join!(
            provider.wrap_key_for(key.material().key_bytes(), &recipient),
            provider.wrap_key_for(key.material().nonce_bytes(), &recipient),
        )?;

        tracing::debug!("Offered response key");
        Ok((
            key,
            WrappedPresetKey {
                wrapped_key,
                wrapped_nonce,
            },
        ))
    }

    /// Unwrap a response key offered by a requester
    pub async fn accept_response_key(&self, offered: &WrappedPresetKey) -> Result<PresetKey> {
        let (key, nonce) = futures::try_join!(
            self.unwrap_key(&offered.wrapped_key),
            self.unwrap_key(&offered.wrapped_nonce),
        )?;
        PresetKey::from_parts(&key, &nonce)
    }
}

/// How a reply will be encrypted
#[derive(Debug)]
pub enum ReplyPlan {
    /// Under the preset key the requester offered
    Preset(PresetSealer),
    /// As full envelopes for the requester's public key
    Envelope(RecipientKey),
}

impl ReplyPlan {
    /// Prefer the offered preset key, fall back to the requester's public key.
    ///
    /// Fails with [`Error::MissingReplyKey`] when neither is available.
    pub async fn resolve(
        sdk: &PolarisSdk,
        offered: Option<&WrappedPresetKey>,
        requester_pem: Option<&str>,
    ) -> Result<Self> {
        match (offered, requester_pem) {
            (Some(offered), _) => {
                let key = sdk.accept_response_key(offered).await?;
                Ok(ReplyPlan::Preset(key.into_sealer()))
            }
            (None, Some(pem)) => Ok(ReplyPlan::Envelope(RecipientKey::from_pem(pem)?)),
            (None, None) => Err(Error::MissingReplyKey),
        }
    }

    /// The stream mode that carries out this plan
    pub fn into_seal_mode(self) -> SealMode {
        match self {
            ReplyPlan::Preset(sealer) => SealMode::Preset(sealer),
            ReplyPlan::Envelope(recipient) => SealMode::Envelope(recipient),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
