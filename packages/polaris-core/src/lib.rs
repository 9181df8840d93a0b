//! # Polaris Core
//!
//! End-to-end confidentiality and integrity for byte payloads exchanged with a
//! trusted recipient ("container") whose RSA public key is known, using
//! per-message hybrid encryption.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          POLARIS CORE                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                        PolarisSdk (facade)                         │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │          │                    │                      │                  │
//! │          ▼                    ▼                      ▼                  │
//! │  ┌───────────────┐   ┌─────────────────┐   ┌──────────────────────┐   │
//! │  │ EnvelopeCodec │◄──│ stream pipeline │   │ response key exchange│   │
//! │  └───────────────┘   └─────────────────┘   └──────────────────────┘   │
//! │          │                    │                      │                  │
//! │          ▼                    ▼                      ▼                  │
//! │  ┌──────────────────────────────┐   ┌──────────────────────────────┐   │
//! │  │ CryptoProvider               │   │ KeyHandler                    │   │
//! │  │ RSA-OAEP wrap, AES-256-GCM   │   │ local RSA keypair, unwrap     │   │
//! │  └──────────────────────────────┘   └──────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error type and codes
//! - [`config`] - SDK configuration
//! - [`crypto`] - Key material, primitives and key handlers
//! - [`envelope`] - The self-contained wire envelope
//! - [`stream`] - Chunk-by-chunk sealing and opening
//! - [`framing`] - Length-prefixed frames for byte transports
//! - [`exchange`] - Pre-established reply keys
//!
//! ## Example
//!
//! ```ignore
//! use polaris_core::{PolarisSdk, SdkConfig};
//!
//! let sdk = PolarisSdk::ephemeral(SdkConfig::default())?;
//! let message = sdk.encrypt(b"hello", &container_pem).await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod exchange;
pub mod framing;
pub mod stream;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::SdkConfig;
pub use crypto::{KeyHandler, PresetKey, PresetOpener, PresetSealer, ProviderKind, RecipientKey};
pub use error::{Error, Result};
pub use exchange::{ReplyPlan, WrappedPresetKey};
pub use stream::{OpenMode, SealMode};

// ============================================================================
// SDK INSTANCE
// ============================================================================

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use futures::io::{AsyncRead, AsyncWrite};
use futures::Stream;
use zeroize::Zeroizing;

use crypto::{CryptoProvider, EphemeralKeyHandler};
use envelope::EnvelopeCodec;

/// The capability surface used by transport-layer integrations
///
/// Cheap to clone; clones share the key handler.
#[derive(Clone)]
pub struct PolarisSdk {
    inner: Arc<SdkInner>,
}

struct SdkInner {
    config: SdkConfig,
    provider: CryptoProvider,
    envelope: EnvelopeCodec,
    key_handler: Arc<dyn KeyHandler>,
}

impl std::fmt::Debug for PolarisSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolarisSdk")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl PolarisSdk {
    /// Create an SDK around an existing key handler
    pub fn new(key_handler: Arc<dyn KeyHandler>, config: SdkConfig) -> Result<Self> {
        config.validate()?;

        let provider = CryptoProvider::new(config.provider);
        let envelope = EnvelopeCodec::new(provider, key_handler.clone(), config.max_header_len);

        tracing::info!(
            "Polaris Core v{} ready ({:?} provider)",
            env!("CARGO_PKG_VERSION"),
            config.provider
        );

        Ok(Self {
            inner: Arc::new(SdkInner {
                config,
                provider,
                envelope,
                key_handler,
            }),
        })
    }

    /// Create an SDK with an in-memory keypair generated on first use
    pub fn ephemeral(config: SdkConfig) -> Result<Self> {
        let handler = EphemeralKeyHandler::with_key_bits(config.rsa_key_bits);
        Self::new(Arc::new(handler), config)
    }

    /// Active configuration
    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    /// The crypto provider
    pub fn provider(&self) -> &CryptoProvider {
        &self.inner.provider
    }

    /// The envelope codec
    pub fn envelope(&self) -> &EnvelopeCodec {
        &self.inner.envelope
    }

    /// The local key handler
    pub fn key_handler(&self) -> &Arc<dyn KeyHandler> {
        &self.inner.key_handler
    }

    // ------------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------------

    /// The local public key as SPKI PEM
    pub async fn public_key(&self) -> Result<String> {
        self.inner.key_handler.public_key().await
    }

    /// Wrap key material for the holder of `public_key_pem`
    pub async fn wrap_key(&self, raw: &[u8], public_key_pem: &str) -> Result<Vec<u8>> {
        self.inner.provider.wrap_key(raw, public_key_pem).await
    }

    /// Unwrap key material wrapped for the local key handler
    pub async fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.inner.key_handler.unwrap_key(wrapped).await
    }

    /// Create a key meant for reuse across several messages
    pub fn create_random_aes_key(&self) -> PresetKey {
        self.inner.provider.create_random_aes_key()
    }

    // ------------------------------------------------------------------------
    // Envelopes
    // ------------------------------------------------------------------------

    /// Encrypt `data` into an envelope for the holder of `public_key_pem`
    pub async fn encrypt(&self, data: &[u8], public_key_pem: &str) -> Result<Vec<u8>> {
        self.inner.envelope.encrypt(data, public_key_pem).await
    }

    /// Encrypt `data` into an envelope for a parsed recipient key
    pub async fn encrypt_for(&self, data: &[u8], recipient: &RecipientKey) -> Result<Vec<u8>> {
        self.inner.envelope.encrypt_for(data, recipient).await
    }

    /// Decrypt an envelope addressed to the local key handler
    pub async fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        self.inner.envelope.decrypt(envelope).await
    }

    // ------------------------------------------------------------------------
    // Preset keys
    // ------------------------------------------------------------------------

    /// Encrypt the sealer's next message. Returns `ciphertext || tag`, with the
    /// sealer's salt in front on its first message.
    pub async fn encrypt_with_preset_key(
        &self,
        data: &[u8],
        sealer: &mut PresetSealer,
    ) -> Result<Vec<u8>> {
        let nonce = sealer.reserve()?;
        let sealed = self
            .inner
            .provider
            .encrypt_with_preset_key(data, sealer.key(), nonce)
            .await?;
        Ok(sealer.frame(&nonce, sealed))
    }

    /// Decrypt the opener's next expected message.
    ///
    /// The opener only advances (and only adopts the salt of a first message)
    /// when the message authenticates.
    pub async fn decrypt_with_preset_key(
        &self,
        buffer: &[u8],
        opener: &mut PresetOpener,
    ) -> Result<Vec<u8>> {
        let pending = opener.prepare(buffer)?;
        let data = self
            .inner
            .provider
            .decrypt_with_preset_key(pending.body, opener.key(), pending.nonce)
            .await?;
        opener.commit(pending);
        Ok(data)
    }

    // ------------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------------

    /// Seal every chunk of `upstream`. See [`stream`].
    pub fn seal_stream<S, B, E>(
        &self,
        mode: SealMode,
        upstream: S,
    ) -> impl Stream<Item = Result<Bytes>>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        stream::seal_stream(self.clone(), mode, upstream)
    }

    /// Open every chunk of `upstream`. See [`stream`].
    pub fn open_stream<S, B, E>(
        &self,
        mode: OpenMode,
        upstream: S,
    ) -> impl Stream<Item = Result<Bytes>>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        stream::open_stream(self.clone(), mode, upstream)
    }

    // ------------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------------

    /// Read length-prefixed frames from `reader`, bounded by the configured
    /// `max_frame_len`. See [`framing`].
    pub fn frames<R>(&self, reader: R) -> impl Stream<Item = Result<Bytes>>
    where
        R: AsyncRead + Unpin,
    {
        framing::frames(reader, self.inner.config.max_frame_len)
    }

    /// Write every chunk as a length-prefixed frame, bounded by the configured
    /// `max_frame_len`. Returns the number of frames written.
    pub async fn write_frames<W, S>(&self, writer: &mut W, chunks: S) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
        S: Stream<Item = Result<Bytes>>,
    {
        framing::write_frames(writer, chunks, self.inner.config.max_frame_len).await
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Polaris Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::crypto::{PemKeyHandler, RsaKeyPair};
    use std::sync::OnceLock;

    /// One 2048-bit keypair shared by the whole test binary
    pub fn shared_pair() -> Arc<RsaKeyPair> {
        static PAIR: OnceLock<Arc<RsaKeyPair>> = OnceLock::new();
        PAIR.get_or_init(|| Arc::new(RsaKeyPair::generate(2048).unwrap()))
            .clone()
    }

    pub fn sdk_with(kind: ProviderKind) -> PolarisSdk {
        let config = SdkConfig {
            provider: kind,
            rsa_key_bits: 2048,
            ..SdkConfig::default()
        };
        PolarisSdk::new(Arc::new(PemKeyHandler::from_shared(shared_pair())), config).unwrap()
    }

    pub fn sdk() -> PolarisSdk {
        sdk_with(ProviderKind::Inline)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{PemKeyHandler, SALT_SIZE};
    use crate::test_support::{sdk, sdk_with, shared_pair};
    use futures::io::Cursor;
    use futures::{stream, TryStreamExt};
    use std::convert::Infallible;
    use tokio_test::assert_ok;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_new_validates_config() {
        let config = SdkConfig {
            rsa_key_bits: 1000,
            ..SdkConfig::default()
        };
        assert!(matches!(
            PolarisSdk::ephemeral(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_facade_round_trip() {
        let sdk = sdk();
        let pem = sdk.public_key().await.unwrap();
        assert_eq!(pem, shared_pair().public_pem());

        let message = assert_ok!(sdk.encrypt(b"Test message", &pem).await);
        assert_eq!(sdk.decrypt(&message).await.unwrap(), b"Test message");
    }

    #[tokio::test]
    async fn test_wrap_and_unwrap_are_standalone() {
        let sdk = sdk_with(ProviderKind::BlockingPool);
        let pem = sdk.public_key().await.unwrap();

        let wrapped = sdk.wrap_key(b"side channel", &pem).await.unwrap();
        assert_eq!(sdk.unwrap_key(&wrapped).await.unwrap().as_slice(), b"side channel");
    }

    #[tokio::test]
    async fn test_preset_key_messages() {
        let sdk = sdk();
        let key = sdk.create_random_aes_key();
        let twin = PresetKey::from_parts(key.material().key_bytes(), key.material().nonce_bytes())
            .unwrap();
        let mut sealer = key.into_sealer();
        let mut opener = twin.into_opener();

        let first = sdk.encrypt_with_preset_key(b"preset message", &mut sealer).await.unwrap();
        let second = sdk.encrypt_with_preset_key(b"preset message", &mut sealer).await.unwrap();
        assert_eq!(first.len(), SALT_SIZE + second.len());
        assert_eq!(&first[..SALT_SIZE], sealer.salt());
        assert_eq!(sealer.next_sequence(), Some(2));

        // Out of order: rejected, and the opener neither advances nor adopts a salt
        let err = sdk.decrypt_with_preset_key(&second, &mut opener).await.unwrap_err();
        assert!(matches!(err, Error::Authentication));
        assert_eq!(opener.next_sequence(), Some(0));
        assert!(opener.salt().is_none());

        assert_eq!(sdk.decrypt_with_preset_key(&first, &mut opener).await.unwrap(), b"preset message");
        assert_eq!(opener.salt(), Some(sealer.salt()));
        assert_eq!(sdk.decrypt_with_preset_key(&second, &mut opener).await.unwrap(), b"preset message");
        assert_eq!(opener.next_sequence(), Some(2));
    }

    #[tokio::test]
    async fn test_ephemeral_sdks_have_distinct_identities() {
        let config = SdkConfig {
            rsa_key_bits: 2048,
            ..SdkConfig::default()
        };
        let a = PolarisSdk::ephemeral(config.clone()).unwrap();
        let b = PolarisSdk::ephemeral(config).unwrap();

        let message = a.encrypt(b"for b", &b.public_key().await.unwrap()).await.unwrap();
        assert_eq!(b.decrypt(&message).await.unwrap(), b"for b");
        assert!(matches!(a.decrypt(&message).await, Err(Error::KeyUnwrap)));
    }

    #[tokio::test]
    async fn test_frames_round_trip_through_facade() {
        let sdk = sdk();
        let recipient = RecipientKey::from_pem(shared_pair().public_pem()).unwrap();
        let chunks = vec![Ok::<_, Infallible>(vec![1u8; 300]), Ok(vec![2u8; 5])];

        let sealed = sdk.seal_stream(SealMode::Envelope(recipient), stream::iter(chunks));
        let mut wire = Cursor::new(Vec::new());
        assert_eq!(sdk.write_frames(&mut wire, sealed).await.unwrap(), 2);

        let framed = sdk.frames(Cursor::new(wire.into_inner()));
        let opened: Vec<Bytes> = sdk
            .open_stream(OpenMode::Envelope, framed)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(opened, vec![Bytes::from(vec![1u8; 300]), Bytes::from(vec![2u8; 5])]);
    }

    #[tokio::test]
    async fn test_frames_respect_configured_limit() {
        let config = SdkConfig {
            rsa_key_bits: 2048,
            max_frame_len: 64,
            ..SdkConfig::default()
        };
        let sdk = PolarisSdk::new(Arc::new(PemKeyHandler::from_shared(shared_pair())), config)
            .unwrap();

        // Writing refuses a chunk over the limit
        let mut wire = Cursor::new(Vec::new());
        let big = stream::iter(vec![Ok(Bytes::from(vec![0u8; 65]))]);
        let err = sdk.write_frames(&mut wire, big).await.unwrap_err();
        assert!(matches!(err, Error::Format(_)));

        // Reading refuses a prefix announcing more than the limit
        let mut data = 65u32.to_be_bytes().to_vec();
        data.extend_from_slice(&[0u8; 65]);
        let result: Result<Vec<Bytes>> = sdk.frames(Cursor::new(data)).try_collect().await;
        assert!(matches!(result, Err(Error::Format(_))));

        // At the limit is fine
        let mut wire = Cursor::new(Vec::new());
        let ok = stream::iter(vec![Ok(Bytes::from(vec![0u8; 64]))]);
        assert_eq!(sdk.write_frames(&mut wire, ok).await.unwrap(), 1);
    }

    #[test]
    fn test_sdk_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<PolarisSdk>();
    }
}
