//! # Key Handlers
//!
//! A key handler owns the local identity's RSA keypair. It hands out the
//! public half as SPKI PEM and unwraps key material that was wrapped for it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        KEY HANDLER LIFECYCLE                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  EphemeralKeyHandler                                                    │
//! │                                                                         │
//! │    new() ──► [empty cell] ──first public_key()/unwrap_key()──►         │
//! │              spawn_blocking(RsaKeyPair::generate) ──► [cached pair]    │
//! │                                                                         │
//! │    Concurrent first callers wait on the same initialization.           │
//! │    A failed generation leaves the cell empty; the next call retries.   │
//! │                                                                         │
//! │  PemKeyHandler                                                          │
//! │                                                                         │
//! │    PKCS#8 PEM (string or file) ──► RsaKeyPair, ready immediately       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use zeroize::Zeroizing;

use super::keys::RsaKeyPair;
use crate::config::DEFAULT_RSA_KEY_BITS;
use crate::error::{Error, Result};

/// Owner of an RSA keypair
#[async_trait]
pub trait KeyHandler: Send + Sync {
    /// The public key as SPKI PEM (`-----BEGIN PUBLIC KEY-----`)
    async fn public_key(&self) -> Result<String>;

    /// RSA-OAEP/SHA-256 decrypt key material wrapped for this handler.
    ///
    /// Fails with [`Error::KeyUnwrap`] when the input does not belong to the
    /// held key.
    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

// ============================================================================
// EPHEMERAL HANDLER
// ============================================================================

/// Generates its keypair on first use and keeps it in memory for its lifetime
///
/// The keypair is never persisted or exported.
#[derive(Debug)]
pub struct EphemeralKeyHandler {
    bits: usize,
    pair: OnceCell<RsaKeyPair>,
}

impl EphemeralKeyHandler {
    /// Handler with the default 4096-bit modulus
    pub fn new() -> Self {
        Self::with_key_bits(DEFAULT_RSA_KEY_BITS)
    }

    /// Handler generating a keypair of the given modulus size
    pub fn with_key_bits(bits: usize) -> Self {
        Self {
            bits,
            pair: OnceCell::new(),
        }
    }

    /// Modulus size of the (future) keypair
    pub fn key_bits(&self) -> usize {
        self.bits
    }

    /// Whether the keypair has been generated yet
    pub fn is_initialized(&self) -> bool {
        self.pair.initialized()
    }

    async fn pair(&self) -> Result<&RsaKeyPair> {
        self.pair
            .get_or_try_init(|| async {
                let bits = self.bits;
                tracing::info!("Generating ephemeral {}-bit RSA keypair", bits);

                let pair = tokio::task::spawn_blocking(move || RsaKeyPair::generate(bits))
                    .await
                    .map_err(|e| Error::Internal(format!("key generation task failed: {}", e)))??;

                tracing::info!("Ephemeral keypair ready");
                Ok(pair)
            })
            .await
    }
}

impl Default for EphemeralKeyHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyHandler for EphemeralKeyHandler {
    async fn public_key(&self) -> Result<String> {
        Ok(self.pair().await?.public_pem().to_string())
    }

    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.pair().await?.unwrap_key(wrapped)
    }
}

// ============================================================================
// PEM HANDLER
// ============================================================================

/// Wraps a private key supplied by the embedding application
#[derive(Debug, Clone)]
pub struct PemKeyHandler {
    pair: Arc<RsaKeyPair>,
}

impl PemKeyHandler {
    /// Load from a PKCS#8 PEM string
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        Ok(Self::from_keypair(RsaKeyPair::from_pkcs8_pem(pem)?))
    }

    /// Load from a PKCS#8 PEM file
    pub async fn from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = Zeroizing::new(tokio::fs::read_to_string(path).await?);
        let handler = Self::from_pkcs8_pem(&pem)?;
        tracing::info!("Loaded private key from {}", path.display());
        Ok(handler)
    }

    /// Use an existing keypair
    pub fn from_keypair(pair: RsaKeyPair) -> Self {
        Self {
            pair: Arc::new(pair),
        }
    }

    /// Share an existing keypair with other handlers
    pub fn from_shared(pair: Arc<RsaKeyPair>) -> Self {
        Self { pair }
    }
}

#[async_trait]
impl KeyHandler for PemKeyHandler {
    async fn public_key(&self) -> Result<String> {
        Ok(self.pair.public_pem().to_string())
    }

    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.pair.unwrap_key(wrapped)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::RecipientKey;
    use crate::test_support::shared_pair;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::RsaPrivateKey;
    use std::io::Write;

    #[tokio::test]
    async fn test_ephemeral_is_lazy() {
        let handler = EphemeralKeyHandler::with_key_bits(2048);
        assert!(!handler.is_initialized());
        assert_eq!(handler.key_bits(), 2048);

        let pem = handler.public_key().await.unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(handler.is_initialized());

        // Cached for the handler's lifetime
        assert_eq!(handler.public_key().await.unwrap(), pem);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ephemeral_single_keypair_under_concurrency() {
        let handler = Arc::new(EphemeralKeyHandler::with_key_bits(2048));

        let tasks = (0..8).map(|_| {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler.public_key().await.unwrap() })
        });
        let pems: Vec<String> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert!(pems.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_ephemeral_unwrap_before_public_key() {
        let handler = EphemeralKeyHandler::with_key_bits(2048);
        // Not wrapped for this handler, but it still triggers generation
        let err = handler.unwrap_key(&[0u8; 256]).await.unwrap_err();
        assert!(matches!(err, Error::KeyUnwrap));
        assert!(handler.is_initialized());
    }

    #[tokio::test]
    async fn test_ephemeral_round_trip() {
        let handler = EphemeralKeyHandler::with_key_bits(2048);
        let recipient = RecipientKey::from_pem(&handler.public_key().await.unwrap()).unwrap();
        let wrapped = recipient.wrap(b"0123456789ab").unwrap();

        let raw = handler.unwrap_key(&wrapped).await.unwrap();
        assert_eq!(raw.as_slice(), b"0123456789ab");
    }

    #[tokio::test]
    async fn test_pem_handler_from_file() {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let pem = private.to_pkcs8_pem(LineEnding::LF).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(pem.as_bytes()).unwrap();

        let handler = PemKeyHandler::from_pem_file(file.path()).await.unwrap();
        let recipient = RecipientKey::from_pem(&handler.public_key().await.unwrap()).unwrap();
        let wrapped = recipient.wrap(b"file key").unwrap();
        assert_eq!(handler.unwrap_key(&wrapped).await.unwrap().as_slice(), b"file key");
    }

    #[tokio::test]
    async fn test_pem_handler_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = PemKeyHandler::from_pem_file(dir.path().join("absent.pem")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_pem_handler_rejects_public_key() {
        let result = PemKeyHandler::from_pkcs8_pem(shared_pair().public_pem());
        assert!(matches!(result, Err(Error::InvalidPrivateKey(_))));
    }

    #[tokio::test]
    async fn test_shared_handlers_agree() {
        let a = PemKeyHandler::from_shared(shared_pair());
        let b = a.clone();
        assert_eq!(a.public_key().await.unwrap(), b.public_key().await.unwrap());
    }
}
