//! # Crypto Provider
//!
//! The primitive operations everything else is built from: RSA-OAEP key
//! wrapping and AES-256-GCM encryption.
//!
//! ## Execution Strategy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      PROVIDER KINDS                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ProviderKind::Inline                                                   │
//! │  ─────────────────────                                                  │
//! │  Primitives run on the calling task. Lowest latency, but an RSA        │
//! │  operation briefly occupies the executor thread.                       │
//! │                                                                         │
//! │  ProviderKind::BlockingPool                                             │
//! │  ──────────────────────────                                             │
//! │  Inputs are copied and the primitive runs on tokio's blocking pool.    │
//! │  The calling task only awaits the result.                              │
//! │                                                                         │
//! │  The kind is chosen once, when the provider is constructed.            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Buffer Conventions
//!
//! | Operation | Output |
//! |-----------|--------|
//! | `encrypt_with_random_key` | ciphertext and 16-byte tag kept apart |
//! | `encrypt_with_preset_key` | `ciphertext \|\| tag` |
//!
//! Every decryption failure surfaces as [`Error::Authentication`] regardless
//! of its cause.

use aes_gcm::{
    aead::{Aead, AeadInPlace, KeyInit},
    Aes256Gcm, Nonce as AesNonce, Tag,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::keys::{
    PresetKey, RecipientKey, SequenceNonce, SymmetricKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
use crate::error::{Error, Result};

/// Where a [`CryptoProvider`] runs its primitives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderKind {
    /// On the calling task
    #[default]
    Inline,
    /// On tokio's blocking thread pool
    BlockingPool,
}

/// Output of one random-key encryption
///
/// Never serialized on its own; the envelope codec folds it into a wire
/// envelope.
#[derive(Debug)]
pub struct SymmetricCipherResult {
    /// Ciphertext without the tag
    pub ciphertext: Vec<u8>,
    /// AES-GCM authentication tag
    pub auth_tag: [u8; TAG_SIZE],
    /// Key and nonce the ciphertext was produced with
    pub key: SymmetricKey,
}

/// Platform primitive operations
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoProvider {
    kind: ProviderKind,
}

impl CryptoProvider {
    /// Create a provider of the given kind
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }

    /// The execution strategy chosen at construction
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Wrap key material with RSA-OAEP/SHA-256 under a PEM public key
    pub async fn wrap_key(&self, raw: &[u8], public_key_pem: &str) -> Result<Vec<u8>> {
        let recipient = RecipientKey::from_pem(public_key_pem)?;
        self.wrap_key_for(raw, &recipient).await
    }

    /// Wrap key material under an already parsed public key
    pub async fn wrap_key_for(&self, raw: &[u8], recipient: &RecipientKey) -> Result<Vec<u8>> {
        match self.kind {
            ProviderKind::Inline => recipient.wrap(raw),
            ProviderKind::BlockingPool => {
                let recipient = recipient.clone();
                let raw = Zeroizing::new(raw.to_vec());
                offload(move || recipient.wrap(&raw)).await
            }
        }
    }

    /// Encrypt under a freshly generated key and nonce
    pub async fn encrypt_with_random_key(&self, plaintext: &[u8]) -> Result<SymmetricCipherResult> {
        match self.kind {
            ProviderKind::Inline => seal_detached(SymmetricKey::generate(), plaintext.to_vec()),
            ProviderKind::BlockingPool => {
                let buffer = plaintext.to_vec();
                offload(move || seal_detached(SymmetricKey::generate(), buffer)).await
            }
        }
    }

    /// Decrypt the output of [`encrypt_with_random_key`](Self::encrypt_with_random_key)
    pub async fn decrypt_data(&self, params: SymmetricCipherResult) -> Result<Vec<u8>> {
        match self.kind {
            ProviderKind::Inline => open_detached(params),
            ProviderKind::BlockingPool => offload(move || open_detached(params)).await,
        }
    }

    /// Create a key meant for reuse across several messages
    pub fn create_random_aes_key(&self) -> PresetKey {
        PresetKey::generate()
    }

    /// Encrypt with caller-held key material. Returns `ciphertext || tag`.
    pub async fn encrypt_with_preset_key(
        &self,
        data: &[u8],
        key: &SymmetricKey,
        nonce: SequenceNonce,
    ) -> Result<Vec<u8>> {
        match self.kind {
            ProviderKind::Inline => seal_combined(key.key_bytes(), nonce.as_bytes(), data),
            ProviderKind::BlockingPool => {
                let key = Zeroizing::new(*key.key_bytes());
                let data = data.to_vec();
                offload(move || seal_combined(&key, nonce.as_bytes(), &data)).await
            }
        }
    }

    /// Decrypt a `ciphertext || tag` buffer produced by
    /// [`encrypt_with_preset_key`](Self::encrypt_with_preset_key)
    pub async fn decrypt_with_preset_key(
        &self,
        buffer: &[u8],
        key: &SymmetricKey,
        nonce: SequenceNonce,
    ) -> Result<Vec<u8>> {
        if buffer.len() < TAG_SIZE {
            return Err(Error::UnsupportedInput(format!(
                "preset-key ciphertext is {} bytes, shorter than the {}-byte tag",
                buffer.len(),
                TAG_SIZE
            )));
        }

        match self.kind {
            ProviderKind::Inline => open_combined(key.key_bytes(), nonce.as_bytes(), buffer),
            ProviderKind::BlockingPool => {
                let key = Zeroizing::new(*key.key_bytes());
                let buffer = buffer.to_vec();
                offload(move || open_combined(&key, nonce.as_bytes(), &buffer)).await
            }
        }
    }
}

/// Run a primitive on the blocking pool
async fn offload<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| Error::Internal(format!("crypto worker failed: {}", e)))?
}

// ============================================================================
// AES-256-GCM
// ============================================================================

fn cipher(key: &[u8; KEY_SIZE]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|e| Error::InvalidKeyMaterial(e.to_string()))
}

fn seal_detached(key: SymmetricKey, mut buffer: Vec<u8>) -> Result<SymmetricCipherResult> {
    let tag = cipher(key.key_bytes())?
        .encrypt_in_place_detached(AesNonce::from_slice(key.nonce_bytes()), b"", &mut buffer)
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

    let mut auth_tag = [0u8; TAG_SIZE];
    auth_tag.copy_from_slice(&tag);

    Ok(SymmetricCipherResult {
        ciphertext: buffer,
        auth_tag,
        key,
    })
}

fn open_detached(params: SymmetricCipherResult) -> Result<Vec<u8>> {
    let SymmetricCipherResult {
        mut ciphertext,
        auth_tag,
        key,
    } = params;

    let cipher = cipher(key.key_bytes()).map_err(|_| Error::Authentication)?;
    cipher
        .decrypt_in_place_detached(
            AesNonce::from_slice(key.nonce_bytes()),
            b"",
            &mut ciphertext,
            Tag::from_slice(&auth_tag),
        )
        .map_err(|_| Error::Authentication)?;

    Ok(ciphertext)
}

fn seal_combined(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], data: &[u8]) -> Result<Vec<u8>> {
    cipher(key)?
        .encrypt(AesNonce::from_slice(nonce), data)
        .map_err(|e| Error::EncryptionFailed(e.to_string()))
}

fn open_combined(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], buffer: &[u8]) -> Result<Vec<u8>> {
    cipher(key)
        .map_err(|_| Error::Authentication)?
        .decrypt(AesNonce::from_slice(nonce), buffer)
        .map_err(|_| Error::Authentication)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::RsaKeyPair;
    use crate::test_support::shared_pair;

    fn providers() -> [CryptoProvider; 2] {
        [
            CryptoProvider::new(ProviderKind::Inline),
            CryptoProvider::new(ProviderKind::BlockingPool),
        ]
    }

    #[tokio::test]
    async fn test_random_key_round_trip() {
        for provider in providers() {
            let result = provider.encrypt_with_random_key(b"Hello, World!").await.unwrap();
            assert_eq!(result.ciphertext.len(), 13);
            assert_ne!(result.ciphertext, b"Hello, World!");

            let decrypted = provider.decrypt_data(result).await.unwrap();
            assert_eq!(decrypted, b"Hello, World!");
        }
    }

    #[tokio::test]
    async fn test_random_key_empty_plaintext() {
        let provider = CryptoProvider::default();
        let result = provider.encrypt_with_random_key(b"").await.unwrap();
        assert!(result.ciphertext.is_empty());
        assert!(provider.decrypt_data(result).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_random_keys_are_never_reused() {
        let provider = CryptoProvider::default();
        let a = provider.encrypt_with_random_key(b"same").await.unwrap();
        let b = provider.encrypt_with_random_key(b"same").await.unwrap();

        assert_ne!(a.key.key_bytes(), b.key.key_bytes());
        assert_ne!(a.key.nonce_bytes(), b.key.nonce_bytes());
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails() {
        let provider = CryptoProvider::default();
        let mut result = provider.encrypt_with_random_key(b"Hello, World!").await.unwrap();
        result.ciphertext[0] ^= 0x01;

        let err = provider.decrypt_data(result).await.unwrap_err();
        assert!(matches!(err, Error::Authentication));
    }

    #[tokio::test]
    async fn test_tampered_tag_fails() {
        let provider = CryptoProvider::new(ProviderKind::BlockingPool);
        let mut result = provider.encrypt_with_random_key(b"Hello, World!").await.unwrap();
        result.auth_tag[15] ^= 0x80;

        let err = provider.decrypt_data(result).await.unwrap_err();
        assert!(matches!(err, Error::Authentication));
    }

    #[tokio::test]
    async fn test_wrap_key_round_trip() {
        let pair = shared_pair();
        for provider in providers() {
            let wrapped = provider.wrap_key(&[7u8; KEY_SIZE], pair.public_pem()).await.unwrap();
            assert_eq!(pair.unwrap_key(&wrapped).unwrap().as_slice(), &[7u8; KEY_SIZE]);
        }
    }

    #[tokio::test]
    async fn test_wrap_is_randomized() {
        let pair = shared_pair();
        let provider = CryptoProvider::default();
        let a = provider.wrap_key(b"nonce-bytes!", pair.public_pem()).await.unwrap();
        let b = provider.wrap_key(b"nonce-bytes!", pair.public_pem()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_wrap_key_rejects_bad_pem() {
        let provider = CryptoProvider::default();
        let err = provider.wrap_key(b"key", "not a pem").await.unwrap_err();
        assert!(matches!(err, Error::InvalidPublicKey(_)));
    }

    #[tokio::test]
    async fn test_wrap_key_rejects_oversized_input() {
        let pair = RsaKeyPair::generate(2048).unwrap();
        let provider = CryptoProvider::default();
        // OAEP/SHA-256 on a 2048-bit modulus fits at most 190 bytes
        let err = provider.wrap_key(&[0u8; 191], pair.public_pem()).await.unwrap_err();
        assert!(matches!(err, Error::KeyWrapFailed(_)));
    }

    #[tokio::test]
    async fn test_preset_key_round_trip() {
        for provider in providers() {
            let preset = provider.create_random_aes_key();
            let mut sealer = PresetKey::from_parts(
                preset.material().key_bytes(),
                preset.material().nonce_bytes(),
            )
            .unwrap()
            .into_sealer();
            let opener = preset.into_opener();

            let nonce = sealer.reserve().unwrap();
            let sealed = provider
                .encrypt_with_preset_key(b"preset payload", sealer.key(), nonce)
                .await
                .unwrap();
            assert_eq!(sealed.len(), 14 + TAG_SIZE);
            let buffer = sealer.frame(&nonce, sealed);

            let pending = opener.prepare(&buffer).unwrap();
            assert_eq!(pending.nonce, nonce);
            let data = provider
                .decrypt_with_preset_key(pending.body, opener.key(), pending.nonce)
                .await
                .unwrap();
            assert_eq!(data, b"preset payload");
        }
    }

    #[tokio::test]
    async fn test_preset_key_wrong_sequence_fails() {
        let provider = CryptoProvider::default();
        let key = SymmetricKey::generate();
        let buffer = provider
            .encrypt_with_preset_key(b"data", &key, SequenceNonce::derive(key.nonce_bytes(), 0))
            .await
            .unwrap();

        let err = provider
            .decrypt_with_preset_key(&buffer, &key, SequenceNonce::derive(key.nonce_bytes(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication));
    }

    #[tokio::test]
    async fn test_preset_key_wrong_key_fails() {
        let provider = CryptoProvider::default();
        let key = SymmetricKey::generate();
        let other = SymmetricKey::from_slices(&[1u8; KEY_SIZE], key.nonce_bytes()).unwrap();
        let nonce = SequenceNonce::derive(key.nonce_bytes(), 0);

        let buffer = provider.encrypt_with_preset_key(b"data", &key, nonce).await.unwrap();
        let err = provider
            .decrypt_with_preset_key(&buffer, &other, nonce)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication));
    }

    #[tokio::test]
    async fn test_preset_key_short_buffer_is_unsupported() {
        let provider = CryptoProvider::default();
        let key = SymmetricKey::generate();
        let nonce = SequenceNonce::derive(key.nonce_bytes(), 0);

        let err = provider
            .decrypt_with_preset_key(&[0u8; TAG_SIZE - 1], &key, nonce)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput(_)));
    }

    #[tokio::test]
    async fn test_preset_key_empty_payload_is_tag_only() {
        let provider = CryptoProvider::default();
        let key = SymmetricKey::generate();
        let nonce = SequenceNonce::derive(key.nonce_bytes(), 3);

        let buffer = provider.encrypt_with_preset_key(b"", &key, nonce).await.unwrap();
        assert_eq!(buffer.len(), TAG_SIZE);
        let data = provider.decrypt_with_preset_key(&buffer, &key, nonce).await.unwrap();
        assert!(data.is_empty());
    }
}
