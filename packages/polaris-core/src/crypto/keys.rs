//! # Key Management
//!
//! Key material handled by Polaris Core.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  RsaKeyPair (asymmetric, owned by a KeyHandler)                         │
//! │  • RSA-4096 by default, OAEP/SHA-256 for unwrapping                    │
//! │  • Public half exported as SPKI PEM                                    │
//! │                                                                         │
//! │  RecipientKey (asymmetric, public only)                                 │
//! │  • Parsed once from the container's PEM, used for wrapping             │
//! │                                                                         │
//! │  SymmetricKey (AES-256-GCM)                                             │
//! │  • 32-byte key + 12-byte nonce, zeroized on drop                       │
//! │                                                                         │
//! │  PresetKey ──► PresetSealer   (encrypts, sequence 0, 1, 2, ...)        │
//! │            └─► PresetOpener   (decrypts, same sequence)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Nonce Discipline
//!
//! A preset key is reused across many operations, so each operation runs
//! under a [`SequenceNonce`]: the base nonce XOR-ed with a 96-bit salt, with a
//! 64-bit sequence number XOR-ed into its last eight bytes.
//!
//! ```text
//! nonce(seq) = base ^ salt ^ (0u32 || seq)
//! ```
//!
//! Every [`PresetSealer`] draws its own random salt, and its first buffer
//! carries the salt in the clear (`salt || ciphertext || tag`). The opener
//! adopts the salt from that buffer and holds every later buffer to it.
//!
//! Key material itself can be duplicated: a wrapped preset key may be
//! accepted twice, and [`PresetKey::from_parts`] rebuilds a key from raw
//! bytes. Within one sealer nonces never repeat; across sealers of the same
//! key they are separated by the salts, so a repeat needs two salts to
//! collide on 96 random bits. Sequence nonces can only be minted inside
//! the crate.

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

/// Size of the AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the per-sealer nonce salt carried by a sealer's first buffer
pub const SALT_SIZE: usize = NONCE_SIZE;

// ============================================================================
// SYMMETRIC KEYS
// ============================================================================

/// AES-256-GCM key material: a key and the nonce it is used with
///
/// Zeroized when dropped. `Debug` never prints the bytes.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
}

impl SymmetricKey {
    /// Generate a fresh key and nonce from the operating system's CSPRNG
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut nonce);
        Self { key, nonce }
    }

    /// Build from raw key and nonce bytes of the canonical lengths
    pub fn from_slices(key: &[u8], nonce: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = key.try_into().map_err(|_| {
            Error::InvalidKeyMaterial(format!("key must be {} bytes, got {}", KEY_SIZE, key.len()))
        })?;
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| {
            Error::InvalidKeyMaterial(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                nonce.len()
            ))
        })?;
        Ok(Self { key, nonce })
    }

    /// Raw key bytes
    pub fn key_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Raw nonce bytes
    pub fn nonce_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey").finish_non_exhaustive()
    }
}

/// Nonce for one preset-key operation
///
/// Only this crate can construct one, from a base nonce and a sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequenceNonce {
    bytes: [u8; NONCE_SIZE],
    sequence: u64,
}

impl SequenceNonce {
    pub(crate) fn derive(base: &[u8; NONCE_SIZE], sequence: u64) -> Self {
        let mut bytes = *base;
        for (b, s) in bytes[NONCE_SIZE - 8..].iter_mut().zip(sequence.to_be_bytes()) {
            *b ^= s;
        }
        Self { bytes, sequence }
    }

    /// The effective nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }

    /// The sequence number this nonce was derived for
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// A symmetric key meant to be reused across several messages
///
/// Not `Clone`. Turn it into a [`PresetSealer`] on the side that encrypts or
/// a [`PresetOpener`] on the side that decrypts.
#[derive(Debug)]
pub struct PresetKey(SymmetricKey);

impl PresetKey {
    /// Generate a new random preset key
    pub fn generate() -> Self {
        Self(SymmetricKey::generate())
    }

    /// Rebuild a preset key from unwrapped key and nonce bytes
    pub fn from_parts(key: &[u8], nonce: &[u8]) -> Result<Self> {
        SymmetricKey::from_slices(key, nonce).map(Self)
    }

    /// The underlying key material (for wrapping)
    pub fn material(&self) -> &SymmetricKey {
        &self.0
    }

    /// Use this key for encryption, under a fresh random salt
    pub fn into_sealer(self) -> PresetSealer {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        PresetSealer {
            key: self.0,
            salt,
            next: Some(0),
        }
    }

    /// Use this key for decryption
    pub fn into_opener(self) -> PresetOpener {
        PresetOpener {
            key: self.0,
            salt: None,
            next: Some(0),
        }
    }
}

fn salted(base: &[u8; NONCE_SIZE], salt: &[u8; SALT_SIZE]) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    for (b, s) in nonce.iter_mut().zip(salt) {
        *b ^= s;
    }
    nonce
}

/// Encrypting side of a preset key. Issues sequence numbers 0, 1, 2, ...
#[derive(Debug)]
pub struct PresetSealer {
    key: SymmetricKey,
    salt: [u8; SALT_SIZE],
    next: Option<u64>,
}

impl PresetSealer {
    /// Sequence number the next operation will use, `None` once exhausted
    pub fn next_sequence(&self) -> Option<u64> {
        self.next
    }

    /// Salt separating this sealer's nonces from other sealers of the same key
    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }

    pub(crate) fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Reserve the next nonce. The sequence number is consumed even if the
    /// caller then fails to encrypt.
    pub(crate) fn reserve(&mut self) -> Result<SequenceNonce> {
        let sequence = self.next.ok_or(Error::NonceExhausted)?;
        self.next = sequence.checked_add(1);
        Ok(SequenceNonce::derive(
            &salted(&self.key.nonce, &self.salt),
            sequence,
        ))
    }

    /// Frame a sealed buffer for the wire. Sequence 0 carries the salt.
    pub(crate) fn frame(&self, nonce: &SequenceNonce, sealed: Vec<u8>) -> Vec<u8> {
        if nonce.sequence() != 0 {
            return sealed;
        }
        let mut out = Vec::with_capacity(SALT_SIZE + sealed.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&sealed);
        out
    }
}

/// Decrypting side of a preset key. Expects sequence numbers 0, 1, 2, ...
#[derive(Debug)]
pub struct PresetOpener {
    key: SymmetricKey,
    salt: Option<[u8; SALT_SIZE]>,
    next: Option<u64>,
}

/// One buffer the opener is about to decrypt
#[derive(Debug)]
pub(crate) struct PendingOpen<'a> {
    pub(crate) nonce: SequenceNonce,
    pub(crate) body: &'a [u8],
    salt: Option<[u8; SALT_SIZE]>,
}

impl PresetOpener {
    /// Sequence number the next buffer is expected to carry
    pub fn next_sequence(&self) -> Option<u64> {
        self.next
    }

    /// Salt adopted from the first buffer, if one has been opened
    pub fn salt(&self) -> Option<&[u8; SALT_SIZE]> {
        self.salt.as_ref()
    }

    pub(crate) fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Nonce and ciphertext for the next expected buffer, without consuming
    /// anything. Before the first buffer the leading bytes are the salt.
    pub(crate) fn prepare<'a>(&self, buffer: &'a [u8]) -> Result<PendingOpen<'a>> {
        let sequence = self.next.ok_or(Error::NonceExhausted)?;

        let (salt, body, adopted) = match self.salt {
            Some(salt) => (salt, buffer, None),
            None => {
                if buffer.len() < SALT_SIZE {
                    return Err(Error::UnsupportedInput(format!(
                        "first preset-key buffer is {} bytes, shorter than its {}-byte salt",
                        buffer.len(),
                        SALT_SIZE
                    )));
                }
                let (head, body) = buffer.split_at(SALT_SIZE);
                let mut salt = [0u8; SALT_SIZE];
                salt.copy_from_slice(head);
                (salt, body, Some(salt))
            }
        };

        Ok(PendingOpen {
            nonce: SequenceNonce::derive(&salted(&self.key.nonce, &salt), sequence),
            body,
            salt: adopted,
        })
    }

    /// Mark a prepared buffer as opened
    pub(crate) fn commit(&mut self, pending: PendingOpen<'_>) {
        if let Some(salt) = pending.salt {
            self.salt = Some(salt);
        }
        self.next = self.next.and_then(|s| s.checked_add(1));
    }
}

// ============================================================================
// ASYMMETRIC KEYS
// ============================================================================

/// A recipient's RSA public key, parsed once
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipientKey {
    inner: RsaPublicKey,
}

impl RecipientKey {
    /// Parse a PEM public key.
    ///
    /// SPKI (`BEGIN PUBLIC KEY`) is the canonical form; PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`) is accepted as well.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let inner = match RsaPublicKey::from_public_key_pem(pem) {
            Ok(key) => key,
            Err(spki_err) => RsaPublicKey::from_pkcs1_pem(pem)
                .map_err(|_| Error::InvalidPublicKey(spki_err.to_string()))?,
        };
        Ok(Self { inner })
    }

    /// Export as SPKI PEM
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))
    }

    /// RSA-OAEP/SHA-256 encrypt short key material
    pub(crate) fn wrap(&self, raw: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), raw)
            .map_err(|e| Error::KeyWrapFailed(e.to_string()))
    }
}

impl From<RsaPublicKey> for RecipientKey {
    fn from(inner: RsaPublicKey) -> Self {
        Self { inner }
    }
}

/// RSA keypair held by a key handler
///
/// The private key zeroizes itself on drop.
pub struct RsaKeyPair {
    private: RsaPrivateKey,
    public_pem: String,
}

impl RsaKeyPair {
    /// Generate a new keypair. CPU heavy; run it off the async executor.
    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::KeyGenerationFailed(e.to_string()))?;
        Self::from_private(private)
    }

    /// Load from a PKCS#8 PEM private key
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem.trim())
            .map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;
        Self::from_private(private)
    }

    fn from_private(private: RsaPrivateKey) -> Result<Self> {
        let public_pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        Ok(Self {
            private,
            public_pem,
        })
    }

    /// The public half as SPKI PEM
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// RSA-OAEP/SHA-256 decrypt wrapped key material
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map(Zeroizing::new)
            .map_err(|_| Error::KeyUnwrap)
    }
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("public_pem", &self.public_pem)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
