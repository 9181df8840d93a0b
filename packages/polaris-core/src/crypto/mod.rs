//! # Cryptography Module
//!
//! The crypto/key abstraction layer under the envelope codec and the stream
//! pipeline.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    HYBRID ENCRYPTION SCHEME                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender                                    Recipient (container)        │
//! │  ──────                                    ─────────────────────        │
//! │                                                                         │
//! │  fresh AES-256 key + 96-bit nonce                                      │
//! │        │                                                                │
//! │        ├──► AES-256-GCM(plaintext) ──► ciphertext + 128-bit tag        │
//! │        │                                                                │
//! │        └──► RSA-OAEP/SHA-256(recipient public key)                     │
//! │                 ──► wrapped key, wrapped nonce ──────► KeyHandler       │
//! │                                                         unwraps them    │
//! │                                                                         │
//! │  Modules:                                                              │
//! │  • keys      key material, sequence nonces, RSA keys                   │
//! │  • provider  wrap / encrypt / decrypt primitives                       │
//! │  • handler   owners of the local RSA keypair                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All primitives come from the RustCrypto `rsa`, `aes-gcm` and `sha2` crates.

mod handler;
mod keys;
mod provider;

pub use handler::{EphemeralKeyHandler, KeyHandler, PemKeyHandler};
pub use keys::{
    PresetKey, PresetOpener, PresetSealer, RecipientKey, RsaKeyPair, SequenceNonce, SymmetricKey,
    KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE,
};
pub use provider::{CryptoProvider, ProviderKind, SymmetricCipherResult};
