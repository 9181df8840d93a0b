//! # Error Handling
//!
//! This module provides the error type shared by every Polaris Core operation.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Format Errors                                                     │
//! │  │   ├── Format                - Malformed or truncated envelope       │
//! │  │   └── UnsupportedInput      - Preset buffer shorter than the tag    │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── Authentication        - AEAD tag verification failed          │
//! │  │   ├── KeyUnwrap             - Private key could not unwrap          │
//! │  │   ├── InvalidPublicKey      - Recipient PEM could not be parsed     │
//! │  │   ├── InvalidPrivateKey     - Configured PEM could not be parsed    │
//! │  │   ├── KeyGenerationFailed   - RSA keypair generation failed         │
//! │  │   ├── KeyWrapFailed         - RSA-OAEP wrap failed                  │
//! │  │   ├── EncryptionFailed      - AES-GCM encryption failed             │
//! │  │   ├── InvalidKeyMaterial    - Wrong key / nonce length              │
//! │  │   └── NonceExhausted        - Preset key sequence space used up     │
//! │  │                                                                      │
//! │  ├── Config Errors                                                     │
//! │  │   └── InvalidConfig                                                 │
//! │  │                                                                      │
//! │  ├── Stream Errors                                                     │
//! │  │   ├── Upstream              - Source stream yielded an error        │
//! │  │   ├── Io                    - Frame transport I/O failure           │
//! │  │   └── MissingReplyKey       - No way to encrypt a reply             │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── Internal                                                      │
//! │      └── Serialization                                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Decryption Oracles
//!
//! `Authentication` and `KeyUnwrap` are distinct variants so callers can
//! branch on them, but both render the same text. Anything that ends up in a
//! log line or an HTTP response therefore cannot tell an attacker whether the
//! wrapped key or the ciphertext was rejected.

use thiserror::Error;

/// Result type alias for Polaris Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Text shared by every decryption failure.
const DECRYPTION_FAILED: &str = "Decryption failed";

/// Main error type for Polaris Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Format Errors (100-199)
    // ========================================================================

    /// Malformed or truncated envelope (bad length prefix, invalid JSON,
    /// missing header fields)
    #[error("Malformed envelope: {0}")]
    Format(String),

    /// Input the operation cannot process at all, such as a preset-key buffer
    /// shorter than the authentication tag
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    // ========================================================================
    // Crypto Errors (200-299)
    // ========================================================================

    /// AEAD tag verification failed
    #[error("{}", DECRYPTION_FAILED)]
    Authentication,

    /// The private key could not unwrap the supplied ciphertext
    #[error("{}", DECRYPTION_FAILED)]
    KeyUnwrap,

    /// Recipient public key could not be parsed
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Configured private key could not be parsed
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// RSA key generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// RSA-OAEP wrapping failed
    #[error("Key wrap failed: {0}")]
    KeyWrapFailed(String),

    /// Symmetric encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Key or nonce bytes have the wrong length
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// A preset key has issued every sequence number it can
    #[error("Preset key sequence space exhausted")]
    NonceExhausted,

    // ========================================================================
    // Config Errors (300-399)
    // ========================================================================

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Stream Errors (400-499)
    // ========================================================================

    /// The upstream source of a cipher pipeline failed
    #[error("Upstream stream error: {0}")]
    Upstream(String),

    /// Frame transport I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Neither a preset key nor a requester public key is available
    #[error("No reply key available: offer a preset key or supply the requester public key")]
    MissingReplyKey,

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Format
    /// - 200-299: Crypto
    /// - 300-399: Config
    /// - 400-499: Stream / exchange
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Format (100-199)
            Error::Format(_) => 100,
            Error::UnsupportedInput(_) => 101,

            // Crypto (200-299)
            Error::Authentication => 200,
            Error::KeyUnwrap => 201,
            Error::InvalidPublicKey(_) => 202,
            Error::InvalidPrivateKey(_) => 203,
            Error::KeyGenerationFailed(_) => 204,
            Error::KeyWrapFailed(_) => 205,
            Error::EncryptionFailed(_) => 206,
            Error::InvalidKeyMaterial(_) => 207,
            Error::NonceExhausted => 208,

            // Config (300-399)
            Error::InvalidConfig(_) => 300,

            // Stream (400-499)
            Error::Upstream(_) => 400,
            Error::Io(_) => 401,
            Error::MissingReplyKey => 402,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::Serialization(_) => 901,
        }
    }

    /// Whether this error is one of the two decryption failures that share
    /// their external message
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, Error::Authentication | Error::KeyUnwrap)
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
