//! # Configuration
//!
//! A plain struct with defaults, deserializable from JSON so the embedding
//! application can ship it alongside the rest of its settings.
//!
//! ## JSON Shape
//!
//! ```text
//! {
//!   "provider": "inline" | "blockingPool",   default "inline"
//!   "rsaKeyBits": 4096,                       >= 2048, multiple of 8
//!   "maxHeaderLen": 65536,                    envelope header bound
//!   "maxFrameLen": 16777216                   transport frame bound
//! }
//! ```
//!
//! Every field is optional. [`SdkConfig::from_json`] validates before
//! returning.

use serde::{Deserialize, Serialize};

use crate::crypto::ProviderKind;
use crate::error::{Error, Result};

// ============================================================================
// DEFAULTS
// ============================================================================

/// Default RSA modulus size for ephemeral identities
pub const DEFAULT_RSA_KEY_BITS: usize = 4096;

/// Smallest RSA modulus accepted by [`SdkConfig::validate`]
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Default upper bound for an envelope header (64 KiB)
pub const DEFAULT_MAX_HEADER_LEN: usize = 64 * 1024;

/// Default upper bound for one transport frame (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ============================================================================
// SDK CONFIG
// ============================================================================

/// Configuration for a [`PolarisSdk`](crate::PolarisSdk)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SdkConfig {
    /// Where the crypto primitives run
    pub provider: ProviderKind,
    /// Modulus size for keypairs generated by the ephemeral key handler
    pub rsa_key_bits: usize,
    /// Largest header length an envelope may declare
    pub max_header_len: usize,
    /// Largest frame accepted by the frame transport
    pub max_frame_len: usize,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            rsa_key_bits: DEFAULT_RSA_KEY_BITS,
            max_header_len: DEFAULT_MAX_HEADER_LEN,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl SdkConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("Invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(Error::InvalidConfig(format!(
                "rsaKeyBits must be at least {}, got {}",
                MIN_RSA_KEY_BITS, self.rsa_key_bits
            )));
        }
        if self.rsa_key_bits % 8 != 0 {
            return Err(Error::InvalidConfig(format!(
                "rsaKeyBits must be a multiple of 8, got {}",
                self.rsa_key_bits
            )));
        }
        if self.max_header_len == 0 || self.max_header_len > u32::MAX as usize {
            return Err(Error::InvalidConfig(
                "maxHeaderLen must be between 1 and u32::MAX".into(),
            ));
        }
        if self.max_frame_len == 0 || self.max_frame_len > u32::MAX as usize {
            return Err(Error::InvalidConfig(
                "maxFrameLen must be between 1 and u32::MAX".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SdkConfig::default();
        assert_eq!(config.rsa_key_bits, 4096);
        assert_eq!(config.provider, ProviderKind::Inline);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = SdkConfig::from_json(r#"{"provider":"blockingPool"}"#).unwrap();
        assert_eq!(config.provider, ProviderKind::BlockingPool);
        assert_eq!(config.max_header_len, DEFAULT_MAX_HEADER_LEN);
    }

    #[test]
    fn test_rejects_small_modulus() {
        let result = SdkConfig::from_json(r#"{"rsaKeyBits":1024}"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_from_json_reads_every_field() {
        let config = SdkConfig::from_json(
            r#"{"provider":"inline","rsaKeyBits":3072,"maxHeaderLen":1024,"maxFrameLen":4096}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            SdkConfig {
                provider: ProviderKind::Inline,
                rsa_key_bits: 3072,
                max_header_len: 1024,
                max_frame_len: 4096,
            }
        );
    }

    #[test]
    fn test_rejects_zero_frame_len() {
        let config = SdkConfig {
            max_frame_len: 0,
            ..SdkConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
