//! # Streaming Cipher Pipeline
//!
//! Seals or opens a stream of byte chunks one chunk at a time.
//!
//! ## Modes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        STREAM MODES                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Full envelope                                                         │
//! │  ─────────────                                                          │
//! │  chunk 0 ──► envelope(key0)                                            │
//! │  chunk 1 ──► envelope(key1)       every chunk is self-contained        │
//! │  chunk 2 ──► envelope(key2)                                            │
//! │                                                                         │
//! │  Preset key                                                            │
//! │  ──────────                                                             │
//! │  chunk 0 ──► salt || AES-GCM(K, base ^ salt ^ 0) || tag                │
//! │  chunk 1 ──►         AES-GCM(K, base ^ salt ^ 1) || tag                │
//! │  chunk 2 ──►         AES-GCM(K, base ^ salt ^ 2) || tag                │
//! │                                                                         │
//! │  The sequence number ties each chunk to its position, so reordered,   │
//! │  duplicated or missing chunks fail authentication. The salt ties      │
//! │  each chunk to its sealer.                                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Flow Control
//!
//! The output stream is lazy. Each poll pulls at most one upstream chunk and
//! produces at most one output chunk, so nothing is buffered ahead of the
//! consumer. The first error is yielded once and ends the stream; no further
//! upstream chunks are pulled. Dropping the output stream drops the upstream.
//!
//! Transports that do not preserve chunk boundaries should carry the output
//! through [`framing`](crate::framing).

use std::fmt::Display;

use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::crypto::{PresetOpener, PresetSealer, RecipientKey};
use crate::error::{Error, Result};
use crate::PolarisSdk;

/// How a stream is sealed
#[derive(Debug)]
pub enum SealMode {
    /// Every chunk becomes an independent envelope for this recipient
    Envelope(RecipientKey),
    /// Every chunk is encrypted under one preset key
    Preset(PresetSealer),
}

/// How a stream is opened
#[derive(Debug)]
pub enum OpenMode {
    /// Every chunk is an envelope addressed to the SDK's key handler
    Envelope,
    /// Every chunk was encrypted under this preset key
    Preset(PresetOpener),
}

impl SealMode {
    fn name(&self) -> &'static str {
        match self {
            SealMode::Envelope(_) => "envelope",
            SealMode::Preset(_) => "preset",
        }
    }
}

impl OpenMode {
    fn name(&self) -> &'static str {
        match self {
            OpenMode::Envelope => "envelope",
            OpenMode::Preset(_) => "preset",
        }
    }
}

/// Encrypt every chunk of `upstream`
pub fn seal_stream<S, B, E>(
    sdk: PolarisSdk,
    mut mode: SealMode,
    upstream: S,
) -> impl Stream<Item = Result<Bytes>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    try_stream! {
        futures::pin_mut!(upstream);
        tracing::debug!("Sealing stream in {} mode", mode.name());

        let mut index = 0u64;
        while let Some(chunk) = upstream.next().await {
            let chunk = chunk.map_err(|e| Error::Upstream(e.to_string()))?;
            let chunk = chunk.as_ref();

            let sealed = match &mut mode {
                SealMode::Envelope(recipient) => sdk.encrypt_for(chunk, recipient).await?,
                SealMode::Preset(sealer) => sdk.encrypt_with_preset_key(chunk, sealer).await?,
            };

            tracing::debug!(
                "Sealed chunk {}: {} -> {} bytes",
                index,
                chunk.len(),
                sealed.len()
            );
            index += 1;
            yield Bytes::from(sealed);
        }

        tracing::debug!("Sealed stream finished after {} chunks", index);
    }
}

/// Decrypt every chunk of `upstream`
pub fn open_stream<S, B, E>(
    sdk: PolarisSdk,
    mut mode: OpenMode,
    upstream: S,
) -> impl Stream<Item = Result<Bytes>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    try_stream! {
        futures::pin_mut!(upstream);
        tracing::debug!("Opening stream in {} mode", mode.name());

        let mut index = 0u64;
        while let Some(chunk) = upstream.next().await {
            let chunk = chunk.map_err(|e| Error::Upstream(e.to_string()))?;
            let chunk = chunk.as_ref();

            let opened = match &mut mode {
                OpenMode::Envelope => sdk.decrypt(chunk).await,
                OpenMode::Preset(opener) => sdk.decrypt_with_preset_key(chunk, opener).await,
            }
            .map_err(|e| {
                tracing::warn!("Chunk {} rejected, closing stream: {}", index, e);
                e
            })?;

            tracing::debug!(
                "Opened chunk {}: {} -> {} bytes",
                index,
                chunk.len(),
                opened.len()
            );
            index += 1;
            yield Bytes::from(opened);
        }

        tracing::debug!("Opened stream finished after {} chunks", index);
    }
}

// ============================================================================
// TESTS
// ============================================================================
