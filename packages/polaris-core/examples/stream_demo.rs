//! # Stream Demo
//!
//! Requests a reply key, seals a reply stream under it, ships the chunks as
//! frames over an in-memory pipe and opens them again.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example stream_demo
//! ```

use std::convert::Infallible;

use bytes::Bytes;
use futures::io::Cursor;
use futures::{stream, StreamExt};
use polaris_core::{OpenMode, PolarisSdk, ReplyPlan, SdkConfig, WrappedPresetKey};

const CHUNK_SIZE: usize = 1024;

#[tokio::main]
async fn main() {
    println!("=== Polaris Core: Streaming Reply Demo ===\n");

    let config = SdkConfig {
        rsa_key_bits: 2048,
        ..SdkConfig::default()
    };
    let client = PolarisSdk::ephemeral(config.clone()).expect("Failed to create client");
    let container = PolarisSdk::ephemeral(config).expect("Failed to create container");

    // Step 1: Client offers a reply key alongside its request
    println!("Step 1: Client offers a response key...");
    let container_pem = container.public_key().await.expect("public key");
    let (reply_key, wrapped) = client
        .offer_response_key(&container_pem)
        .await
        .expect("Failed to offer key");
    let header = wrapped.to_header_value().expect("header value");
    println!("  Header value: {}... ({} chars)", &header[..32], header.len());
    println!();

    // Step 2: Container seals its reply under the offered key
    println!("Step 2: Container seals a 20 KB reply in {} byte chunks...", CHUNK_SIZE);
    let offered = WrappedPresetKey::from_header_value(&header).expect("valid header");
    let plan = ReplyPlan::resolve(&container, Some(&offered), None)
        .await
        .expect("reply plan");

    let body = vec![0x41u8; 20 * 1024];
    let chunks = body
        .chunks(CHUNK_SIZE)
        .map(|c| Ok::<_, Infallible>(Bytes::copy_from_slice(c)))
        .collect::<Vec<_>>();
    let sealed = container.seal_stream(plan.into_seal_mode(), stream::iter(chunks));

    let mut wire = Vec::new();
    let count = container
        .write_frames(&mut wire, sealed)
        .await
        .expect("Failed to write frames");
    println!("  {} frames, {} bytes on the wire", count, wire.len());
    println!();

    // Step 3: Client opens the reply chunk by chunk
    println!("Step 3: Client opens the reply...");
    let opened = client.open_stream(
        OpenMode::Preset(reply_key.into_opener()),
        client.frames(Cursor::new(wire)),
    );
    futures::pin_mut!(opened);

    let mut received = Vec::new();
    while let Some(chunk) = opened.next().await {
        let chunk = chunk.expect("chunk failed to open");
        received.extend_from_slice(&chunk);
    }
    println!("  Received {} bytes", received.len());
    assert_eq!(received, body);

    println!("\n=== Demo Complete ===");
}
