//! # Envelope Demo
//!
//! Encrypts a message for a container and decrypts it on the container side.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example envelope_demo
//! ```

use polaris_core::envelope::Envelope;
use polaris_core::{PolarisSdk, SdkConfig};

#[tokio::main]
async fn main() {
    println!("=== Polaris Core: Envelope Encryption Demo ===\n");

    // Step 1: Two parties, each with an ephemeral RSA identity
    println!("Step 1: Creating the client and the container...");
    let config = SdkConfig {
        rsa_key_bits: 2048, // 4096 in production; smaller here so the demo starts quickly
        ..SdkConfig::default()
    };
    let client = PolarisSdk::ephemeral(config.clone()).expect("Failed to create client");
    let container = PolarisSdk::ephemeral(config).expect("Failed to create container");

    let container_pem = container
        .public_key()
        .await
        .expect("Failed to get container public key");
    println!(
        "  Container public key: {}...",
        container_pem.lines().nth(1).unwrap_or_default()
    );
    println!();

    // Step 2: Encrypt
    let plaintext = b"Test message";
    println!(
        "Step 2: Encrypting {:?} for the container...",
        String::from_utf8_lossy(plaintext)
    );
    let message = client
        .encrypt(plaintext, &container_pem)
        .await
        .expect("Encryption failed");

    let envelope = Envelope::parse(&message, client.config().max_header_len)
        .expect("Envelope should parse");
    println!("  Envelope size:   {} bytes", message.len());
    println!("  Length prefix:   {}", hex::encode(&message[..4]));
    println!("  Auth tag:        {}", envelope.header.auth_tag);
    println!("  Ciphertext:      {}", hex::encode(envelope.ciphertext));
    println!();

    // Step 3: Decrypt on the container
    println!("Step 3: Decrypting on the container...");
    let decrypted = container.decrypt(&message).await.expect("Decryption failed");
    println!("  Decrypted: {:?}", String::from_utf8_lossy(&decrypted));
    assert_eq!(decrypted, plaintext);
    println!();

    // Step 4: Tampering is detected
    println!("Step 4: Flipping one ciphertext bit...");
    let mut tampered = message.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    match container.decrypt(&tampered).await {
        Ok(_) => println!("  Unexpectedly decrypted!"),
        Err(e) => println!("  Rejected: {} (code {})", e, e.code()),
    }
    println!();

    // Step 5: Only the container can open it
    println!("Step 5: Client tries to decrypt the container's envelope...");
    match client.decrypt(&message).await {
        Ok(_) => println!("  Unexpectedly decrypted!"),
        Err(e) => println!("  Rejected: {} (code {})", e, e.code()),
    }

    println!("\n=== Demo Complete ===");
}
