//! Attestation Key Generation Utility
//!
//! This binary generates a new secp256k1 key pair for the trusted relay.
//!
//! ## Usage
//!
//! ```bash
//! # Generate a new key
//! cargo run --bin generate_keys
//!
//! # Export the private key before starting the relay
//! export RELAY_SIGNING_KEY=<private key hex>
//! ```
//!
//! ## Output
//!
//! The script outputs:
//! - Private key (hex encoded) - for the RELAY_SIGNING_KEY environment variable
//! - Relayer address - deploy the inbox contracts with this as the trusted relayer

use k256::ecdsa::SigningKey;
use rand::Rng;
use sha3::{Digest, Keccak256};

fn main() {
    // Generate a new secp256k1 key pair
    let mut rng = rand::rngs::OsRng;
    let mut secret_key_bytes = [0u8; 32];
    rng.fill(&mut secret_key_bytes);
    let signing_key = match SigningKey::from_bytes(&secret_key_bytes.into()) {
        Ok(key) => key,
        Err(_) => {
            // Astronomically unlikely: the random scalar fell outside the
            // curve order. Ask the operator to rerun rather than looping.
            eprintln!("Generated scalar was invalid; please run again");
            std::process::exit(1);
        }
    };

    let point = signing_key.verifying_key().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let address = format!("0x{}", hex::encode(&hash[12..]));

    println!("Generated secp256k1 Key Pair:");
    println!("Private Key (hex): 0x{}", hex::encode(secret_key_bytes));
    println!("Relayer Address:   {}", address);
    println!();
    println!("Export the private key as RELAY_SIGNING_KEY and set relayer_addr");
    println!("in config/relay.toml to the address above.");
}
