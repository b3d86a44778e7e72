//! Cryptographic Operations Module
//!
//! This module handles the relay's attestation cryptography: the canonical
//! message digest over a committed intent's core fields, and the secp256k1
//! ECDSA signature the destination inbox verifies before accepting a pending
//! message.
//!
//! The digest function is the shared wire contract between the relay and the
//! on-chain verifier. Both relay directions call the same function, so the
//! encoding is byte-identical regardless of which chain produced the intent.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: The attestation private key authorizes minting on both
//! chains. It is loaded from an environment variable at runtime and must
//! never be exposed or logged.

use anyhow::{Context, Result};
use k256::ecdsa::{
    RecoveryId, Signature as EcdsaSignature, SigningKey as EcdsaSigningKey,
    VerifyingKey as EcdsaVerifyingKey,
};
use sha3::{Digest, Keccak256};
use tracing::info;

use crate::chain_client::{word_from_address, word_from_hash, word_from_u128};
use crate::config::Config;
use crate::types::Intent;

/// EIP-191 prefix applied before signing a 32-byte digest.
const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

// ============================================================================
// ATTESTATION DIGEST
// ============================================================================

/// Computes the canonical attestation digest for an intent.
///
/// Encodes `(src_chain_id, dst_chain_id, token, amount, recipient,
/// intent_hash)` in that fixed order as 32-byte words (integers big-endian,
/// addresses left-padded) and keccak256-hashes the 192-byte buffer. The
/// destination inbox derives its message hash the same way, so this value is
/// both the signed payload and the message identity.
pub fn attestation_digest(intent: &Intent) -> Result<[u8; 32]> {
    let mut buffer = Vec::with_capacity(6 * 32);
    buffer.extend_from_slice(&word_from_u128(intent.src_chain_id as u128));
    buffer.extend_from_slice(&word_from_u128(intent.dst_chain_id as u128));
    buffer.extend_from_slice(&word_from_address(&intent.token).context("Invalid token address")?);
    buffer.extend_from_slice(&word_from_u128(intent.amount));
    buffer.extend_from_slice(
        &word_from_address(&intent.recipient).context("Invalid recipient address")?,
    );
    buffer.extend_from_slice(&word_from_hash(&intent.intent_hash).context("Invalid intent hash")?);

    Ok(Keccak256::digest(&buffer).into())
}

/// Applies the EIP-191 signed-message prefix to a digest.
fn prefixed_hash(digest: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(SIGNED_MESSAGE_PREFIX);
    hasher.update(digest);
    hasher.finalize().into()
}

// ============================================================================
// CRYPTOGRAPHIC SERVICE IMPLEMENTATION
// ============================================================================

/// Cryptographic service holding the relay's attestation key.
pub struct CryptoService {
    /// ECDSA signing key (secp256k1)
    signing_key: EcdsaSigningKey,
}

impl CryptoService {
    /// Creates a new cryptographic service from configuration.
    ///
    /// Loads the hex-encoded private key from the environment variable named
    /// in config. When `relayer.relayer_addr` is set, the derived Ethereum
    /// address is checked against it so a wrong key fails startup rather
    /// than producing signatures the inbox rejects.
    pub fn new(config: &Config) -> Result<Self> {
        let key_hex = config.relayer.get_signing_key()?;
        let service = Self::from_key_hex(&key_hex)?;

        if let Some(ref expected) = config.relayer.relayer_addr {
            let actual = service.relayer_address();
            if actual.to_lowercase() != expected.to_lowercase() {
                return Err(anyhow::anyhow!(
                    "Relayer address mismatch: config expects {}, but key in '{}' derives {}",
                    expected,
                    config.relayer.signing_key_env,
                    actual
                ));
            }
        }

        info!(
            "Crypto service initialized, relayer address {}",
            service.relayer_address()
        );
        Ok(service)
    }

    /// Creates a service directly from a hex-encoded private key.
    pub fn from_key_hex(key_hex: &str) -> Result<Self> {
        let body = key_hex.trim().strip_prefix("0x").unwrap_or(key_hex.trim());
        let key_bytes = hex::decode(body).context("Signing key is not valid hex")?;

        if key_bytes.len() != 32 {
            return Err(anyhow::anyhow!(
                "Invalid signing key length: expected 32 bytes, got {}",
                key_bytes.len()
            ));
        }

        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Failed to convert signing key to array"))?;
        let signing_key = EcdsaSigningKey::from_bytes(&key_array.into())
            .map_err(|e| anyhow::anyhow!("Failed to create ECDSA signing key: {}", e))?;

        Ok(Self { signing_key })
    }

    /// Signs an attestation digest.
    ///
    /// Applies the EIP-191 prefix, signs the prehash, and determines the
    /// recovery id by trial recovery against the known public key.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - 65-byte signature `r || s || v` with `v` in {27, 28}
    /// * `Err(anyhow::Error)` - Failed to sign
    pub fn sign_attestation(&self, digest: &[u8; 32]) -> Result<Vec<u8>> {
        let hash = prefixed_hash(digest);

        use k256::ecdsa::signature::hazmat::PrehashSigner;
        let signature: EcdsaSignature = self
            .signing_key
            .sign_prehash(&hash)
            .map_err(|e| anyhow::anyhow!("Failed to sign attestation digest: {}", e))?;

        let verifying_key = self.signing_key.verifying_key();
        let recovery_id = [0u8, 1u8]
            .into_iter()
            .find(|id| {
                RecoveryId::try_from(*id)
                    .ok()
                    .and_then(|rid| {
                        EcdsaVerifyingKey::recover_from_prehash(&hash, &signature, rid).ok()
                    })
                    .as_ref()
                    == Some(verifying_key)
            })
            .ok_or_else(|| anyhow::anyhow!("Failed to determine signature recovery id"))?;

        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&signature.to_bytes());
        out.push(recovery_id + 27);
        Ok(out)
    }

    /// Returns the Ethereum address of the attestation key.
    ///
    /// Derived as the last 20 bytes of the keccak256 hash of the
    /// uncompressed public key. The inbox is deployed with this address as
    /// its trusted relayer.
    pub fn relayer_address(&self) -> String {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        // Skip the 0x04 uncompressed-point marker byte
        let hash = Keccak256::digest(&point.as_bytes()[1..]);
        format!("0x{}", hex::encode(&hash[12..]))
    }
}

/// Verifies a 65-byte attestation signature against a digest and an expected
/// relayer address.
pub fn verify_attestation(digest: &[u8; 32], signature: &[u8], expected_addr: &str) -> Result<bool> {
    if signature.len() != 65 {
        return Err(anyhow::anyhow!(
            "Invalid signature length: expected 65 bytes, got {}",
            signature.len()
        ));
    }

    let hash = prefixed_hash(digest);
    let sig = EcdsaSignature::from_slice(&signature[..64])
        .map_err(|e| anyhow::anyhow!("Invalid signature bytes: {}", e))?;
    let v = signature[64]
        .checked_sub(27)
        .ok_or_else(|| anyhow::anyhow!("Invalid recovery byte: {}", signature[64]))?;
    let recovery_id =
        RecoveryId::try_from(v).map_err(|e| anyhow::anyhow!("Invalid recovery id: {}", e))?;

    let recovered = match EcdsaVerifyingKey::recover_from_prehash(&hash, &sig, recovery_id) {
        Ok(key) => key,
        Err(_) => return Ok(false),
    };

    let point = recovered.to_encoded_point(false);
    let addr_hash = Keccak256::digest(&point.as_bytes()[1..]);
    let recovered_addr = format!("0x{}", hex::encode(&addr_hash[12..]));
    Ok(recovered_addr.to_lowercase() == expected_addr.to_lowercase())
}
