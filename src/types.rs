//! Core Data Model
//!
//! Shared data structures for the relay pipeline: the user-signed intent as
//! committed on a source chain, and the destination-chain message record it
//! becomes after submission to the inbox.

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ============================================================================
// INTENT
// ============================================================================

/// A user-signed asset-transfer intent as committed on the source ledger.
///
/// All fields are read from the source chain's `IntentCommitted` event and
/// never mutated off-chain. `intent_hash` is the sole identity key for the
/// transfer; it is assigned by the source ledger at commit time and trusted
/// as emitted, never recomputed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Account that signed the intent on the source chain
    pub user: String,
    /// Chain ID where the intent was committed
    pub src_chain_id: u64,
    /// Chain ID where the transfer settles
    pub dst_chain_id: u64,
    /// Asset identifier on the source chain (zero address denotes the native asset)
    pub token: String,
    /// Transfer amount in the asset's smallest unit
    pub amount: u128,
    /// Recipient account on the destination chain
    pub recipient: String,
    /// Per-user nonce assigned by the source ledger
    pub nonce: u64,
    /// Unix timestamp after which the intent is no longer valid
    pub expiry: u64,
    /// Digest assigned by the source ledger on commit (hex, 0x-prefixed)
    pub intent_hash: String,
}

// ============================================================================
// MESSAGE
// ============================================================================

/// State of a message in the destination chain's inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageState {
    /// Submitted, sitting out its challenge period
    Pending,
    /// Disputed by a third party; the relay never touches these
    Challenged,
    /// Challenge period elapsed and finalize was called; terminal
    Finalized,
    /// Challenge upheld; terminal
    Rejected,
}

impl MessageState {
    /// Decodes the on-chain state discriminant.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageState::Pending),
            1 => Ok(MessageState::Challenged),
            2 => Ok(MessageState::Finalized),
            3 => Ok(MessageState::Rejected),
            other => Err(anyhow::anyhow!("Unknown message state: {}", other)),
        }
    }
}

/// Destination-chain record of a relayed intent, as returned by the inbox's
/// `getMessage` view.
///
/// `message_hash` is derived deterministically from the six core intent
/// fields (see [`crate::crypto::attestation_digest`]); the inbox also stores
/// the originating `intent_hash`, which is what links a message back to the
/// durable transfer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Inbox key for this message (hex, 0x-prefixed)
    pub message_hash: String,
    /// Intent hash submitted alongside the message
    pub intent_hash: String,
    /// Current inbox state
    pub state: MessageState,
    /// Unix timestamp when the message was submitted
    pub submitted_at: u64,
    /// Unix timestamp when the challenge period ends
    pub challenge_period_end: u64,
    /// Challenger account, when the message has been disputed
    pub challenger: Option<String>,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Normalize a hash or address to lowercase with a 0x prefix.
pub fn normalize_hex(value: &str) -> String {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    format!("0x{}", stripped.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_state_from_u8() {
        assert_eq!(MessageState::from_u8(0).unwrap(), MessageState::Pending);
        assert_eq!(MessageState::from_u8(2).unwrap(), MessageState::Finalized);
        assert!(MessageState::from_u8(9).is_err());
    }

    #[test]
    fn test_normalize_hex() {
        assert_eq!(normalize_hex("0xABCD"), "0xabcd");
        assert_eq!(normalize_hex("abcd"), "0xabcd");
    }
}
