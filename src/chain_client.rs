//! Chain Client Module
//!
//! This module provides a client for communicating with a chain's JSON-RPC
//! node: reading the head height, querying contract event logs, read-only
//! contract calls, and submitting relay transactions with a bounded wait for
//! inclusion. It also owns the single classification point that sorts
//! contract/RPC failures into transient and permanent categories.
//!
//! Transaction signing is delegated to the node's keystore: `send` submits
//! from the configured operator account. The relay's own key only ever signs
//! attestations (see [`crate::crypto`]).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// How often to poll for a submitted transaction's receipt.
const RECEIPT_POLL_INTERVAL_MS: u64 = 1000;

// ============================================================================
// ERROR TAXONOMY
// ============================================================================

/// Classified failure of a chain interaction.
///
/// The distinction that matters to callers is transient vs. permanent:
/// transient failures are retried (by the watcher tick, the scheduler
/// backoff, or the backlog reconciler), permanent ones are settled
/// immediately: duplicates count as success, logic failures mark the
/// transfer FAILED.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC unreachable, timed out, or returned an unrecognized error
    #[error("rpc transport error: {0}")]
    Transport(String),
    /// Node rejected the transaction for reasons fresh parameters can fix (nonce, gas)
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// Contract reports the message/intent already exists
    #[error("duplicate: {0}")]
    Duplicate(String),
    /// Contract reverted for a reason retrying cannot fix
    #[error("contract reverted: {0}")]
    Reverted(String),
    /// Transaction was broadcast but no receipt appeared within the bound
    #[error("timed out waiting for receipt of {0}")]
    ConfirmationTimeout(String),
}

impl ChainError {
    /// Whether retrying the operation can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Transport(_) | ChainError::Rejected(_) | ChainError::ConfirmationTimeout(_)
        )
    }
}

/// Sorts a node/contract error message into the [`ChainError`] taxonomy.
///
/// Message-pattern matching is fragile, so every heuristic lives here and
/// nowhere else. Unrecognized messages classify as transient transport
/// errors: a retry is harmless, a silent drop is not.
pub fn classify_rpc_error(message: &str) -> ChainError {
    let lower = message.to_lowercase();

    const DUPLICATE_PATTERNS: [&str; 5] = [
        "already processed",
        "already exists",
        "already submitted",
        "already minted",
        "duplicate",
    ];
    const REJECTED_PATTERNS: [&str; 5] = [
        "nonce too low",
        "nonce too high",
        "underpriced",
        "replacement transaction",
        "insufficient funds",
    ];

    if DUPLICATE_PATTERNS.iter().any(|p| lower.contains(p)) {
        ChainError::Duplicate(message.to_string())
    } else if REJECTED_PATTERNS.iter().any(|p| lower.contains(p)) {
        ChainError::Rejected(message.to_string())
    } else if lower.contains("revert") {
        ChainError::Reverted(message.to_string())
    } else {
        ChainError::Transport(message.to_string())
    }
}

// ============================================================================
// JSON-RPC STRUCTURES
// ============================================================================

/// JSON-RPC request wrapper
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<serde_json::Value>,
    id: u64,
}

/// JSON-RPC response wrapper
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    result: Option<T>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

/// Raw event log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    #[serde(rename = "logIndex")]
    log_index: String,
}

/// Raw transaction receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Deserialize)]
struct RawReceipt {
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
    status: String,
}

/// Parsed event log entry with hex quantities decoded.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Contract that emitted the event
    pub address: String,
    /// Indexed event parameters; topics[0] is the event signature hash
    pub topics: Vec<String>,
    /// Non-indexed event parameters, ABI-encoded
    pub data: Vec<u8>,
    /// Block the event was included in
    pub block_number: u64,
    /// Transaction that emitted the event
    pub transaction_hash: String,
    /// Position of the log within the block
    pub log_index: u64,
}

/// Receipt of an included relay transaction.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    /// Transaction hash
    pub transaction_hash: String,
    /// Block the transaction was included in
    pub block_number: u64,
}

// ============================================================================
// ABI ENCODING / DECODING
// ============================================================================

/// Argument value for a contract call.
#[derive(Debug, Clone)]
pub enum AbiToken {
    /// Unsigned integer, encoded as a 32-byte big-endian word
    Uint(u128),
    /// 20-byte address (hex string), left-padded to a word
    Address(String),
    /// Fixed 32-byte value
    FixedBytes([u8; 32]),
    /// Dynamic byte string (head/tail encoded)
    Bytes(Vec<u8>),
}

/// First four bytes of the keccak256 hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Keccak256 hash of an event signature, hex encoded (the `topic0` filter).
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(Keccak256::digest(signature.as_bytes())))
}

/// Encodes calldata for a function call: selector followed by the standard
/// head/tail ABI encoding of the arguments.
pub fn encode_call(signature: &str, tokens: &[AbiToken]) -> Result<Vec<u8>, ChainError> {
    let head_len = tokens.len() * 32;
    let mut head: Vec<u8> = Vec::with_capacity(head_len);
    let mut tail: Vec<u8> = Vec::new();

    for token in tokens {
        match token {
            AbiToken::Uint(value) => head.extend_from_slice(&word_from_u128(*value)),
            AbiToken::Address(addr) => head.extend_from_slice(&word_from_address(addr)?),
            AbiToken::FixedBytes(bytes) => head.extend_from_slice(bytes),
            AbiToken::Bytes(bytes) => {
                let offset = head_len + tail.len();
                head.extend_from_slice(&word_from_u128(offset as u128));
                tail.extend_from_slice(&word_from_u128(bytes.len() as u128));
                tail.extend_from_slice(bytes);
                let padding = (32 - bytes.len() % 32) % 32;
                tail.extend_from_slice(&vec![0u8; padding]);
            }
        }
    }

    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    Ok(out)
}

/// Encodes an unsigned integer as a 32-byte big-endian word.
pub fn word_from_u128(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Encodes a 20-byte hex address as a left-padded 32-byte word.
pub fn word_from_address(addr: &str) -> Result<[u8; 32], ChainError> {
    let body = addr.strip_prefix("0x").unwrap_or(addr);
    let bytes = hex::decode(body)
        .map_err(|e| ChainError::Reverted(format!("invalid address '{}': {}", addr, e)))?;
    if bytes.len() != 20 {
        return Err(ChainError::Reverted(format!(
            "invalid address '{}': expected 20 bytes, got {}",
            addr,
            bytes.len()
        )));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// Splits ABI-encoded return data into 32-byte words.
pub fn decode_words(data: &[u8]) -> Result<Vec<[u8; 32]>, ChainError> {
    if data.len() % 32 != 0 {
        return Err(ChainError::Transport(format!(
            "return data length {} is not a multiple of 32",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(32)
        .map(|chunk| {
            let mut word = [0u8; 32];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Decodes a word as u64, rejecting values that overflow.
pub fn u64_from_word(word: &[u8; 32]) -> Result<u64, ChainError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(ChainError::Reverted("uint64 overflow in word".to_string()));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(bytes))
}

/// Decodes a word as u128, rejecting values that overflow.
pub fn u128_from_word(word: &[u8; 32]) -> Result<u128, ChainError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(ChainError::Reverted("uint128 overflow in word".to_string()));
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(bytes))
}

/// Decodes a word as a 20-byte address, hex encoded with 0x prefix.
pub fn address_from_word(word: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(&word[12..]))
}

/// Encodes a word as a 32-byte hash string with 0x prefix.
pub fn hash_from_word(word: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(word))
}

/// Parses a 0x-prefixed hex string into a 32-byte word.
pub fn word_from_hash(hash: &str) -> Result<[u8; 32], ChainError> {
    let body = hash.strip_prefix("0x").unwrap_or(hash);
    let bytes = hex::decode(body)
        .map_err(|e| ChainError::Reverted(format!("invalid hash '{}': {}", hash, e)))?;
    bytes.try_into().map_err(|_| {
        ChainError::Reverted(format!("invalid hash '{}': expected 32 bytes", hash))
    })
}

/// Parses a hex quantity string ("0x1a") into u64.
fn parse_hex_u64(value: &str) -> Result<u64, ChainError> {
    let body = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(body, 16)
        .map_err(|e| ChainError::Transport(format!("invalid hex quantity '{}': {}", value, e)))
}

// ============================================================================
// CHAIN CLIENT IMPLEMENTATION
// ============================================================================

/// Client for one chain's JSON-RPC node.
pub struct ChainClient {
    /// HTTP client for making requests
    client: Client,
    /// Chain name for log lines
    name: String,
    /// Base URL of the node
    base_url: String,
    /// Operator account the node signs relay transactions with
    operator_addr: String,
    /// Bound on waiting for a submitted transaction's receipt
    send_timeout: Duration,
}

impl ChainClient {
    /// Creates a new chain client.
    ///
    /// # Arguments
    ///
    /// * `name` - Chain name used in log lines
    /// * `rpc_url` - Base URL of the JSON-RPC node
    /// * `operator_addr` - Account the node signs relay transactions with
    /// * `send_timeout` - Bound on waiting for transaction inclusion
    pub fn new(
        name: &str,
        rpc_url: &str,
        operator_addr: &str,
        send_timeout: Duration,
    ) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChainError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            name: name.to_string(),
            base_url: rpc_url.to_string(),
            operator_addr: operator_addr.to_string(),
            send_timeout,
        })
    }

    /// Chain name used in log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Performs a JSON-RPC request, classifying node errors.
    async fn rpc<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<T>, ChainError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Transport(format!("{}: {}", self.name, e)))?;

        let body: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Transport(format!("{}: invalid response: {}", self.name, e)))?;

        if let Some(error) = body.error {
            return Err(classify_rpc_error(&error.message));
        }

        Ok(body.result)
    }

    /// Reads the current head block number.
    pub async fn get_block_number(&self) -> Result<u64, ChainError> {
        let result: Option<String> = self.rpc("eth_blockNumber", vec![]).await?;
        let value = result
            .ok_or_else(|| ChainError::Transport("empty eth_blockNumber result".to_string()))?;
        parse_hex_u64(&value)
    }

    /// Fetches logs for one event signature in an inclusive block range.
    pub async fn get_logs(
        &self,
        contract_addr: &str,
        event_signature: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>, ChainError> {
        let filter = serde_json::json!({
            "address": contract_addr,
            "topics": [event_topic(event_signature)],
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
        });

        let result: Option<Vec<RawLog>> = self.rpc("eth_getLogs", vec![filter]).await?;
        let raw_logs = result.unwrap_or_default();

        let mut logs = Vec::with_capacity(raw_logs.len());
        for raw in raw_logs {
            let data_body = raw.data.strip_prefix("0x").unwrap_or(&raw.data);
            logs.push(LogEntry {
                address: raw.address,
                topics: raw.topics,
                data: hex::decode(data_body)
                    .map_err(|e| ChainError::Transport(format!("invalid log data: {}", e)))?,
                block_number: parse_hex_u64(&raw.block_number)?,
                transaction_hash: raw.transaction_hash,
                log_index: parse_hex_u64(&raw.log_index)?,
            });
        }
        Ok(logs)
    }

    /// Performs a read-only contract call with raw calldata.
    pub async fn call(&self, contract_addr: &str, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let params = vec![
            serde_json::json!({
                "to": contract_addr,
                "data": format!("0x{}", hex::encode(&data)),
            }),
            serde_json::json!("latest"),
        ];

        let result: Option<String> = self.rpc("eth_call", params).await?;
        let value =
            result.ok_or_else(|| ChainError::Transport("empty eth_call result".to_string()))?;
        let body = value.strip_prefix("0x").unwrap_or(&value);
        hex::decode(body)
            .map_err(|e| ChainError::Transport(format!("invalid eth_call result: {}", e)))
    }

    /// Encodes and performs a read-only function call.
    pub async fn call_function(
        &self,
        contract_addr: &str,
        signature: &str,
        tokens: &[AbiToken],
    ) -> Result<Vec<u8>, ChainError> {
        let data = encode_call(signature, tokens)?;
        self.call(contract_addr, data).await
    }

    /// Submits a transaction from the operator account and waits for its
    /// receipt, up to the configured timeout.
    ///
    /// A mined receipt with failed status is a permanent logic failure; the
    /// revert reason is not recoverable from the receipt, so callers get the
    /// transaction hash for manual inspection.
    pub async fn send(&self, contract_addr: &str, data: Vec<u8>) -> Result<TxReceipt, ChainError> {
        let params = vec![serde_json::json!({
            "from": self.operator_addr,
            "to": contract_addr,
            "data": format!("0x{}", hex::encode(&data)),
        })];

        let result: Option<String> = self.rpc("eth_sendTransaction", params).await?;
        let tx_hash = result
            .ok_or_else(|| ChainError::Transport("empty eth_sendTransaction result".to_string()))?;

        debug!("{}: submitted transaction {}", self.name, tx_hash);
        self.wait_for_receipt(&tx_hash).await
    }

    /// Encodes and submits a state-changing function call.
    pub async fn send_function(
        &self,
        contract_addr: &str,
        signature: &str,
        tokens: &[AbiToken],
    ) -> Result<TxReceipt, ChainError> {
        let data = encode_call(signature, tokens)?;
        self.send(contract_addr, data).await
    }

    /// Polls for a transaction receipt until inclusion or timeout.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, ChainError> {
        let deadline = tokio::time::Instant::now() + self.send_timeout;

        loop {
            let result: Option<RawReceipt> = self
                .rpc(
                    "eth_getTransactionReceipt",
                    vec![serde_json::json!(tx_hash)],
                )
                .await?;

            if let Some(receipt) = result {
                if parse_hex_u64(&receipt.status)? == 1 {
                    return Ok(TxReceipt {
                        transaction_hash: receipt.transaction_hash,
                        block_number: parse_hex_u64(&receipt.block_number)?,
                    });
                }
                return Err(ChainError::Reverted(format!(
                    "transaction {} reverted on chain",
                    tx_hash
                )));
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ChainError::ConfirmationTimeout(tx_hash.to_string()));
            }
            tokio::time::sleep(Duration::from_millis(RECEIPT_POLL_INTERVAL_MS)).await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
