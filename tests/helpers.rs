//! Shared test helpers
//!
//! Builders for test configs, sample intents, and mock JSON-RPC /
//! document-store responses used across the integration test files.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trusted_relay::api::{DirectionStatus, StatusRegistry};
use trusted_relay::chain_client::{event_topic, word_from_address, word_from_u128, ChainClient};
use trusted_relay::config::{ApiConfig, ChainEndpointConfig, Config, DirectionConfig, RelayerConfig};
use trusted_relay::crypto::CryptoService;
use trusted_relay::storage::{LedgerClient, ProcessedSet};
use trusted_relay::submitter::Submitter;
use trusted_relay::types::Intent;
use trusted_relay::watcher::{Watcher, INTENT_COMMITTED_SIG};

/// Deterministic test attestation key (valid secp256k1 scalar).
pub const TEST_SIGNING_KEY: &str =
    "0x1111111111111111111111111111111111111111111111111111111111111111";

pub const TOKEN_ADDR: &str = "0x00000000000000000000000000000000000000aa";
pub const RECIPIENT_ADDR: &str = "0x00000000000000000000000000000000000000bb";
pub const USER_ADDR: &str = "0x00000000000000000000000000000000000000cc";

pub const CHAIN_A_ID: u64 = 31337;
pub const CHAIN_B_ID: u64 = 31338;

// ============================================================================
// CONFIG AND COMPONENT BUILDERS
// ============================================================================

/// Chain endpoint config pointing at a mock RPC server.
pub fn test_chain_config(name: &str, rpc_url: &str, chain_id: u64) -> ChainEndpointConfig {
    ChainEndpointConfig {
        name: name.to_string(),
        rpc_url: rpc_url.to_string(),
        chain_id,
        intent_store_addr: "0x1000000000000000000000000000000000000001".to_string(),
        inbox_addr: "0x2000000000000000000000000000000000000002".to_string(),
        settlement_addr: "0x3000000000000000000000000000000000000003".to_string(),
        operator_addr: "0x4000000000000000000000000000000000000004".to_string(),
    }
}

pub fn test_direction_config(required_confirmations: u64, start_block: Option<u64>) -> DirectionConfig {
    DirectionConfig {
        required_confirmations,
        poll_interval_ms: 100,
        confirmation_timeout_secs: 300,
        start_block,
    }
}

/// Full config for config/validation tests. `key_env` should be unique per
/// test so parallel tests do not race on the environment.
pub fn build_test_config(rpc_a: &str, rpc_b: &str, key_env: &str) -> Config {
    Config {
        chain_a: test_chain_config("Chain A", rpc_a, CHAIN_A_ID),
        chain_b: test_chain_config("Chain B", rpc_b, CHAIN_B_ID),
        a_to_b: test_direction_config(3, None),
        b_to_a: test_direction_config(3, None),
        relayer: RelayerConfig {
            signing_key_env: key_env.to_string(),
            relayer_addr: None,
            finalize_interval_ms: 1000,
            send_timeout_secs: 5,
        },
        ledger: None,
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
    }
}

pub fn sample_intent() -> Intent {
    Intent {
        user: USER_ADDR.to_string(),
        src_chain_id: CHAIN_A_ID,
        dst_chain_id: CHAIN_B_ID,
        token: TOKEN_ADDR.to_string(),
        amount: 2_500_000,
        recipient: RECIPIENT_ADDR.to_string(),
        nonce: 7,
        expiry: 0,
        intent_hash: format!("0x{}", "ab".repeat(32)),
    }
}

pub fn test_chain_client(rpc_url: &str, name: &str) -> Arc<ChainClient> {
    Arc::new(
        ChainClient::new(
            name,
            rpc_url,
            "0x4000000000000000000000000000000000000004",
            Duration::from_secs(5),
        )
        .expect("Failed to create chain client"),
    )
}

/// A fully wired directional pipeline against mock RPC servers.
pub struct TestPipeline {
    pub watcher: Arc<Watcher>,
    pub submitter: Arc<Submitter>,
    pub processed: Arc<ProcessedSet>,
    pub status: Arc<DirectionStatus>,
}

/// Builds an A→B pipeline: watches `src_rpc`, submits to `dst_rpc`.
pub fn build_test_pipeline(
    src_rpc: &str,
    dst_rpc: &str,
    required_confirmations: u64,
    start_block: Option<u64>,
    ledger: Option<Arc<LedgerClient>>,
) -> TestPipeline {
    let registry = StatusRegistry::new();
    let status = registry.register_direction("a_to_b");

    let source_chain = test_chain_config("Chain A", src_rpc, CHAIN_A_ID);
    let dest_chain = test_chain_config("Chain B", dst_rpc, CHAIN_B_ID);

    let signer = Arc::new(
        CryptoService::from_key_hex(TEST_SIGNING_KEY).expect("Failed to create crypto service"),
    );
    let processed = Arc::new(ProcessedSet::new(ledger.clone()));

    let submitter = Arc::new(Submitter::new(
        "a_to_b",
        test_chain_client(dst_rpc, "Chain B"),
        signer,
        processed.clone(),
        ledger,
        &dest_chain.inbox_addr,
        status.clone(),
    ));

    let watcher = Arc::new(Watcher::new(
        "a_to_b",
        test_direction_config(required_confirmations, start_block),
        test_chain_client(src_rpc, "Chain A"),
        &source_chain,
        dest_chain.chain_id,
        submitter.clone(),
        processed.clone(),
        status.clone(),
    ));

    TestPipeline {
        watcher,
        submitter,
        processed,
        status,
    }
}

// ============================================================================
// MOCK JSON-RPC HELPERS
// ============================================================================

/// Successful JSON-RPC response body.
pub fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result,
    }))
}

/// JSON-RPC error response body (the node rejected the request).
pub fn rpc_error(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": -32000, "message": message },
    }))
}

/// Mounts a mock for one JSON-RPC method.
pub async fn mock_rpc_method(server: &MockServer, rpc_method: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mounts a success receipt for any transaction hash.
pub async fn mock_receipt_success(server: &MockServer) {
    mock_rpc_method(
        server,
        "eth_getTransactionReceipt",
        rpc_result(json!({
            "transactionHash": "0xfeed000000000000000000000000000000000000000000000000000000000001",
            "blockNumber": "0x10",
            "status": "0x1",
        })),
    )
    .await;
}

/// Mounts eth_sendTransaction returning a fixed hash, plus a success receipt.
pub async fn mock_send_success(server: &MockServer) {
    mock_rpc_method(
        server,
        "eth_sendTransaction",
        rpc_result(json!(
            "0xfeed000000000000000000000000000000000000000000000000000000000001"
        )),
    )
    .await;
    mock_receipt_success(server).await;
}

// ============================================================================
// EVENT AND CALL-RESULT ENCODING
// ============================================================================

/// Hex string of concatenated 32-byte words, for eth_call results.
pub fn encode_result_words(words: &[[u8; 32]]) -> String {
    let mut out = String::from("0x");
    for word in words {
        out.push_str(&hex::encode(word));
    }
    out
}

/// Builds the eth_getLogs JSON entry for an IntentCommitted event.
pub fn intent_committed_log(intent: &Intent, block_number: u64) -> serde_json::Value {
    let user_word = word_from_address(&intent.user).expect("bad user address");
    let mut data = Vec::new();
    data.extend_from_slice(&word_from_u128(intent.src_chain_id as u128));
    data.extend_from_slice(&word_from_u128(intent.dst_chain_id as u128));
    data.extend_from_slice(&word_from_address(&intent.token).expect("bad token address"));
    data.extend_from_slice(&word_from_u128(intent.amount));
    data.extend_from_slice(&word_from_address(&intent.recipient).expect("bad recipient address"));
    data.extend_from_slice(&word_from_u128(intent.nonce as u128));
    data.extend_from_slice(&word_from_u128(intent.expiry as u128));

    json!({
        "address": "0x1000000000000000000000000000000000000001",
        "topics": [
            event_topic(INTENT_COMMITTED_SIG),
            intent.intent_hash,
            format!("0x{}", hex::encode(user_word)),
        ],
        "data": format!("0x{}", hex::encode(data)),
        "blockNumber": format!("0x{:x}", block_number),
        "transactionHash": "0xdead000000000000000000000000000000000000000000000000000000000001",
        "logIndex": "0x0",
    })
}

/// Encodes a getMessage eth_call result.
///
/// Word layout: intent hash, state, submittedAt, challengePeriodEnd,
/// challenger (zero = none).
pub fn message_call_result(
    intent_hash: &str,
    state: u64,
    submitted_at: u64,
    challenge_period_end: u64,
) -> String {
    let hash_body = intent_hash.strip_prefix("0x").unwrap_or(intent_hash);
    let mut hash_word = [0u8; 32];
    hash_word.copy_from_slice(&hex::decode(hash_body).expect("bad intent hash"));

    encode_result_words(&[
        hash_word,
        word_from_u128(state as u128),
        word_from_u128(submitted_at as u128),
        word_from_u128(challenge_period_end as u128),
        [0u8; 32],
    ])
}
