//! Unit tests for the finalizer
//!
//! These tests verify challenge-period respect and the two-step
//! finalize/mint sequence against a mock destination node.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trusted_relay::api::StatusRegistry;
use trusted_relay::chain_client::selector;
use trusted_relay::finalizer::Finalizer;

#[path = "helpers.rs"]
mod helpers;
use helpers::{
    encode_result_words, message_call_result, mock_receipt_success, rpc_error, rpc_result,
    test_chain_client, test_chain_config, CHAIN_B_ID,
};

const INBOX_ADDR: &str = "0x2000000000000000000000000000000000000002";
const SETTLEMENT_ADDR: &str = "0x3000000000000000000000000000000000000003";

const PENDING: u64 = 0;
const CHALLENGED: u64 = 1;
const FINALIZED: u64 = 2;

fn intent_hash() -> String {
    format!("0x{}", "ab".repeat(32))
}

fn message_hash_word() -> [u8; 32] {
    [0xcd; 32]
}

fn sel_hex(signature: &str) -> String {
    hex::encode(selector(signature))
}

/// Builds a finalizer against the mock server.
fn build_finalizer(server: &MockServer) -> (Finalizer, Arc<StatusRegistry>) {
    let registry = Arc::new(StatusRegistry::new());
    let chain_cfg = test_chain_config("Chain B", &server.uri(), CHAIN_B_ID);
    let finalizer = Finalizer::new(
        test_chain_client(&server.uri(), "Chain B"),
        &chain_cfg,
        None,
        registry.register_finalizer("Chain B"),
    );
    (finalizer, registry)
}

/// Mounts the inbox view calls: one pending message in the given state.
async fn mock_inbox_views(server: &MockServer, state: u64) {
    // getPendingCount() -> 1
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .and(body_string_contains(&sel_hex("getPendingCount()")))
        .respond_with(rpc_result(json!(encode_result_words(&[{
            let mut word = [0u8; 32];
            word[31] = 1;
            word
        }]))))
        .mount(server)
        .await;
    // pendingMessages(0) -> message hash
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .and(body_string_contains(&sel_hex("pendingMessages(uint256)")))
        .respond_with(rpc_result(json!(encode_result_words(&[
            message_hash_word()
        ]))))
        .mount(server)
        .await;
    // getMessage(hash) -> record in the requested state
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .and(body_string_contains(&sel_hex("getMessage(bytes32)")))
        .respond_with(rpc_result(json!(message_call_result(
            &intent_hash(),
            state,
            1_700_000_000,
            1_700_000_600,
        ))))
        .mount(server)
        .await;
}

/// getTimeRemaining eth_call response for a fixed value.
fn time_remaining_response(seconds: u64) -> ResponseTemplate {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&seconds.to_be_bytes());
    rpc_result(json!(encode_result_words(&[word])))
}

async fn mock_time_remaining(server: &MockServer, seconds: u64) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .and(body_string_contains(&sel_hex("getTimeRemaining(bytes32)")))
        .respond_with(time_remaining_response(seconds))
        .mount(server)
        .await;
}

/// Mounts a sendTransaction expectation for one contract address.
async fn expect_sends(server: &MockServer, contract_addr: &str, count: u64) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_sendTransaction" })))
        .and(body_string_contains(contract_addr))
        .respond_with(rpc_result(json!(
            "0xfeed000000000000000000000000000000000000000000000000000000000009"
        )))
        .expect(count)
        .mount(server)
        .await;
}

// ============================================================================
// TESTS
// ============================================================================

/// Test that finalize is never called while the challenge period is running
#[tokio::test]
async fn test_respects_challenge_period() {
    let server = MockServer::start().await;
    mock_inbox_views(&server, PENDING).await;
    mock_time_remaining(&server, 120).await;
    expect_sends(&server, INBOX_ADDR, 0).await;
    expect_sends(&server, SETTLEMENT_ADDR, 0).await;

    let (finalizer, _) = build_finalizer(&server);
    finalizer.poll_once().await.unwrap();
}

/// Test the two-step sequence once the challenge period has elapsed
#[tokio::test]
async fn test_finalizes_and_mints_when_period_elapsed() {
    let server = MockServer::start().await;
    mock_inbox_views(&server, PENDING).await;
    mock_time_remaining(&server, 0).await;
    expect_sends(&server, INBOX_ADDR, 1).await;
    expect_sends(&server, SETTLEMENT_ADDR, 1).await;
    mock_receipt_success(&server).await;

    let (finalizer, registry) = build_finalizer(&server);
    finalizer.poll_once().await.unwrap();

    let snapshot = registry.snapshot();
    assert_eq!(snapshot["finalizers"][0]["finalized"], 1);
    assert_eq!(snapshot["finalizers"][0]["minted"], 1);
}

/// Test that no action happens on the first tick with time remaining and the
/// sequence runs on the first tick where it reaches zero
#[tokio::test]
async fn test_settles_on_first_tick_at_zero() {
    let server = MockServer::start().await;
    mock_inbox_views(&server, PENDING).await;

    // First tick: 600s remaining; afterwards: 0
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .and(body_string_contains(&sel_hex("getTimeRemaining(bytes32)")))
        .respond_with(time_remaining_response(600))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mock_time_remaining(&server, 0).await;

    expect_sends(&server, INBOX_ADDR, 1).await;
    expect_sends(&server, SETTLEMENT_ADDR, 1).await;
    mock_receipt_success(&server).await;

    let (finalizer, _) = build_finalizer(&server);
    finalizer.poll_once().await.unwrap();
    finalizer.poll_once().await.unwrap();
}

/// Test that a message finalized by a previous run gets its mint retried
/// Why: a crash between finalize and mint must be repairable
#[tokio::test]
async fn test_retries_mint_for_finalized_message() {
    let server = MockServer::start().await;
    mock_inbox_views(&server, FINALIZED).await;
    expect_sends(&server, INBOX_ADDR, 0).await;
    expect_sends(&server, SETTLEMENT_ADDR, 1).await;
    mock_receipt_success(&server).await;

    let (finalizer, registry) = build_finalizer(&server);
    finalizer.poll_once().await.unwrap();

    let snapshot = registry.snapshot();
    assert_eq!(snapshot["finalizers"][0]["minted"], 1);
}

/// Test that challenged messages are left untouched
#[tokio::test]
async fn test_skips_challenged_message() {
    let server = MockServer::start().await;
    mock_inbox_views(&server, CHALLENGED).await;
    expect_sends(&server, INBOX_ADDR, 0).await;
    expect_sends(&server, SETTLEMENT_ADDR, 0).await;

    let (finalizer, _) = build_finalizer(&server);
    finalizer.poll_once().await.unwrap();
}

/// Test that a duplicate mint revert counts as settled
#[tokio::test]
async fn test_duplicate_mint_is_settled() {
    let server = MockServer::start().await;
    mock_inbox_views(&server, FINALIZED).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_sendTransaction" })))
        .and(body_string_contains(SETTLEMENT_ADDR))
        .respond_with(rpc_error("execution reverted: already minted"))
        .expect(1)
        .mount(&server)
        .await;

    let (finalizer, registry) = build_finalizer(&server);
    finalizer.poll_once().await.unwrap();

    // Settled through the on-chain guard, not a fresh mint
    let snapshot = registry.snapshot();
    assert_eq!(snapshot["finalizers"][0]["minted"], 0);
}
