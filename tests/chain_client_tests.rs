//! Unit tests for the chain client
//!
//! These tests verify JSON-RPC request/response handling against a mock
//! node: hex parsing, log queries, transaction submission, receipt waiting,
//! and the transient/permanent error classification.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trusted_relay::chain_client::{event_topic, AbiToken, ChainClient, ChainError};

#[path = "helpers.rs"]
mod helpers;
use helpers::{
    intent_committed_log, mock_rpc_method, mock_send_success, rpc_error, rpc_result, sample_intent,
    test_chain_client,
};

// ============================================================================
// TESTS
// ============================================================================

/// Test that the head height is parsed from its hex quantity
#[tokio::test]
async fn test_get_block_number() {
    let server = MockServer::start().await;
    mock_rpc_method(&server, "eth_blockNumber", rpc_result(json!("0x67"))).await;

    let client = test_chain_client(&server.uri(), "test");
    assert_eq!(client.get_block_number().await.unwrap(), 103);
}

/// Test that get_logs filters by topic0 and decodes quantities
#[tokio::test]
async fn test_get_logs_filters_and_parses() {
    let server = MockServer::start().await;
    let intent = sample_intent();

    // Assert the filter carries the keccak topic for the event signature
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({
            "method": "eth_getLogs",
            "params": [{
                "topics": [event_topic(
                    "IntentCommitted(bytes32,address,uint64,uint64,address,uint256,address,uint64,uint64)"
                )],
                "fromBlock": "0x64",
                "toBlock": "0x67",
            }],
        })))
        .respond_with(rpc_result(json!([intent_committed_log(&intent, 100)])))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_chain_client(&server.uri(), "test");
    let logs = client
        .get_logs(
            "0x1000000000000000000000000000000000000001",
            "IntentCommitted(bytes32,address,uint64,uint64,address,uint256,address,uint64,uint64)",
            100,
            103,
        )
        .await
        .unwrap();

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].block_number, 100);
    assert_eq!(logs[0].topics.len(), 3);
    assert_eq!(logs[0].data.len(), 7 * 32);
}

/// Test that send waits for a successful receipt
#[tokio::test]
async fn test_send_waits_for_receipt() {
    let server = MockServer::start().await;
    mock_send_success(&server).await;

    let client = test_chain_client(&server.uri(), "test");
    let receipt = client
        .send_function(
            "0x2000000000000000000000000000000000000002",
            "finalize(bytes32)",
            &[AbiToken::FixedBytes([0xaa; 32])],
        )
        .await
        .unwrap();

    assert_eq!(receipt.block_number, 16);
    assert!(receipt.transaction_hash.starts_with("0xfeed"));
}

/// Test that a duplicate revert is classified as permanent-duplicate
/// Why: the submitter treats duplicates as success; misclassifying one as
/// transient would retry forever
#[tokio::test]
async fn test_send_classifies_duplicate_revert() {
    let server = MockServer::start().await;
    mock_rpc_method(
        &server,
        "eth_sendTransaction",
        rpc_error("execution reverted: message already exists"),
    )
    .await;

    let client = test_chain_client(&server.uri(), "test");
    let err = client
        .send("0x2000000000000000000000000000000000000002", vec![0x01])
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::Duplicate(_)));
    assert!(!err.is_transient());
}

/// Test that a mined-but-failed receipt is a permanent failure
#[tokio::test]
async fn test_send_reverted_receipt_is_permanent() {
    let server = MockServer::start().await;
    mock_rpc_method(
        &server,
        "eth_sendTransaction",
        rpc_result(json!(
            "0xfeed000000000000000000000000000000000000000000000000000000000002"
        )),
    )
    .await;
    mock_rpc_method(
        &server,
        "eth_getTransactionReceipt",
        rpc_result(json!({
            "transactionHash": "0xfeed000000000000000000000000000000000000000000000000000000000002",
            "blockNumber": "0x10",
            "status": "0x0",
        })),
    )
    .await;

    let client = test_chain_client(&server.uri(), "test");
    let err = client
        .send("0x2000000000000000000000000000000000000002", vec![0x01])
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::Reverted(_)));
}

/// Test that a missing receipt times out as a transient error
#[tokio::test]
async fn test_send_receipt_timeout_is_transient() {
    let server = MockServer::start().await;
    mock_rpc_method(
        &server,
        "eth_sendTransaction",
        rpc_result(json!(
            "0xfeed000000000000000000000000000000000000000000000000000000000003"
        )),
    )
    .await;
    // Receipt never appears
    mock_rpc_method(&server, "eth_getTransactionReceipt", rpc_result(json!(null))).await;

    let client = ChainClient::new(
        "test",
        &server.uri(),
        "0x4000000000000000000000000000000000000004",
        Duration::from_millis(100),
    )
    .unwrap();

    let err = client
        .send("0x2000000000000000000000000000000000000002", vec![0x01])
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::ConfirmationTimeout(_)));
    assert!(err.is_transient());
}

/// Test that an unreachable node surfaces as a transient transport error
#[tokio::test]
async fn test_unreachable_node_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = test_chain_client(&server.uri(), "test");
    let err = client.get_block_number().await.unwrap_err();
    assert!(matches!(err, ChainError::Transport(_)));
    assert!(err.is_transient());
}

/// Test that eth_call results are returned as raw bytes
#[tokio::test]
async fn test_call_returns_bytes() {
    let server = MockServer::start().await;
    mock_rpc_method(
        &server,
        "eth_call",
        rpc_result(json!(format!("0x{}", "00".repeat(31) + "05"))),
    )
    .await;

    let client = test_chain_client(&server.uri(), "test");
    let data = client
        .call_function("0x2000000000000000000000000000000000000002", "getPendingCount()", &[])
        .await
        .unwrap();

    assert_eq!(data.len(), 32);
    assert_eq!(data[31], 5);
}
