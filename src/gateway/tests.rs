//! End-to-end tests over the axum application

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use http::{Request, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use tower::ServiceExt;

use super::{build_router, AppState};
use crate::config::GatewayConfig;
use crate::facilitator::{FacilitatorAdapter, FacilitatorManager};
use crate::ledger::BatchLedger;
use crate::middleware::X402Middleware;
use crate::oracle::{PriceOracle, PriceSource};
use crate::registry::ProviderRegistry;
use crate::router::Router;
use crate::types::{
    ExactEvmAuthorization, ExactEvmPayload, FacilitatorKind, PaymentData, PaymentPayload,
    Provider, PaymentRequirements, SettleOutcome, VerifyOutcome,
};
use crate::Result;

const WALLET: &str = "GatewayWallet111";

struct FixedSource;

#[async_trait]
impl PriceSource for FixedSource {
    async fn usd_price(&self, _asset: &str) -> Result<Decimal> {
        Ok(Decimal::from(150u32))
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

struct ScriptedAdapter {
    verify_valid: bool,
    settle_ok: bool,
}

#[async_trait]
impl FacilitatorAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "self-hosted"
    }

    fn kind(&self) -> FacilitatorKind {
        FacilitatorKind::SelfHosted
    }

    fn available(&self) -> bool {
        true
    }

    async fn verify(
        &self,
        _payload: &PaymentPayload,
        _requirements: &PaymentRequirements,
    ) -> Result<VerifyOutcome> {
        if self.verify_valid {
            Ok(VerifyOutcome::valid(Some("Payer111".to_string())))
        } else {
            Ok(VerifyOutcome::invalid("scripted rejection"))
        }
    }

    async fn settle(
        &self,
        _payload: &PaymentPayload,
        _requirements: &PaymentRequirements,
    ) -> Result<SettleOutcome> {
        if self.settle_ok {
            Ok(SettleOutcome::settled("abc123", Some("Payer111".to_string())))
        } else {
            Ok(SettleOutcome::failed("scripted settle failure"))
        }
    }
}

fn test_state(provider_url: &str) -> AppState {
    test_state_with(
        provider_url,
        ScriptedAdapter {
            verify_valid: true,
            settle_ok: true,
        },
    )
}

fn test_state_with(provider_url: &str, adapter: ScriptedAdapter) -> AppState {
    let registry = Arc::new(ProviderRegistry::new());
    registry
        .register(
            Provider::new(
                "helius",
                "Helius",
                vec!["solana".to_string()],
                provider_url,
                Decimal::from_str("0.00015").unwrap(),
            )
            .with_priority(10)
            .with_batch_cost(1000, Decimal::from_str("0.08").unwrap()),
        )
        .unwrap();

    let router = Arc::new(Router::new(Arc::clone(&registry)));
    let manager = Arc::new(FacilitatorManager::new(Arc::new(adapter), None));
    let ledger = Arc::new(BatchLedger::new());
    let oracle = Arc::new(PriceOracle::new(Arc::new(FixedSource)));
    let middleware = Arc::new(X402Middleware::new(
        Arc::clone(&router),
        Arc::clone(&manager),
        Arc::clone(&ledger),
        Arc::clone(&oracle),
        WALLET,
        "USDC",
    ));
    let config = Arc::new(GatewayConfig {
        port: 8402,
        host: "127.0.0.1".to_string(),
        pay_to: WALLET.to_string(),
        public_url: "https://gateway.example".to_string(),
        settlement_asset: "USDC".to_string(),
        health_check_interval: Duration::from_secs(60),
    });

    AppState {
        registry,
        router,
        manager,
        ledger,
        middleware,
        config,
        http: reqwest::Client::new(),
    }
}

fn payment_header(batch_purchase: bool) -> String {
    let payload = PaymentPayload::new(
        "exact",
        "solana",
        PaymentData::Evm(ExactEvmPayload {
            signature: "0x2d6a".to_string(),
            authorization: ExactEvmAuthorization {
                from: "Payer111".to_string(),
                to: WALLET.to_string(),
                value: "150".to_string(),
                valid_after: "0".to_string(),
                valid_before: "99999999999".to_string(),
                nonce: "0xf374".to_string(),
            },
        }),
    );
    json!({
        "paymentPayload": payload,
        "paymentRequirements": {
            "scheme": "exact",
            "network": "solana",
            "maxAmountRequired": "150",
            "asset": "USDC",
            "payTo": WALLET,
            "resource": "https://gateway.example/rpc",
            "description": "RPC access",
            "maxTimeoutSeconds": 60
        },
        "batchPurchase": batch_purchase
    })
    .to_string()
}

async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
    let app = build_router(state);
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (status, body) = send(test_state("https://rpc.example"), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["providers"]["total"], 1);
}

#[tokio::test]
async fn test_providers_endpoints() {
    let state = test_state("https://rpc.example");
    let (status, body) = send(state.clone(), get("/providers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["providers"][0]["id"], "helius");

    let (status, body) = send(state.clone(), get("/providers/helius")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"]["name"], "Helius");
    assert_eq!(body["health"]["status"], "healthy");

    let (status, _) = send(state, get("/providers/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_facilitator_endpoint() {
    let (status, body) = send(test_state("https://rpc.example"), get("/facilitator")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["primary"]["name"], "self-hosted");
    assert_eq!(body["primary"]["type"], "self-hosted");
    assert_eq!(body["primary"]["available"], true);
}

#[tokio::test]
async fn test_rpc_methods_endpoint() {
    let state = test_state("https://rpc.example");
    let (status, body) = send(state.clone(), get("/rpc-methods?chain=solana")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["methods"]
        .as_array()
        .unwrap()
        .contains(&json!("getSlot")));

    let (status, _) = send(state, get("/rpc-methods?chain=near")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_pricing_endpoint() {
    let (status, body) = send(
        test_state("https://rpc.example"),
        get("/batch-pricing?chain=solana"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let offer = &body["offers"][0];
    assert_eq!(offer["providerId"], "helius");
    assert_eq!(offer["calls"], 1000);
    assert_eq!(offer["savings"], "46.7%");
}

#[tokio::test]
async fn test_unchallenged_call_gets_402() {
    let (status, body) = send(
        test_state("https://rpc.example"),
        post_json("/rpc", json!({"method": "getSlot", "chain": "solana"})),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["x402Version"], 1);
    let accepts = &body["accepts"][0];
    assert_eq!(accepts["scheme"], "exact");
    assert_eq!(accepts["network"], "solana");
    assert_eq!(accepts["maxAmountRequired"], "150");
    assert_eq!(accepts["asset"], "USDC");
    assert_eq!(accepts["payTo"], WALLET);
    assert_eq!(accepts["resource"], "https://gateway.example/rpc");
    assert_eq!(accepts["extra"]["facilitator"]["primary"], "self-hosted");
    assert!(accepts["extra"]["nonce"].as_str().unwrap().contains('-'));
}

#[tokio::test]
async fn test_paid_call_success_envelope() {
    let mut upstream = mockito::Server::new_async().await;
    let _mock = upstream
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":12345678}"#)
        .create_async()
        .await;

    let request = post_json("/rpc", json!({"method": "getSlot", "chain": "solana"}));
    let (mut parts, body) = request.into_parts();
    parts
        .headers
        .insert("x402-payment", payment_header(false).parse().unwrap());
    let request = Request::from_parts(parts, body);

    let (status, body) = send(test_state(&upstream.url()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["result"], 12345678);
    assert_eq!(body["x402"]["provider"], "Helius");
    assert_eq!(body["x402"]["cost"], "0.00015");
    assert_eq!(body["x402"]["status"], "settled");
    assert_eq!(body["x402"]["paymentInfo"]["chain"], "solana");
    assert_eq!(body["x402"]["paymentInfo"]["txHash"], "abc123");
    assert_eq!(body["x402"]["paymentInfo"]["payer"], "Payer111");
    assert_eq!(
        body["x402"]["paymentInfo"]["explorer"],
        "https://orb.helius.dev/tx/abc123"
    );
}

#[tokio::test]
async fn test_settled_but_upstream_failed() {
    let mut upstream = mockito::Server::new_async().await;
    let _mock = upstream
        .mock("POST", "/")
        .with_status(500)
        .expect_at_least(1)
        .create_async()
        .await;

    let request = post_json("/rpc", json!({"method": "getSlot", "chain": "solana"}));
    let (mut parts, body) = request.into_parts();
    parts
        .headers
        .insert("x402-payment", payment_header(false).parse().unwrap());
    let request = Request::from_parts(parts, body);

    let (status, body) = send(test_state(&upstream.url()), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], -32603);
    // The payment is still settled and auditable.
    assert_eq!(body["x402"]["status"], "settled");
    assert_eq!(body["x402"]["paymentInfo"]["txHash"], "abc123");
    assert!(body["x402"]["note"]
        .as_str()
        .unwrap()
        .contains("upstream failed"));
}

#[tokio::test]
async fn test_verification_failure_is_402_with_details() {
    let state = test_state_with(
        "https://rpc.example",
        ScriptedAdapter {
            verify_valid: false,
            settle_ok: false,
        },
    );
    let request = post_json("/rpc", json!({"method": "getSlot", "chain": "solana"}));
    let (mut parts, body) = request.into_parts();
    parts
        .headers
        .insert("x402-payment", payment_header(false).parse().unwrap());
    let request = Request::from_parts(parts, body);

    let (status, body) = send(state, request).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "Payment verification failed");
    assert_eq!(body["details"], "scripted rejection");
    assert_eq!(body["facilitator"], "self-hosted");
    // Challenge stays replayable.
    assert_eq!(body["accepts"][0]["maxAmountRequired"], "150");
}

#[tokio::test]
async fn test_batch_purchase_then_spend() {
    let mut upstream = mockito::Server::new_async().await;
    let _mock = upstream
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"slot"}"#)
        .create_async()
        .await;
    let state = test_state(&upstream.url());

    // Purchase.
    let request = post_json("/rpc", json!({"method": "getSlot", "chain": "solana"}));
    let (mut parts, body) = request.into_parts();
    parts
        .headers
        .insert("x402-payment", payment_header(true).parse().unwrap());
    let request = Request::from_parts(parts, body);
    let (status, body) = send(state.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["batch"]["calls"], 1000);
    assert_eq!(body["txHash"], "abc123");
    let batch_id = body["batch"]["batchId"].as_str().unwrap().to_string();

    // Spend.
    let request = post_json("/rpc", json!({"method": "getSlot", "chain": "solana"}));
    let (mut parts, req_body) = request.into_parts();
    parts.headers.insert(
        "x402-batch",
        json!({"batchId": batch_id}).to_string().parse().unwrap(),
    );
    let request = Request::from_parts(parts, req_body);
    let (status, body) = send(state.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["x402"]["status"], "settled");
    // No new settlement transaction for a batch spend.
    assert_eq!(body["x402"]["paymentInfo"]["txHash"], "");
    assert!(body["x402"]["note"].as_str().unwrap().contains("999"));
    assert_eq!(
        state.ledger.describe(&batch_id).unwrap().calls_remaining,
        999
    );
}

#[tokio::test]
async fn test_missing_method_is_400() {
    let (status, body) = send(
        test_state("https://rpc.example"),
        post_json("/rpc", json!({"chain": "solana"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn test_unknown_chain_is_400() {
    let (status, _) = send(
        test_state("https://rpc.example"),
        post_json("/rpc", json!({"method": "getSlot", "chain": "near"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_no_provider_is_400() {
    // The only registered provider serves solana; base has nobody.
    let (status, body) = send(
        test_state("https://rpc.example"),
        post_json("/rpc", json!({"method": "eth_blockNumber", "chain": "base"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("base"));
}

#[tokio::test]
async fn test_proxy_allows_read_methods() {
    let mut upstream = mockito::Server::new_async().await;
    let _mock = upstream
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":4242}"#)
        .create_async()
        .await;

    let (status, body) = send(
        test_state(&upstream.url()),
        post_json(
            "/chain-rpc-proxy",
            json!({"method": "getSlot", "chain": "solana"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], 4242);
}

#[tokio::test]
async fn test_proxy_rejects_write_methods() {
    let (status, body) = send(
        test_state("https://rpc.example"),
        post_json(
            "/chain-rpc-proxy",
            json!({"method": "sendTransaction", "chain": "solana"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("allowlist"));
}

#[tokio::test]
async fn test_descriptor_endpoint() {
    let (status, body) = send(test_state("https://rpc.example"), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "x402-rpc-gateway");
    assert!(body["endpoints"]["POST /rpc"].is_string());
}
