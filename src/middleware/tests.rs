//! Tests for the payment pipeline

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

use super::payment::{validate_request, PaymentDecision, RpcCallRequest, X402Middleware};
use crate::facilitator::{FacilitatorAdapter, FacilitatorManager};
use crate::ledger::BatchLedger;
use crate::oracle::{PriceOracle, PriceSource};
use crate::registry::ProviderRegistry;
use crate::router::Router;
use crate::types::{
    ExactEvmAuthorization, ExactEvmPayload, FacilitatorKind, PaymentData, PaymentPayload,
    Provider, SettleOutcome, VerifyOutcome,
};
use crate::Result;

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
    name: &'static str,
    kind: FacilitatorKind,
    verify_valid: bool,
    settle_ok: bool,
    tx_hash: &'static str,
}

impl ScriptedAdapter {
    fn ok(name: &'static str, kind: FacilitatorKind) -> Self {
        Self {
            name,
            kind,
            verify_valid: true,
            settle_ok: true,
            tx_hash: "abc123",
        }
    }

    fn rejecting(name: &'static str, kind: FacilitatorKind) -> Self {
        Self {
            name,
            kind,
            verify_valid: false,
            settle_ok: false,
            tx_hash: "",
        }
    }

    fn verify_rejecting(name: &'static str, kind: FacilitatorKind) -> Self {
        Self {
            verify_valid: false,
            ..Self::ok(name, kind)
        }
    }
}

#[async_trait]
impl FacilitatorAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> FacilitatorKind {
        self.kind
    }

    fn available(&self) -> bool {
        true
    }

    async fn verify(
        &self,
        _payload: &PaymentPayload,
        _requirements: &crate::types::PaymentRequirements,
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
        _requirements: &crate::types::PaymentRequirements,
    ) -> Result<SettleOutcome> {
        if self.settle_ok {
            Ok(SettleOutcome::settled(self.tx_hash, Some("Payer111".to_string())))
        } else {
            Ok(SettleOutcome::failed("scripted settle failure"))
        }
    }
}

struct Fixture {
    middleware: X402Middleware,
    ledger: Arc<BatchLedger>,
}

fn fixture_with(adapter: ScriptedAdapter) -> Fixture {
    fixture_with_adapters(adapter, None)
}

fn fixture_with_adapters(primary: ScriptedAdapter, fallback: Option<ScriptedAdapter>) -> Fixture {
    let registry = Arc::new(ProviderRegistry::new());
    registry
        .register(
            Provider::new(
                "helius",
                "Helius",
                vec!["solana".to_string()],
                "https://mainnet.helius-rpc.com",
                Decimal::from_str("0.00015").unwrap(),
            )
            .with_batch_cost(1000, Decimal::from_str("0.08").unwrap())
            .with_priority(10),
        )
        .unwrap();

    let router = Arc::new(Router::new(registry));
    let manager = Arc::new(FacilitatorManager::new(
        Arc::new(primary),
        fallback.map(|adapter| Arc::new(adapter) as Arc<dyn FacilitatorAdapter>),
    ));
    let ledger = Arc::new(BatchLedger::new());
    let oracle = Arc::new(PriceOracle::new(Arc::new(FixedSource)));
    let middleware = X402Middleware::new(
        router,
        manager,
        Arc::clone(&ledger),
        oracle,
        "GatewayWallet111",
        "USDC",
    );
    Fixture { middleware, ledger }
}

fn fixture() -> Fixture {
    fixture_with(ScriptedAdapter::ok("self-hosted", FacilitatorKind::SelfHosted))
}

fn rpc_request() -> RpcCallRequest {
    serde_json::from_value(json!({
        "method": "getSlot",
        "chain": "solana"
    }))
    .unwrap()
}

fn payment_header(batch_purchase: bool) -> String {
    let payload = PaymentPayload::new(
        "exact",
        "solana",
        PaymentData::Evm(ExactEvmPayload {
            signature: "0x2d6a".to_string(),
            authorization: ExactEvmAuthorization {
                from: "Payer111".to_string(),
                to: "GatewayWallet111".to_string(),
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
            "payTo": "GatewayWallet111",
            "resource": "https://gateway.example/rpc",
            "description": "RPC access",
            "maxTimeoutSeconds": 60
        },
        "batchPurchase": batch_purchase
    })
    .to_string()
}

const RESOURCE: &str = "https://gateway.example/rpc";

#[tokio::test]
async fn test_bare_request_yields_challenge() {
    let fixture = fixture();
    let decision = fixture
        .middleware
        .process(&rpc_request(), None, None, RESOURCE)
        .await
        .unwrap();

    let challenge = match decision {
        PaymentDecision::Challenge(challenge) => challenge,
        other => panic!("expected challenge, got {:?}", other),
    };
    assert!(challenge.error.is_none());
    let accepts = &challenge.accepts[0];
    assert_eq!(accepts.scheme, "exact");
    assert_eq!(accepts.network, "solana");
    // 0.00015 USD in micro-USDC.
    assert_eq!(accepts.max_amount_required, "150");
    assert_eq!(accepts.asset, "USDC");
    assert_eq!(accepts.pay_to, "GatewayWallet111");
    assert_eq!(accepts.resource, RESOURCE);

    let extra = accepts.extra.as_ref().unwrap();
    assert_eq!(extra["provider"], "Helius");
    assert_eq!(extra["providerId"], "helius");
    assert_eq!(extra["facilitator"]["primary"], "self-hosted");
    assert_eq!(extra["facilitator"]["type"], "self-hosted");
    assert!(extra["nonce"].as_str().unwrap().contains('-'));
    assert_eq!(extra["batchOption"]["calls"], 1000);
    assert_eq!(extra["batchOption"]["savings"], "46.7%");
}

#[tokio::test]
async fn test_paid_call_settles_and_reports_amount() {
    let fixture = fixture();
    let header = payment_header(false);
    let decision = fixture
        .middleware
        .process(&rpc_request(), Some(&header), None, RESOURCE)
        .await
        .unwrap();

    match decision {
        PaymentDecision::Paid {
            settlement,
            amount_usd,
            route,
            ..
        } => {
            assert_eq!(settlement.tx_hash.as_deref(), Some("abc123"));
            assert_eq!(settlement.facilitator.as_deref(), Some("self-hosted"));
            assert_eq!(amount_usd, Decimal::from_str("0.00015").unwrap());
            assert_eq!(route.primary.id, "helius");
        }
        other => panic!("expected paid decision, got {:?}", other),
    }
}

#[tokio::test]
async fn test_verification_failure_becomes_402_challenge() {
    let fixture = fixture_with(ScriptedAdapter::rejecting(
        "self-hosted",
        FacilitatorKind::SelfHosted,
    ));
    let header = payment_header(false);
    let decision = fixture
        .middleware
        .process(&rpc_request(), Some(&header), None, RESOURCE)
        .await
        .unwrap();

    match decision {
        PaymentDecision::Challenge(challenge) => {
            assert_eq!(challenge.error.as_deref(), Some("Payment verification failed"));
            assert_eq!(challenge.details.as_deref(), Some("scripted rejection"));
            assert_eq!(challenge.facilitator.as_deref(), Some("self-hosted"));
            // Still replayable.
            assert_eq!(challenge.accepts[0].max_amount_required, "150");
        }
        other => panic!("expected challenge, got {:?}", other),
    }
}

#[tokio::test]
async fn test_settlement_pinned_to_verifying_facilitator() {
    // Primary fails verification but would settle; the fallback verifies.
    // The settlement must be produced by the adapter that verified.
    let fixture = fixture_with_adapters(
        ScriptedAdapter::verify_rejecting("self-hosted", FacilitatorKind::SelfHosted),
        Some(ScriptedAdapter::ok("remoteA", FacilitatorKind::RemoteA)),
    );
    let header = payment_header(false);

    let decision = fixture
        .middleware
        .process(&rpc_request(), Some(&header), None, RESOURCE)
        .await
        .unwrap();
    match decision {
        PaymentDecision::Paid { settlement, .. } => {
            assert!(settlement.settled);
            assert_eq!(settlement.facilitator.as_deref(), Some("remoteA"));
        }
        other => panic!("expected paid decision, got {:?}", other),
    }
}

#[tokio::test]
async fn test_forced_facilitator_flows_to_manager() {
    let fixture = fixture_with(ScriptedAdapter::ok("remoteA", FacilitatorKind::RemoteA));
    let mut request = rpc_request();
    request.facilitator = Some(FacilitatorKind::RemoteA);
    let header = payment_header(false);

    let decision = fixture
        .middleware
        .process(&request, Some(&header), None, RESOURCE)
        .await
        .unwrap();
    match decision {
        PaymentDecision::Paid { settlement, .. } => {
            assert_eq!(settlement.facilitator.as_deref(), Some("remoteA"));
        }
        other => panic!("expected paid decision, got {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_purchase_mints_batch_and_skips_forwarding() {
    let fixture = fixture();
    let header = payment_header(true);
    let decision = fixture
        .middleware
        .process(&rpc_request(), Some(&header), None, RESOURCE)
        .await
        .unwrap();

    let (descriptor, tx_hash) = match decision {
        PaymentDecision::BatchPurchased {
            descriptor,
            tx_hash,
            ..
        } => (descriptor, tx_hash),
        other => panic!("expected batch purchase, got {:?}", other),
    };
    assert_eq!(descriptor.calls, 1000);
    assert_eq!(descriptor.calls_remaining, 1000);
    assert_eq!(descriptor.amount_paid, Decimal::from_str("0.08").unwrap());
    assert_eq!(tx_hash.as_deref(), Some("abc123"));
    assert_eq!(fixture.ledger.len(), 1);
}

#[tokio::test]
async fn test_batch_spend_fast_path() {
    let fixture = fixture();
    let batch = fixture.ledger.issue(1000, Decimal::from_str("0.08").unwrap());
    let batch_header = json!({"batchId": batch.batch_id}).to_string();

    let decision = fixture
        .middleware
        .process(&rpc_request(), None, Some(&batch_header), RESOURCE)
        .await
        .unwrap();

    match decision {
        PaymentDecision::BatchSpent {
            batch_id,
            remaining,
            total_calls,
            route,
        } => {
            assert_eq!(batch_id, batch.batch_id);
            assert_eq!(remaining, 999);
            assert_eq!(total_calls, 1000);
            assert_eq!(route.primary.id, "helius");
        }
        other => panic!("expected batch spend, got {:?}", other),
    }
}

#[tokio::test]
async fn test_depleted_batch_yields_fresh_challenge() {
    let fixture = fixture();
    let batch = fixture.ledger.issue(1, Decimal::from_str("0.08").unwrap());
    let batch_header = json!({"batchId": batch.batch_id}).to_string();

    // Spend the only call, then try again.
    fixture
        .middleware
        .process(&rpc_request(), None, Some(&batch_header), RESOURCE)
        .await
        .unwrap();
    let decision = fixture
        .middleware
        .process(&rpc_request(), None, Some(&batch_header), RESOURCE)
        .await
        .unwrap();

    match decision {
        PaymentDecision::Challenge(challenge) => {
            assert_eq!(challenge.error.as_deref(), Some("Batch expired or depleted"));
            assert_eq!(challenge.accepts.len(), 1);
        }
        other => panic!("expected challenge, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_batch_yields_fresh_challenge() {
    let fixture = fixture();
    let batch_header = json!({"batchId": "no-such-batch"}).to_string();
    let decision = fixture
        .middleware
        .process(&rpc_request(), None, Some(&batch_header), RESOURCE)
        .await
        .unwrap();
    assert!(matches!(decision, PaymentDecision::Challenge(_)));
}

#[tokio::test]
async fn test_router_failure_propagates() {
    let fixture = fixture();
    let mut request = rpc_request();
    request.chain = "base".to_string();
    let err = fixture
        .middleware
        .process(&request, None, None, RESOURCE)
        .await
        .unwrap_err();
    assert!(matches!(err, crate::GatewayError::NoProviderAvailable { .. }));
}

#[tokio::test]
async fn test_requirements_mismatch_is_rejected() {
    let fixture = fixture();
    let mut header: serde_json::Value = serde_json::from_str(&payment_header(false)).unwrap();
    header["paymentRequirements"]["network"] = json!("base");
    let header = header.to_string();

    let decision = fixture
        .middleware
        .process(&rpc_request(), Some(&header), None, RESOURCE)
        .await
        .unwrap();
    match decision {
        PaymentDecision::Challenge(challenge) => {
            assert_eq!(challenge.error.as_deref(), Some("Payment requirements mismatch"));
        }
        other => panic!("expected challenge, got {:?}", other),
    }
}

#[test]
fn test_validate_request() {
    let mut request = rpc_request();
    assert!(validate_request(&request).is_ok());

    request.method = "  ".to_string();
    assert!(validate_request(&request).is_err());

    let mut request = rpc_request();
    request.chain = "near".to_string();
    assert!(matches!(
        validate_request(&request).unwrap_err(),
        crate::GatewayError::ChainNotSupported { .. }
    ));
}

#[test]
fn test_rpc_request_defaults() {
    let request: RpcCallRequest = serde_json::from_value(json!({"method": "getSlot"})).unwrap();
    assert_eq!(request.chain, "solana");
    assert!(request.params.is_empty());
    assert!(request.preferences.is_none());
    assert!(request.facilitator.is_none());
}
