//! HTTP surface of the gateway
//!
//! Composes the router, payment middleware, and upstream forwarder into an
//! axum application: the paid `/rpc` endpoint, the free read-only
//! passthrough, and the inspection endpoints for providers, facilitators,
//! and batch pricing.

pub mod upstream;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::facilitator::FacilitatorManager;
use crate::ledger::BatchLedger;
use crate::middleware::{validate_request, PaymentDecision, RpcCallRequest, X402Middleware};
use crate::registry::ProviderRegistry;
use crate::router::{Route, Router};
use crate::types::{
    chains, explorer_tx_url, rpc_methods, PaymentInfo, Receipt, SettleOutcome, SettlementStatus,
};
use crate::GatewayError;
use upstream::forward_rpc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub router: Arc<Router>,
    pub manager: Arc<FacilitatorManager>,
    pub ledger: Arc<BatchLedger>,
    pub middleware: Arc<X402Middleware>,
    pub config: Arc<GatewayConfig>,
    pub http: reqwest::Client,
}

/// Build the axum application
pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/", get(descriptor_handler))
        .route("/rpc", post(rpc_handler))
        .route("/chain-rpc-proxy", post(proxy_handler))
        .route("/health", get(health_handler))
        .route("/providers", get(providers_handler))
        .route("/providers/{id}", get(provider_handler))
        .route("/facilitator", get(facilitator_handler))
        .route("/rpc-methods", get(rpc_methods_handler))
        .route("/batch-pricing", get(batch_pricing_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(err: &GatewayError) -> Response {
    let status = match err {
        GatewayError::InvalidRequest(_)
        | GatewayError::ChainNotSupported { .. }
        | GatewayError::NoProviderAvailable { .. }
        | GatewayError::InvalidPaymentPayload(_)
        | GatewayError::InvalidAuthorization(_)
        | GatewayError::Serialization(_)
        | GatewayError::Base64(_) => StatusCode::BAD_REQUEST,
        GatewayError::UnknownProvider(_) => StatusCode::NOT_FOUND,
        GatewayError::PaymentRequired { .. } | GatewayError::FacilitatorUnavailable { .. } => {
            StatusCode::PAYMENT_REQUIRED
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn append_note(receipt: &mut Receipt, note: &str) {
    receipt.note = Some(match receipt.note.take() {
        Some(existing) => format!("{}; {}", existing, note),
        None => note.to_string(),
    });
}

fn settlement_receipt(
    chain: &str,
    provider_name: &str,
    amount_usd: Decimal,
    settlement: &SettleOutcome,
    note: Option<String>,
) -> Receipt {
    let tx_hash = settlement.tx_hash.clone().unwrap_or_default();
    let explorer = if tx_hash.is_empty() {
        String::new()
    } else {
        explorer_tx_url(chain, &tx_hash)
    };
    Receipt {
        provider: provider_name.to_string(),
        cost: amount_usd,
        status: SettlementStatus::Settled,
        payment_info: PaymentInfo {
            chain: chain.to_string(),
            tx_hash,
            amount: amount_usd,
            payer: settlement.payer.clone(),
            timestamp: Utc::now(),
            explorer,
            provider: settlement.facilitator.clone(),
        },
        note,
    }
}

fn batch_receipt(chain: &str, provider_name: &str, batch_id: &str, remaining: u32) -> Receipt {
    Receipt {
        provider: provider_name.to_string(),
        cost: Decimal::ZERO,
        status: SettlementStatus::Settled,
        payment_info: PaymentInfo {
            chain: chain.to_string(),
            tx_hash: String::new(),
            amount: Decimal::ZERO,
            payer: None,
            timestamp: Utc::now(),
            explorer: String::new(),
            provider: Some("batch".to_string()),
        },
        note: Some(format!(
            "paid from batch {}; {} calls remaining",
            batch_id, remaining
        )),
    }
}

fn envelope(upstream_body: &Value, receipt: &Receipt) -> crate::Result<Value> {
    let mut envelope = json!({ "jsonrpc": "2.0", "id": 1 });
    if let Some(result) = upstream_body.get("result") {
        envelope["result"] = result.clone();
    }
    if let Some(error) = upstream_body.get("error") {
        envelope["error"] = error.clone();
    }
    envelope["x402"] = serde_json::to_value(receipt)?;
    Ok(envelope)
}

async fn respond_with_upstream(
    state: &AppState,
    request: &RpcCallRequest,
    route: &Route,
    mut receipt: Receipt,
) -> Response {
    match forward_rpc(&state.http, route, &request.method, &request.params).await {
        Ok(response) => {
            if response.used_fallback {
                receipt.provider = response.provider_name.clone();
                append_note(&mut receipt, "fallback provider used");
            }
            match envelope(&response.body, &receipt) {
                Ok(body) => (StatusCode::OK, Json(body)).into_response(),
                Err(err) => error_response(&err),
            }
        }
        Err(err) => {
            // Payment stayed settled; the receipt records it for audit.
            append_note(&mut receipt, "upstream failed");
            let body = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {
                    "code": -32603,
                    "message": "Upstream RPC failure",
                    "data": err.to_string(),
                },
                "x402": serde_json::to_value(&receipt).unwrap_or(Value::Null),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// POST /rpc
async fn rpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    // Manual parse so malformed bodies come back as 400, not 422.
    let request: RpcCallRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(&GatewayError::invalid_request(format!(
                "malformed request body: {}",
                err
            )))
        }
    };
    if let Err(err) = validate_request(&request) {
        return error_response(&err);
    }
    let payment_header = header_str(&headers, "x402-payment");
    let batch_header = header_str(&headers, "x402-batch");
    let resource = state.config.rpc_resource();

    let decision = match state
        .middleware
        .process(
            &request,
            payment_header.as_deref(),
            batch_header.as_deref(),
            &resource,
        )
        .await
    {
        Ok(decision) => decision,
        Err(err) => return error_response(&err),
    };

    match decision {
        PaymentDecision::Challenge(challenge) => {
            (StatusCode::PAYMENT_REQUIRED, Json(*challenge)).into_response()
        }
        PaymentDecision::BatchSpent {
            route,
            batch_id,
            remaining,
            ..
        } => {
            let receipt = batch_receipt(&request.chain, &route.primary.name, &batch_id, remaining);
            respond_with_upstream(&state, &request, &route, receipt).await
        }
        PaymentDecision::Paid {
            route,
            settlement,
            amount_usd,
            price_note,
        } => {
            let receipt = settlement_receipt(
                &request.chain,
                &route.primary.name,
                amount_usd,
                &settlement,
                price_note,
            );
            respond_with_upstream(&state, &request, &route, receipt).await
        }
        PaymentDecision::BatchPurchased {
            descriptor,
            tx_hash,
            facilitator,
        } => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "batch": descriptor,
                "txHash": tx_hash,
                "facilitator": facilitator,
            })),
        )
            .into_response(),
    }
}

/// Body of the free passthrough endpoint
#[derive(Debug, Deserialize)]
struct ProxyRequest {
    method: String,
    #[serde(default)]
    params: Vec<Value>,
    #[serde(default = "default_chain_param")]
    chain: String,
}

fn default_chain_param() -> String {
    chains::SOLANA.to_string()
}

/// POST /chain-rpc-proxy
async fn proxy_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let request: ProxyRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(&GatewayError::invalid_request(format!(
                "malformed request body: {}",
                err
            )))
        }
    };
    if !chains::is_supported(&request.chain) {
        return error_response(&GatewayError::chain_not_supported(&request.chain));
    }
    if !rpc_methods::is_allowed(&request.chain, &request.method) {
        return error_response(&GatewayError::invalid_request(format!(
            "method '{}' is not on the free passthrough allowlist",
            request.method
        )));
    }
    let route = match state
        .router
        .select_with_fallback(&request.chain, &Default::default())
    {
        Ok(route) => route,
        Err(err) => return error_response(&err),
    };
    match forward_rpc(&state.http, &route, &request.method, &request.params).await {
        Ok(response) => (StatusCode::OK, Json(response.body)).into_response(),
        Err(err) => {
            let body = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32603, "message": "Upstream RPC failure", "data": err.to_string() },
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// GET /
async fn descriptor_handler() -> Json<Value> {
    Json(json!({
        "service": "x402-rpc-gateway",
        "version": crate::VERSION,
        "x402Version": crate::X402_VERSION,
        "endpoints": {
            "POST /rpc": "Paid RPC call (x402)",
            "POST /chain-rpc-proxy": "Free passthrough for read methods",
            "GET /health": "Service and provider stats",
            "GET /providers": "Provider registry",
            "GET /facilitator": "Facilitator configuration",
            "GET /rpc-methods": "Supported methods per chain",
            "GET /batch-pricing": "Pre-paid bundle offers",
        },
    }))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "x402-rpc-gateway",
        "version": crate::VERSION,
        "providers": state.registry.stats(),
        "batches": state.ledger.len(),
    }))
}

/// GET /providers
async fn providers_handler(State(state): State<AppState>) -> Json<Value> {
    let providers = state.registry.list_all();
    Json(json!({
        "count": providers.len(),
        "providers": providers,
    }))
}

/// GET /providers/{id}
async fn provider_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match (state.registry.get(&id), state.registry.get_health(&id)) {
        (Some(provider), Some(health)) => {
            Json(json!({ "provider": provider, "health": health })).into_response()
        }
        _ => error_response(&GatewayError::UnknownProvider(id)),
    }
}

/// GET /facilitator
async fn facilitator_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.manager.info()))
}

#[derive(Debug, Deserialize)]
struct ChainQuery {
    #[serde(default = "default_chain_param")]
    chain: String,
}

/// GET /rpc-methods?chain=…
async fn rpc_methods_handler(
    State(_state): State<AppState>,
    Query(query): Query<ChainQuery>,
) -> Response {
    if !chains::is_supported(&query.chain) {
        return error_response(&GatewayError::chain_not_supported(&query.chain));
    }
    Json(json!({
        "chain": query.chain,
        "methods": rpc_methods::read_allowlist(&query.chain),
    }))
    .into_response()
}

/// GET /batch-pricing?chain=…
async fn batch_pricing_handler(
    State(state): State<AppState>,
    Query(query): Query<ChainQuery>,
) -> Response {
    if !chains::is_supported(&query.chain) {
        return error_response(&GatewayError::chain_not_supported(&query.chain));
    }
    let offers: Vec<Value> = state
        .registry
        .list_by_chain(&query.chain)
        .into_iter()
        .filter_map(|provider| {
            let batch = provider.batch_cost.as_ref()?;
            let per_call = batch.price / Decimal::from(batch.calls);
            let savings = crate::middleware::challenge::batch_savings(
                provider.cost_per_call,
                batch.calls,
                batch.price,
            )?;
            Some(json!({
                "providerId": provider.id,
                "provider": provider.name,
                "calls": batch.calls,
                "price": batch.price,
                "perCallEquivalent": per_call.round_dp(8).normalize(),
                "savings": savings,
            }))
        })
        .collect();
    Json(json!({ "chain": query.chain, "offers": offers })).into_response()
}

#[cfg(test)]
mod tests;
