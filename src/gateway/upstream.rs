//! Upstream JSON-RPC forwarding
//!
//! Forwards the paid call to the selected provider with the provider's
//! latency budget as a soft deadline. A transport error or non-2xx answer
//! triggers exactly one retry against the first fallback provider; after
//! that the call is an upstream failure.

use std::time::Duration;

use serde_json::{json, Value};

use crate::router::Route;
use crate::types::Provider;
use crate::{GatewayError, Result};

/// Floor for the per-provider soft deadline
const MIN_UPSTREAM_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Result of a successful upstream forward
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// The provider's JSON-RPC response body
    pub body: Value,
    /// Display name of the provider that answered
    pub provider_name: String,
    /// Whether the fallback provider served the call
    pub used_fallback: bool,
}

/// Forward a JSON-RPC call along a route
pub async fn forward_rpc(
    client: &reqwest::Client,
    route: &Route,
    method: &str,
    params: &[Value],
) -> Result<UpstreamResponse> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let primary_error = match call_provider(client, &route.primary, &body).await {
        Ok(value) => {
            return Ok(UpstreamResponse {
                body: value,
                provider_name: route.primary.name.clone(),
                used_fallback: false,
            })
        }
        Err(err) => err,
    };

    let fallback = match route.fallbacks.first() {
        Some(fallback) => fallback,
        None => {
            return Err(GatewayError::upstream(format!(
                "{} failed: {}",
                route.primary.name, primary_error
            )))
        }
    };

    tracing::warn!(
        primary = %route.primary.id,
        fallback = %fallback.id,
        error = %primary_error,
        "primary upstream failed, retrying on fallback"
    );
    match call_provider(client, fallback, &body).await {
        Ok(value) => Ok(UpstreamResponse {
            body: value,
            provider_name: fallback.name.clone(),
            used_fallback: true,
        }),
        Err(fallback_error) => Err(GatewayError::upstream(format!(
            "{} failed: {}; fallback {} failed: {}",
            route.primary.name, primary_error, fallback.name, fallback_error
        ))),
    }
}

async fn call_provider(
    client: &reqwest::Client,
    provider: &Provider,
    body: &Value,
) -> Result<Value> {
    if provider.url.is_empty() {
        return Err(GatewayError::upstream("provider has no endpoint URL"));
    }
    let timeout = Duration::from_millis(provider.max_latency_ms).max(MIN_UPSTREAM_TIMEOUT);
    let response = client
        .post(&provider.url)
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| GatewayError::upstream(e.to_string()))?;
    if !response.status().is_success() {
        return Err(GatewayError::upstream(format!(
            "upstream returned status {}",
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| GatewayError::upstream(format!("invalid upstream body: {}", e)))
}
