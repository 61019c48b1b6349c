//! Background health prober
//!
//! Sends a minimal JSON-RPC call to every registered provider on a fixed
//! interval. Solana-family chains get `getSlot`, EVM-family chains get
//! `eth_blockNumber`. A probe succeeds iff the endpoint answers 2xx with a
//! JSON-RPC object carrying either `result` or `error`. Each probe has its
//! own deadline, and all providers are probed concurrently per tick so one
//! slow endpoint cannot delay the rest.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::{json, Value};

use super::ProviderRegistry;
use crate::types::{chains, Provider};

/// Per-probe deadline
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default probe interval
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(60);

/// JSON-RPC body used to probe a provider, by chain family
fn probe_body(chain: &str) -> Value {
    let method = if chains::is_evm_family(chain) {
        "eth_blockNumber"
    } else {
        "getSlot"
    };
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": []
    })
}

/// Probe one provider once; returns the measured latency and success flag
pub(crate) async fn probe_provider(client: &reqwest::Client, provider: &Provider) -> (u64, bool) {
    let url = match provider.probe_url() {
        Some(url) => url,
        None => return (0, false),
    };
    let chain = provider.chains.first().map(String::as_str).unwrap_or("");
    let started = Instant::now();
    let response = client
        .post(url)
        .timeout(PROBE_TIMEOUT)
        .json(&probe_body(chain))
        .send()
        .await;
    let latency = started.elapsed().as_millis() as u64;

    let success = match response {
        Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
            Ok(body) => body.is_object() && (body.get("result").is_some() || body.get("error").is_some()),
            Err(_) => false,
        },
        Ok(_) => false,
        Err(err) => {
            tracing::debug!(provider = %provider.id, error = %err, "probe request failed");
            false
        }
    };
    (latency, success)
}

/// Run one probe round over every registered provider
pub(crate) async fn probe_round(registry: &ProviderRegistry, client: &reqwest::Client) {
    let providers = registry.list_all();
    let probes = providers.iter().map(|provider| async move {
        if provider.probe_url().is_none() {
            // Intentionally URL-less; keep it pinned offline and quiet.
            registry.pin_offline(&provider.id);
            return;
        }
        let (latency, success) = probe_provider(client, provider).await;
        if let Err(err) = registry.record_probe(&provider.id, latency, success) {
            tracing::warn!(provider = %provider.id, error = %err, "failed to record probe");
        } else {
            tracing::debug!(
                provider = %provider.id,
                latency_ms = latency,
                success,
                "probe recorded"
            );
        }
    });
    join_all(probes).await;
}

/// Probe loop driven by [`ProviderRegistry::start_health_checks`]
pub(crate) async fn probe_loop(registry: Arc<ProviderRegistry>, interval: Duration) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        probe_round(&registry, &client).await;
    }
}
