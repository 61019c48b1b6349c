//! Provider registry with live health scoring
//!
//! Holds every upstream provider the gateway knows about, together with its
//! probe-driven health record. Probe results drive a small status machine:
//! a success clears the failure streak and refreshes the latency EMA, a
//! failure degrades the provider, and three consecutive failures take it
//! offline. Providers registered without a URL are pinned offline and never
//! probed.
//!
//! Entries live in a [`DashMap`], so router reads do not contend with the
//! probe task: a probe writes through one entry at a time while selection
//! clones snapshots out of the map.

pub mod health;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::types::{HealthStatus, Provider, ProviderHealth, ProviderStatus};
use crate::{GatewayError, Result};

/// Failure count a URL-less provider is pinned at, so the offline
/// invariant holds without the prober ever touching it.
pub(crate) const PINNED_OFFLINE_FAILURES: u32 = 1_000;

/// Consecutive probe failures after which a provider goes offline
pub(crate) const OFFLINE_FAILURE_THRESHOLD: u32 = 3;

/// EMA weight given to the previous average
const EMA_KEEP: f64 = 0.8;
/// EMA weight given to the newest sample
const EMA_SAMPLE: f64 = 0.2;

#[derive(Debug, Clone)]
struct ProviderEntry {
    provider: Provider,
    health: ProviderHealth,
}

/// Aggregate registry statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub degraded: usize,
    pub offline: usize,
    /// Union of chains served by registered providers
    pub chains: Vec<String>,
    /// Mean latency EMA across providers with at least one sample
    #[serde(rename = "averageLatencyMs")]
    pub average_latency_ms: f64,
}

/// Registry of upstream providers and their health
pub struct ProviderRegistry {
    entries: DashMap<String, ProviderEntry>,
    prober: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            prober: std::sync::Mutex::new(None),
        }
    }

    /// Register a provider; the id must be unique
    pub fn register(&self, provider: Provider) -> Result<()> {
        if self.entries.contains_key(&provider.id) {
            return Err(GatewayError::config(format!(
                "Provider id '{}' is already registered",
                provider.id
            )));
        }
        let mut entry = ProviderEntry {
            health: ProviderHealth::healthy(),
            provider,
        };
        if entry.provider.url.is_empty() {
            entry.provider.status = ProviderStatus::Offline;
            entry.health.status = HealthStatus::Offline;
            entry.health.consecutive_failures = PINNED_OFFLINE_FAILURES;
        }
        tracing::info!(
            provider = %entry.provider.id,
            status = ?entry.provider.status,
            "registered provider"
        );
        self.entries.insert(entry.provider.id.clone(), entry);
        Ok(())
    }

    /// Look up one provider by id
    pub fn get(&self, id: &str) -> Option<Provider> {
        self.entries.get(id).map(|e| e.provider.clone())
    }

    /// Snapshot of every registered provider
    pub fn list_all(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> =
            self.entries.iter().map(|e| e.provider.clone()).collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }

    /// Providers that serve a chain, regardless of health
    pub fn list_by_chain(&self, chain: &str) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self
            .entries
            .iter()
            .filter(|e| e.provider.supports_chain(chain))
            .map(|e| e.provider.clone())
            .collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }

    /// Healthy and active providers for a chain
    pub fn list_healthy(&self, chain: &str) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self
            .entries
            .iter()
            .filter(|e| {
                e.provider.supports_chain(chain)
                    && e.provider.status == ProviderStatus::Active
                    && e.health.status == HealthStatus::Healthy
            })
            .map(|e| e.provider.clone())
            .collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }

    /// Force a provider's status
    pub fn update_status(&self, id: &str, status: ProviderStatus) -> Result<()> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| GatewayError::UnknownProvider(id.to_string()))?;
        entry.provider.status = status;
        Ok(())
    }

    /// Health record for one provider
    pub fn get_health(&self, id: &str) -> Option<ProviderHealth> {
        self.entries.get(id).map(|e| e.health.clone())
    }

    /// Record the result of one probe and run the status machine
    pub fn record_probe(&self, id: &str, latency_ms: u64, success: bool) -> Result<()> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| GatewayError::UnknownProvider(id.to_string()))?;
        let now = Utc::now();
        entry.health.last_check = Some(now);
        entry.provider.last_health_check = Some(now);

        if success {
            entry.health.consecutive_failures = 0;
            entry.health.latency = latency_ms;
            // Latency EMA is updated on success only; the first sample seeds it.
            entry.provider.average_latency = if entry.provider.average_latency == 0.0 {
                latency_ms as f64
            } else {
                EMA_KEEP * entry.provider.average_latency + EMA_SAMPLE * latency_ms as f64
            };
            if latency_ms > entry.provider.max_latency_ms {
                entry.health.status = HealthStatus::Degraded;
                entry.provider.status = ProviderStatus::Degraded;
            } else {
                entry.health.status = HealthStatus::Healthy;
                entry.provider.status = ProviderStatus::Active;
            }
        } else {
            entry.health.consecutive_failures += 1;
            if entry.health.consecutive_failures >= OFFLINE_FAILURE_THRESHOLD {
                entry.health.status = HealthStatus::Offline;
                entry.provider.status = ProviderStatus::Offline;
                tracing::warn!(
                    provider = %id,
                    failures = entry.health.consecutive_failures,
                    "provider went offline"
                );
            } else {
                entry.health.status = HealthStatus::Degraded;
                entry.provider.status = ProviderStatus::Degraded;
            }
        }
        Ok(())
    }

    /// Pin a URL-less provider offline without counting probe failures
    pub(crate) fn pin_offline(&self, id: &str) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.provider.status = ProviderStatus::Offline;
            entry.health.status = HealthStatus::Offline;
            entry.health.consecutive_failures = PINNED_OFFLINE_FAILURES;
        }
    }

    /// Aggregate counts, chains, and mean latency
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: 0,
            active: 0,
            degraded: 0,
            offline: 0,
            chains: Vec::new(),
            average_latency_ms: 0.0,
        };
        let mut latency_sum = 0.0;
        let mut latency_count = 0usize;
        for entry in self.entries.iter() {
            stats.total += 1;
            match entry.provider.status {
                ProviderStatus::Active => stats.active += 1,
                ProviderStatus::Degraded => stats.degraded += 1,
                ProviderStatus::Offline => stats.offline += 1,
            }
            for chain in &entry.provider.chains {
                if !stats.chains.contains(chain) {
                    stats.chains.push(chain.clone());
                }
            }
            if entry.provider.average_latency > 0.0 {
                latency_sum += entry.provider.average_latency;
                latency_count += 1;
            }
        }
        stats.chains.sort();
        if latency_count > 0 {
            stats.average_latency_ms = latency_sum / latency_count as f64;
        }
        stats
    }

    /// Start the periodic probe task
    pub fn start_health_checks(registry: &Arc<Self>, interval: Duration) {
        let mut guard = registry.prober.lock().expect("prober lock poisoned");
        if guard.is_some() {
            return;
        }
        let task_registry = Arc::clone(registry);
        let handle = tokio::spawn(async move {
            health::probe_loop(task_registry, interval).await;
        });
        *guard = Some(handle);
        tracing::info!(interval_secs = interval.as_secs(), "health checks started");
    }

    /// Stop the periodic probe task
    pub fn stop_health_checks(&self) {
        let mut guard = self.prober.lock().expect("prober lock poisoned");
        if let Some(handle) = guard.take() {
            handle.abort();
            tracing::info!("health checks stopped");
        }
    }
}

impl Drop for ProviderRegistry {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.prober.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
