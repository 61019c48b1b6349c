//! Provider descriptors, live health state, and routing preferences

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an upstream provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Serving traffic normally
    Active,
    /// Responding, but slow or recently failing
    Degraded,
    /// Not eligible for routing
    Offline,
}

/// Probe-level health status of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Offline,
}

/// Discounted pre-paid bundle offered by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCost {
    /// Number of calls in the bundle
    pub calls: u32,
    /// Total bundle price in USD
    pub price: Decimal,
}

/// An upstream JSON-RPC provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /// Stable provider id
    pub id: String,
    /// Display name
    pub name: String,
    /// Chains this provider serves, in preference order
    pub chains: Vec<String>,
    /// RPC endpoint URL; empty means the provider is offline
    pub url: String,
    /// Optional dedicated health-probe URL
    #[serde(rename = "healthCheckUrl", skip_serializing_if = "Option::is_none")]
    pub health_check_url: Option<String>,
    /// Price of a single call in USD
    #[serde(rename = "costPerCall")]
    pub cost_per_call: Decimal,
    /// Optional discounted bundle offer
    #[serde(rename = "batchCost", skip_serializing_if = "Option::is_none")]
    pub batch_cost: Option<BatchCost>,
    /// Routing priority, higher is preferred
    pub priority: i32,
    /// Latency budget in milliseconds; probes above it mark the provider degraded
    #[serde(rename = "maxLatencyMs")]
    pub max_latency_ms: u64,
    /// Current status, maintained by the registry
    pub status: ProviderStatus,
    /// Exponential moving average of probe latency in milliseconds
    #[serde(rename = "averageLatency")]
    pub average_latency: f64,
    /// When the provider was last probed
    #[serde(rename = "lastHealthCheck", skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
}

impl Provider {
    /// Create a provider descriptor with registry-managed fields zeroed
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        chains: Vec<String>,
        url: impl Into<String>,
        cost_per_call: Decimal,
    ) -> Self {
        let url = url.into();
        let status = if url.is_empty() {
            ProviderStatus::Offline
        } else {
            ProviderStatus::Active
        };
        Self {
            id: id.into(),
            name: name.into(),
            chains,
            url,
            health_check_url: None,
            cost_per_call,
            batch_cost: None,
            priority: 0,
            max_latency_ms: 2_000,
            status,
            average_latency: 0.0,
            last_health_check: None,
        }
    }

    /// Set the dedicated health-probe URL
    pub fn with_health_check_url(mut self, url: impl Into<String>) -> Self {
        self.health_check_url = Some(url.into());
        self
    }

    /// Set the discounted bundle offer
    pub fn with_batch_cost(mut self, calls: u32, price: Decimal) -> Self {
        self.batch_cost = Some(BatchCost { calls, price });
        self
    }

    /// Set the routing priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the latency budget
    pub fn with_max_latency_ms(mut self, max_latency_ms: u64) -> Self {
        self.max_latency_ms = max_latency_ms;
        self
    }

    /// Whether the provider serves the given chain
    pub fn supports_chain(&self, chain: &str) -> bool {
        self.chains.iter().any(|c| c == chain)
    }

    /// URL to probe, if the provider has one at all
    pub fn probe_url(&self) -> Option<&str> {
        match self.health_check_url.as_deref() {
            Some(url) if !url.is_empty() => Some(url),
            _ => {
                if self.url.is_empty() {
                    None
                } else {
                    Some(&self.url)
                }
            }
        }
    }
}

/// Live health record, one per registered provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    /// Latency of the last successful probe in milliseconds
    pub latency: u64,
    #[serde(rename = "consecutiveFailures")]
    pub consecutive_failures: u32,
    #[serde(rename = "lastCheck", skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    /// Fresh health record for a newly registered provider
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency: 0,
            consecutive_failures: 0,
            last_check: None,
        }
    }
}

/// Ranking strategy for provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    LowestCost,
    LowestLatency,
    HighestPriority,
    RoundRobin,
}

impl Default for RoutingStrategy {
    fn default() -> Self {
        Self::LowestCost
    }
}

/// Caller-supplied routing preferences on a paid RPC call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPreferences {
    #[serde(default)]
    pub strategy: RoutingStrategy,
    /// Exclude providers whose latency EMA exceeds this cap
    #[serde(rename = "maxLatencyMs", default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    /// Exclude providers whose per-call cost exceeds this cap
    #[serde(
        rename = "maxCostPerCall",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_cost_per_call: Option<Decimal>,
    /// Provider ids to hoist to the front of the ranking
    #[serde(rename = "preferredProviders", default)]
    pub preferred_providers: Vec<String>,
    /// Provider ids that must never be selected
    #[serde(rename = "excludeProviders", default)]
    pub exclude_providers: Vec<String>,
    /// Restrict to healthy providers (default); degraded ones are admitted when false
    #[serde(rename = "requireHealthy", default = "default_require_healthy")]
    pub require_healthy: bool,
}

fn default_require_healthy() -> bool {
    true
}

impl Default for RoutingPreferences {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::default(),
            max_latency_ms: None,
            max_cost_per_call: None,
            preferred_providers: Vec::new(),
            exclude_providers: Vec::new(),
            require_healthy: true,
        }
    }
}

impl RoutingPreferences {
    /// Preferences with a specific strategy and everything else defaulted
    pub fn with_strategy(strategy: RoutingStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }
}
