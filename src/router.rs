//! Provider selection
//!
//! Turns the registry's live view into a single primary provider plus an
//! ordered fallback list, under a caller-chosen strategy and preference
//! filters. Selection is pure computation over a registry snapshot; the only
//! state the router owns is one rotation counter per chain for the
//! round-robin strategy.

use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashMap;

use crate::registry::ProviderRegistry;
use crate::types::{Provider, ProviderStatus, RoutingPreferences, RoutingStrategy};
use crate::{GatewayError, Result};

/// Routing decision: one primary and ranked fallbacks
#[derive(Debug, Clone)]
pub struct Route {
    pub primary: Provider,
    pub fallbacks: Vec<Provider>,
}

/// Strategy-based provider selector
pub struct Router {
    registry: Arc<ProviderRegistry>,
    round_robin: DashMap<String, usize>,
}

impl Router {
    /// Create a router over a registry
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            round_robin: DashMap::new(),
        }
    }

    /// Select a primary provider and ranked fallbacks for a chain
    pub fn select_with_fallback(
        &self,
        chain: &str,
        preferences: &RoutingPreferences,
    ) -> Result<Route> {
        let candidates = if preferences.require_healthy {
            self.registry.list_healthy(chain)
        } else {
            // Degraded providers are admitted; offline ones never are.
            self.registry
                .list_by_chain(chain)
                .into_iter()
                .filter(|p| p.status != ProviderStatus::Offline)
                .collect()
        };

        let mut candidates: Vec<Provider> = candidates
            .into_iter()
            .filter(|p| !preferences.exclude_providers.contains(&p.id))
            .filter(|p| {
                preferences
                    .max_cost_per_call
                    .map(|cap| p.cost_per_call <= cap)
                    .unwrap_or(true)
            })
            .filter(|p| {
                preferences
                    .max_latency_ms
                    .map(|cap| p.average_latency <= cap as f64)
                    .unwrap_or(true)
            })
            .collect();

        if candidates.is_empty() {
            return Err(GatewayError::no_provider(chain));
        }

        self.rank(chain, &mut candidates, preferences.strategy);

        if !preferences.preferred_providers.is_empty() {
            hoist_preferred(&mut candidates, &preferences.preferred_providers);
        }

        let mut iter = candidates.into_iter();
        let primary = iter.next().expect("non-empty candidate list");
        Ok(Route {
            primary,
            fallbacks: iter.collect(),
        })
    }

    fn rank(&self, chain: &str, candidates: &mut [Provider], strategy: RoutingStrategy) {
        match strategy {
            RoutingStrategy::LowestCost => {
                candidates.sort_by(|a, b| {
                    a.cost_per_call
                        .cmp(&b.cost_per_call)
                        .then(cmp_latency(a, b))
                        .then(b.priority.cmp(&a.priority))
                });
            }
            RoutingStrategy::LowestLatency => {
                candidates.sort_by(|a, b| {
                    cmp_latency(a, b).then(a.cost_per_call.cmp(&b.cost_per_call))
                });
            }
            RoutingStrategy::HighestPriority => {
                candidates.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then(a.cost_per_call.cmp(&b.cost_per_call))
                });
            }
            RoutingStrategy::RoundRobin => {
                // Stable id order first, then rotate by the per-chain counter.
                candidates.sort_by(|a, b| a.id.cmp(&b.id));
                let mut counter = self.round_robin.entry(chain.to_string()).or_insert(0);
                let offset = *counter % candidates.len();
                let next = counter.wrapping_add(1);
                *counter = next;
                drop(counter);
                candidates.rotate_left(offset);
            }
        }
    }
}

fn cmp_latency(a: &Provider, b: &Provider) -> Ordering {
    a.average_latency
        .partial_cmp(&b.average_latency)
        .unwrap_or(Ordering::Equal)
}

/// Move preferred providers to the head, preserving their ranked order
fn hoist_preferred(candidates: &mut Vec<Provider>, preferred: &[String]) {
    let (mut head, tail): (Vec<Provider>, Vec<Provider>) = candidates
        .drain(..)
        .partition(|p| preferred.contains(&p.id));
    head.extend(tail);
    *candidates = head;
}
