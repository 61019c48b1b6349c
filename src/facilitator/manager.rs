//! Primary/fallback orchestration across facilitator adapters
//!
//! The manager holds one primary adapter and an optional fallback of a
//! different type, resolved at startup from configuration (`auto` picks the
//! self-hosted signer when a key is present, remoteA otherwise). A
//! client-forced type is honored exactly: it is served by the matching
//! configured adapter or one constructed on demand, and never silently
//! cross-selected; when it cannot be served the outcome names the type as
//! unavailable. Adapter exceptions are folded into structured outcomes at
//! this boundary.
//!
//! Only verification cascades primary→fallback. Settlement is pinned to
//! the adapter that produced the verification, so a payment is never
//! settled through a different facilitator than the one that verified it.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;

use super::{
    FacilitatorAdapter, RemoteAFacilitator, RemoteBFacilitator, RemoteCFacilitator,
    SelfHostedFacilitator,
};
use crate::types::{
    AdapterInfo, FacilitatorInfo, FacilitatorKind, PaymentPayload, PaymentRequirements,
    SettleOutcome, VerifyOutcome,
};
use crate::{GatewayError, Result};

/// Configured facilitator selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilitatorChoice {
    /// Resolve at startup based on what is configured
    Auto,
    /// A fixed adapter type
    Fixed(FacilitatorKind),
}

impl FromStr for FacilitatorChoice {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "auto" {
            Ok(FacilitatorChoice::Auto)
        } else {
            Ok(FacilitatorChoice::Fixed(s.parse()?))
        }
    }
}

/// Orchestrates verify/settle across the configured adapters
pub struct FacilitatorManager {
    primary: Arc<dyn FacilitatorAdapter>,
    fallback: Option<Arc<dyn FacilitatorAdapter>>,
    /// On-demand singletons for client-forced remote types
    on_demand: DashMap<FacilitatorKind, Arc<dyn FacilitatorAdapter>>,
}

impl FacilitatorManager {
    /// Build a manager from explicit adapters
    pub fn new(
        primary: Arc<dyn FacilitatorAdapter>,
        fallback: Option<Arc<dyn FacilitatorAdapter>>,
    ) -> Self {
        tracing::info!(
            primary = primary.name(),
            fallback = fallback.as_ref().map(|f| f.name()).unwrap_or("none"),
            "facilitator manager configured"
        );
        Self {
            primary,
            fallback,
            on_demand: DashMap::new(),
        }
    }

    /// Build a manager from environment configuration
    ///
    /// Reads `FACILITATOR_TYPE` (default `auto`),
    /// `FACILITATOR_ENABLE_FALLBACK` (default `true`), and
    /// `FACILITATOR_FALLBACK_TYPE`.
    pub fn from_env() -> Result<Self> {
        let choice: FacilitatorChoice = std::env::var("FACILITATOR_TYPE")
            .unwrap_or_else(|_| "auto".to_string())
            .parse()?;
        let enable_fallback = std::env::var("FACILITATOR_ENABLE_FALLBACK")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let fallback_type = std::env::var("FACILITATOR_FALLBACK_TYPE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<FacilitatorKind>())
            .transpose()?;
        Self::from_choice(choice, enable_fallback, fallback_type)
    }

    /// Build a manager from a resolved choice
    pub fn from_choice(
        choice: FacilitatorChoice,
        enable_fallback: bool,
        fallback_type: Option<FacilitatorKind>,
    ) -> Result<Self> {
        let (primary_kind, default_fallback) = match choice {
            FacilitatorChoice::Fixed(kind) => (kind, None),
            FacilitatorChoice::Auto => {
                // Deterministic: self-hosted when a signing key is present,
                // remoteA/remoteC otherwise.
                let self_hosted = SelfHostedFacilitator::from_env()?;
                if self_hosted.available() {
                    tracing::info!("auto facilitator resolution: self-hosted with remoteA fallback");
                    (FacilitatorKind::SelfHosted, Some(FacilitatorKind::RemoteA))
                } else {
                    tracing::info!("auto facilitator resolution: remoteA with remoteC fallback");
                    (FacilitatorKind::RemoteA, Some(FacilitatorKind::RemoteC))
                }
            }
        };

        let primary = Self::build_adapter(primary_kind)?;
        let fallback_kind = if enable_fallback {
            fallback_type.or(default_fallback).filter(|k| *k != primary_kind)
        } else {
            None
        };
        let fallback = fallback_kind.map(Self::build_adapter).transpose()?;
        Ok(Self::new(primary, fallback))
    }

    fn build_adapter(kind: FacilitatorKind) -> Result<Arc<dyn FacilitatorAdapter>> {
        Ok(match kind {
            FacilitatorKind::SelfHosted => Arc::new(SelfHostedFacilitator::from_env()?),
            FacilitatorKind::RemoteA => Arc::new(RemoteAFacilitator::from_env()?),
            FacilitatorKind::RemoteB => Arc::new(RemoteBFacilitator::from_env()?),
            FacilitatorKind::RemoteC => Arc::new(RemoteCFacilitator::from_env()?),
        })
    }

    /// Names, types, and availability of the configured adapters
    pub fn info(&self) -> FacilitatorInfo {
        FacilitatorInfo {
            primary: AdapterInfo {
                name: self.primary.name().to_string(),
                kind: self.primary.kind(),
                available: self.primary.available(),
            },
            fallback: self.fallback.as_ref().map(|f| AdapterInfo {
                name: f.name().to_string(),
                kind: f.kind(),
                available: f.available(),
            }),
        }
    }

    /// Adapter serving a forced type, if it can be served at all
    fn forced_adapter(&self, kind: FacilitatorKind) -> Option<Arc<dyn FacilitatorAdapter>> {
        if self.primary.kind() == kind {
            return Some(Arc::clone(&self.primary));
        }
        if let Some(fallback) = &self.fallback {
            if fallback.kind() == kind {
                return Some(Arc::clone(fallback));
            }
        }
        if let Some(cached) = self.on_demand.get(&kind) {
            return Some(Arc::clone(&cached));
        }
        // Remote kinds are constructible on demand, but only when their base
        // URL was configured explicitly; a forced type is never served by a
        // guessed endpoint.
        if kind.is_remote() && Self::explicitly_configured(kind) {
            if let Ok(adapter) = Self::build_adapter(kind) {
                self.on_demand.insert(kind, Arc::clone(&adapter));
                return Some(adapter);
            }
        }
        None
    }

    fn explicitly_configured(kind: FacilitatorKind) -> bool {
        let var = match kind {
            FacilitatorKind::RemoteA => "FACILITATOR_REMOTE_A_URL",
            FacilitatorKind::RemoteB => "FACILITATOR_REMOTE_B_URL",
            FacilitatorKind::RemoteC => "FACILITATOR_REMOTE_C_URL",
            FacilitatorKind::SelfHosted => return false,
        };
        std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Verify a payment, honoring a client-forced adapter type
    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        force: Option<FacilitatorKind>,
    ) -> VerifyOutcome {
        if let Some(kind) = force {
            return match self.forced_adapter(kind) {
                Some(adapter) if adapter.available() => {
                    // Forced selection never falls back.
                    Self::run_verify(adapter.as_ref(), payload, requirements).await
                }
                _ => VerifyOutcome::invalid("Requested facilitator is not available")
                    .from_facilitator(format!("{} (unavailable)", kind)),
            };
        }

        let outcome = Self::run_verify(self.primary.as_ref(), payload, requirements).await;
        if outcome.valid {
            return outcome;
        }
        if let Some(fallback) = &self.fallback {
            tracing::warn!(
                primary = self.primary.name(),
                fallback = fallback.name(),
                error = outcome.error.as_deref().unwrap_or(""),
                "primary facilitator rejected verification, trying fallback"
            );
            return Self::run_verify(fallback.as_ref(), payload, requirements).await;
        }
        outcome
    }

    /// Settle a payment
    ///
    /// A client-forced adapter type is honored exactly, as in
    /// [`Self::verify`]. Otherwise settlement is pinned to `verified_by`,
    /// the name of the adapter that produced the verification, so the
    /// settlement is never reported through a different facilitator than
    /// the one that verified the payment. Without either, only the primary
    /// is tried; settlement never cascades on its own.
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        force: Option<FacilitatorKind>,
        verified_by: Option<&str>,
    ) -> SettleOutcome {
        if let Some(kind) = force {
            return match self.forced_adapter(kind) {
                Some(adapter) if adapter.available() => {
                    Self::run_settle(adapter.as_ref(), payload, requirements).await
                }
                _ => SettleOutcome::failed("Requested facilitator is not available")
                    .from_facilitator(format!("{} (unavailable)", kind)),
            };
        }

        if let Some(name) = verified_by {
            return match self.adapter_by_name(name) {
                Some(adapter) => Self::run_settle(adapter.as_ref(), payload, requirements).await,
                None => SettleOutcome::failed("Verifying facilitator is not available")
                    .from_facilitator(name),
            };
        }

        Self::run_settle(self.primary.as_ref(), payload, requirements).await
    }

    /// Configured or on-demand adapter with the given name
    fn adapter_by_name(&self, name: &str) -> Option<Arc<dyn FacilitatorAdapter>> {
        if self.primary.name() == name {
            return Some(Arc::clone(&self.primary));
        }
        if let Some(fallback) = &self.fallback {
            if fallback.name() == name {
                return Some(Arc::clone(fallback));
            }
        }
        self.on_demand
            .iter()
            .find(|entry| entry.value().name() == name)
            .map(|entry| Arc::clone(entry.value()))
    }

    async fn run_verify(
        adapter: &dyn FacilitatorAdapter,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyOutcome {
        match adapter.verify(payload, requirements).await {
            Ok(outcome) => outcome.from_facilitator(adapter.name()),
            Err(err) => {
                tracing::error!(facilitator = adapter.name(), error = %err, "verify failed");
                VerifyOutcome::invalid(err.to_string()).from_facilitator(adapter.name())
            }
        }
    }

    async fn run_settle(
        adapter: &dyn FacilitatorAdapter,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleOutcome {
        match adapter.settle(payload, requirements).await {
            Ok(outcome) => outcome.from_facilitator(adapter.name()),
            Err(err) => {
                tracing::error!(facilitator = adapter.name(), error = %err, "settle failed");
                SettleOutcome::failed(err.to_string()).from_facilitator(adapter.name())
            }
        }
    }
}
