//! Payment pipeline
//!
//! One entry point, [`X402Middleware::process`], turns an incoming RPC call
//! plus its payment headers into a [`PaymentDecision`] the gateway endpoint
//! acts on. Facilitator failures arrive here as structured outcomes and are
//! shaped into fresh, replayable challenges; nothing payment-related is
//! thrown across this boundary.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::challenge::build_challenge_requirements;
use crate::facilitator::FacilitatorManager;
use crate::ledger::BatchLedger;
use crate::oracle::{PriceFreshness, PriceOracle};
use crate::router::{Route, Router};
use crate::types::{
    chains, BatchDescriptor, BatchHeader, FacilitatorKind, PaymentChallenge, PaymentRequirements,
    PaymentSubmission, Provider, RoutingPreferences, SettleOutcome,
};
use crate::{GatewayError, Result};

/// Body of a paid RPC call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcCallRequest {
    /// JSON-RPC method to forward
    pub method: String,
    /// JSON-RPC params, defaults to an empty array
    #[serde(default)]
    pub params: Vec<Value>,
    /// Target chain, defaults to solana
    #[serde(default = "default_chain")]
    pub chain: String,
    /// Routing preferences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<RoutingPreferences>,
    /// Client-forced facilitator type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facilitator: Option<FacilitatorKind>,
}

fn default_chain() -> String {
    chains::SOLANA.to_string()
}

/// What the gateway should do with the request after the pipeline ran
#[derive(Debug)]
pub enum PaymentDecision {
    /// Respond 402 with this challenge
    Challenge(Box<PaymentChallenge>),
    /// A batch call was debited; forward upstream with no new settlement
    BatchSpent {
        route: Route,
        batch_id: String,
        remaining: u32,
        total_calls: u32,
    },
    /// Payment settled; forward upstream and attach the receipt
    Paid {
        route: Route,
        settlement: SettleOutcome,
        amount_usd: Decimal,
        price_note: Option<String>,
    },
    /// A batch was purchased; respond directly, do not forward
    BatchPurchased {
        descriptor: BatchDescriptor,
        /// Settlement transaction hash, when the facilitator returned one
        tx_hash: Option<String>,
        facilitator: Option<String>,
    },
}

/// The x402 payment pipeline
pub struct X402Middleware {
    router: Arc<Router>,
    manager: Arc<FacilitatorManager>,
    ledger: Arc<BatchLedger>,
    oracle: Arc<PriceOracle>,
    pay_to: String,
    settlement_asset: String,
    fee_payer_hint: Option<String>,
}

impl X402Middleware {
    /// Assemble the pipeline from its collaborators
    pub fn new(
        router: Arc<Router>,
        manager: Arc<FacilitatorManager>,
        ledger: Arc<BatchLedger>,
        oracle: Arc<PriceOracle>,
        pay_to: impl Into<String>,
        settlement_asset: impl Into<String>,
    ) -> Self {
        Self {
            router,
            manager,
            ledger,
            oracle,
            pay_to: pay_to.into(),
            settlement_asset: settlement_asset.into(),
            fee_payer_hint: None,
        }
    }

    /// Advertise a fee payer inside challenge `extra` blocks
    pub fn with_fee_payer_hint(mut self, fee_payer: impl Into<String>) -> Self {
        self.fee_payer_hint = Some(fee_payer.into());
        self
    }

    /// Run the pipeline for one request
    ///
    /// `resource` is the absolute URL of the served endpoint; router
    /// failures propagate as errors (the endpoint maps them to 400).
    pub async fn process(
        &self,
        request: &RpcCallRequest,
        payment_header: Option<&str>,
        batch_header: Option<&str>,
        resource: &str,
    ) -> Result<PaymentDecision> {
        let preferences = request.preferences.clone().unwrap_or_default();
        let route = self.router.select_with_fallback(&request.chain, &preferences)?;

        // Batch fast path: spend a pre-paid call, no facilitator involved.
        if let Some(raw) = batch_header {
            let header = BatchHeader::from_header(raw)?;
            return match self.ledger.try_debit(&header.batch_id) {
                Some(receipt) => Ok(PaymentDecision::BatchSpent {
                    route,
                    batch_id: header.batch_id,
                    remaining: receipt.remaining,
                    total_calls: receipt.total_calls,
                }),
                None => {
                    let challenge = self
                        .challenge_for(&route.primary, &request.chain, resource, None)
                        .await?
                        .with_error("Batch expired or depleted");
                    Ok(PaymentDecision::Challenge(Box::new(challenge)))
                }
            };
        }

        // Challenge path: nothing to verify yet.
        let raw_submission = match payment_header {
            Some(raw) => raw,
            None => {
                let challenge = self
                    .challenge_for(&route.primary, &request.chain, resource, None)
                    .await?;
                return Ok(PaymentDecision::Challenge(Box::new(challenge)));
            }
        };

        // Verify-and-settle path.
        let submission = match PaymentSubmission::from_header(raw_submission) {
            Ok(submission) => submission,
            Err(err) => {
                let challenge = self
                    .challenge_for(&route.primary, &request.chain, resource, None)
                    .await?
                    .with_error("Invalid payment submission")
                    .with_details(err.to_string());
                return Ok(PaymentDecision::Challenge(Box::new(challenge)));
            }
        };

        let buying_batch = submission.batch_purchase && route.primary.batch_cost.is_some();
        let amount_usd = if buying_batch {
            route
                .primary
                .batch_cost
                .as_ref()
                .map(|b| b.price)
                .unwrap_or(route.primary.cost_per_call)
        } else {
            route.primary.cost_per_call
        };

        // Requirements are rebuilt server-side; the client's echo only has
        // to agree on scheme and network.
        let (requirements, freshness) = self
            .requirements_for(&route.primary, &request.chain, amount_usd, resource)
            .await?;
        if submission.payment_requirements.network != requirements.network
            || submission.payment_requirements.scheme != requirements.scheme
        {
            let challenge = self
                .challenge_for(&route.primary, &request.chain, resource, None)
                .await?
                .with_error("Payment requirements mismatch")
                .with_details("echoed scheme or network does not match this endpoint");
            return Ok(PaymentDecision::Challenge(Box::new(challenge)));
        }

        let force = request.facilitator;
        let verification = self
            .manager
            .verify(&submission.payment_payload, &requirements, force)
            .await;
        if !verification.valid {
            let mut challenge = self
                .challenge_for(&route.primary, &request.chain, resource, None)
                .await?
                .with_error("Payment verification failed");
            if let Some(details) = verification.error {
                challenge = challenge.with_details(details);
            }
            if let Some(facilitator) = verification.facilitator {
                challenge = challenge.with_facilitator(facilitator);
            }
            return Ok(PaymentDecision::Challenge(Box::new(challenge)));
        }

        // Settlement goes to the adapter that verified, never to a
        // different one behind the caller's back.
        let settlement = self
            .manager
            .settle(
                &submission.payment_payload,
                &requirements,
                force,
                verification.facilitator.as_deref(),
            )
            .await;
        if !settlement.settled {
            let mut challenge = self
                .challenge_for(&route.primary, &request.chain, resource, None)
                .await?
                .with_error("Payment settlement failed");
            if let Some(details) = settlement.error {
                challenge = challenge.with_details(details);
            }
            if let Some(facilitator) = settlement.facilitator {
                challenge = challenge.with_facilitator(facilitator);
            }
            return Ok(PaymentDecision::Challenge(Box::new(challenge)));
        }

        let price_note = match freshness {
            PriceFreshness::Static => Some("static price fallback".to_string()),
            _ => None,
        };

        if buying_batch {
            if let Some(batch) = &route.primary.batch_cost {
                let descriptor = self.ledger.issue(batch.calls, batch.price);
                return Ok(PaymentDecision::BatchPurchased {
                    descriptor,
                    tx_hash: settlement.tx_hash.clone(),
                    facilitator: settlement.facilitator,
                });
            }
        }

        Ok(PaymentDecision::Paid {
            route,
            settlement,
            amount_usd,
            price_note,
        })
    }

    /// Server-side payment requirements for a provider and amount
    async fn requirements_for(
        &self,
        provider: &Provider,
        chain: &str,
        amount_usd: Decimal,
        resource: &str,
    ) -> Result<(PaymentRequirements, PriceFreshness)> {
        build_challenge_requirements(
            provider,
            chain,
            amount_usd,
            &self.settlement_asset,
            &self.pay_to,
            resource,
            &self.oracle,
            &self.manager.info(),
            self.fee_payer_hint.as_deref(),
        )
        .await
    }

    /// A fresh, replayable challenge priced at the provider's per-call cost
    async fn challenge_for(
        &self,
        provider: &Provider,
        chain: &str,
        resource: &str,
        amount_usd: Option<Decimal>,
    ) -> Result<PaymentChallenge> {
        let amount = amount_usd.unwrap_or(provider.cost_per_call);
        let (requirements, _) = self
            .requirements_for(provider, chain, amount, resource)
            .await?;
        Ok(PaymentChallenge::new(vec![requirements]))
    }

    /// The challenge this middleware would emit for a bare request
    ///
    /// Exposed so the endpoint can also answer explicit pricing queries.
    pub async fn bare_challenge(
        &self,
        provider: &Provider,
        chain: &str,
        resource: &str,
    ) -> Result<PaymentChallenge> {
        self.challenge_for(provider, chain, resource, None).await
    }
}

impl std::fmt::Debug for X402Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Middleware")
            .field("pay_to", &self.pay_to)
            .field("settlement_asset", &self.settlement_asset)
            .finish()
    }
}

/// Validate the request body shape beyond what serde enforces
pub fn validate_request(request: &RpcCallRequest) -> Result<()> {
    if request.method.trim().is_empty() {
        return Err(GatewayError::invalid_request("method is required"));
    }
    if !chains::is_supported(&request.chain) {
        return Err(GatewayError::chain_not_supported(&request.chain));
    }
    Ok(())
}
