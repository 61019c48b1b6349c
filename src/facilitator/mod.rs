//! Facilitator adapters for payment verification and settlement
//!
//! A facilitator attests to and executes the on-chain payment behind an
//! x402 challenge. The gateway speaks to several of them through one
//! trait: an in-process signer plus three remote HTTP services, each with
//! its own wire quirks. The [`manager`] orchestrates primary/fallback
//! selection across adapters and honors client-forced selection.
//!
//! # Architecture
//!
//! - [`FacilitatorAdapter`] - The uniform verify/settle contract
//! - [`self_hosted`] - In-process signer holding the gateway's keys
//! - [`remote_a`] - Remote service with separate verify and settle endpoints
//! - [`remote_b`] - Remote service whose settle endpoint does both steps
//! - [`remote_c`] - Vendor API with JWT auth and a direct-HTTP fallback
//! - [`manager`] - Primary/fallback orchestration and forced selection
//!
//! # Examples
//!
//! ## Verifying and settling through the manager
//!
//! ```no_run
//! use x402_rpc_gateway::facilitator::FacilitatorManager;
//!
//! # async fn example(
//! #     manager: &FacilitatorManager,
//! #     payload: &x402_rpc_gateway::types::PaymentPayload,
//! #     reqs: &x402_rpc_gateway::types::PaymentRequirements,
//! # ) {
//! let verification = manager.verify(payload, reqs, None).await;
//! if verification.valid {
//!     // Settlement is pinned to the adapter that verified.
//!     let settlement = manager
//!         .settle(payload, reqs, None, verification.facilitator.as_deref())
//!         .await;
//!     println!("settled: {:?}", settlement.tx_hash);
//! }
//! # }
//! ```

pub mod manager;
pub mod remote_a;
pub mod remote_b;
pub mod remote_c;
pub mod self_hosted;


pub use manager::FacilitatorManager;
pub use remote_a::RemoteAFacilitator;
pub use remote_b::RemoteBFacilitator;
pub use remote_c::RemoteCFacilitator;
pub use self_hosted::SelfHostedFacilitator;

use async_trait::async_trait;

use crate::types::{
    assets, FacilitatorKind, PaymentPayload, PaymentRequirements, SettleOutcome, VerifyOutcome,
};
use crate::{GatewayError, Result};

/// Uniform contract every facilitator adapter implements
///
/// `verify` and `settle` return structured outcomes for protocol-level
/// rejections and reserve `Err` for transport problems; the manager folds
/// both into outcome values so failures never cross the middleware
/// boundary as exceptions.
#[async_trait]
pub trait FacilitatorAdapter: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Adapter type key
    fn kind(&self) -> FacilitatorKind;

    /// Whether the adapter can serve requests right now
    fn available(&self) -> bool;

    /// Check a payment payload against the requirements
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyOutcome>;

    /// Execute the payment on chain
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleOutcome>;
}

/// Normalize requirements before they go out on a remote wire
///
/// Amount stays a decimal base-unit string, the asset becomes a bare
/// address string where the symbol maps to one, `payTo` is mandatory, and
/// missing optional metadata gets safe defaults.
pub(crate) fn normalize_requirements(
    requirements: &PaymentRequirements,
) -> Result<PaymentRequirements> {
    if requirements.pay_to.is_empty() {
        return Err(GatewayError::invalid_request("payTo is required"));
    }
    let mut normalized = requirements.clone();
    normalized.fill_defaults();
    if normalized.asset == assets::USDC {
        if let Some(address) = assets::usdc_address(&normalized.network) {
            normalized.asset = address.to_string();
        }
    }
    if normalized.extra.is_none() {
        normalized.extra = Some(serde_json::json!({}));
    }
    Ok(normalized)
}

/// Classify a transport error the way callers surface it
pub(crate) fn classify_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "facilitator timeout".to_string()
    } else if err.is_connect() {
        "facilitator unreachable".to_string()
    } else {
        format!("facilitator request failed: {}", err)
    }
}

/// Decode a base64-encoded Solana transaction
pub(crate) fn decode_svm_transaction(
    encoded: &str,
) -> Result<solana_sdk::transaction::VersionedTransaction> {
    use base64::{engine::general_purpose, Engine as _};
    let bytes = general_purpose::STANDARD.decode(encoded)?;
    bincode::deserialize(&bytes).map_err(|e| {
        GatewayError::invalid_payment_payload(format!("Failed to decode transaction: {}", e))
    })
}

/// Fee payer of a decoded Solana transaction
pub(crate) fn svm_fee_payer(tx: &solana_sdk::transaction::VersionedTransaction) -> Option<String> {
    tx.message
        .static_account_keys()
        .first()
        .map(|key| key.to_string())
}
