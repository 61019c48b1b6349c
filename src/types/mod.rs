//! Core types for the gateway
//!
//! This module defines the data structures shared across the control plane:
//! provider descriptors and health state, routing preferences, the x402
//! payment wire types (challenge, submission, receipt), and the structured
//! facilitator outcomes.
//!
//! # Architecture
//!
//! The types module is organized as follows:
//! - [`provider`] - Provider descriptors, health records, routing preferences
//! - [`payment`] - Challenge, payment payloads, submissions, receipts
//! - [`facilitator`] - Facilitator kinds and verify/settle outcome structs
//! - [`constants`] - Chain, asset, scheme, and RPC-method tables
//!
//! # Examples
//!
//! ## Building a provider descriptor
//!
//! ```
//! use x402_rpc_gateway::types::Provider;
//! use rust_decimal::Decimal;
//! use std::str::FromStr;
//!
//! let provider = Provider::new(
//!     "helius",
//!     "Helius",
//!     vec!["solana".to_string()],
//!     "https://mainnet.helius-rpc.com",
//!     Decimal::from_str("0.00015").unwrap(),
//! )
//! .with_priority(10)
//! .with_batch_cost(1000, Decimal::from_str("0.08").unwrap());
//!
//! assert!(provider.supports_chain("solana"));
//! ```
//!
//! ## Decoding a payment payload
//!
//! ```
//! use x402_rpc_gateway::types::PaymentPayload;
//!
//! # fn example(header: &str) -> x402_rpc_gateway::Result<()> {
//! let payload = PaymentPayload::from_base64(header)?;
//! println!("scheme={} network={}", payload.scheme, payload.network);
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod facilitator;
pub mod payment;
pub mod provider;

// Re-export commonly used types
pub use constants::{assets, chains, explorer_tx_url, rpc_methods, schemes};
pub use facilitator::{
    AdapterInfo, FacilitatorInfo, FacilitatorKind, SettleOutcome, VerifyOutcome,
};
pub use payment::{
    BatchDescriptor, BatchHeader, BatchOption, ExactEvmAuthorization, ExactEvmPayload,
    ExactSvmPayload, FacilitatorAdvert, PaymentChallenge, PaymentData, PaymentInfo,
    PaymentPayload, PaymentRequirements, PaymentSubmission, Receipt, SettlementStatus,
    X402_VERSION,
};
pub use provider::{
    BatchCost, HealthStatus, Provider, ProviderHealth, ProviderStatus, RoutingPreferences,
    RoutingStrategy,
};
