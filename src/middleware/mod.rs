//! x402 payment middleware
//!
//! The pipeline every paid RPC call runs through: resolve a provider via
//! the router, take the pre-paid batch fast path when an `x402-batch`
//! header is present, emit a 402 challenge when no payment accompanies the
//! request, and otherwise verify and settle the submitted payment through
//! the facilitator manager before the call is forwarded upstream.
//!
//! # Architecture
//!
//! - [`challenge`] - 402 challenge construction and USD base-unit conversion
//! - [`payment`] - The pipeline itself and its [`payment::PaymentDecision`] output
//!
//! # Payment Flow
//!
//! 1. Request arrives without `x402-payment` → 402 with a replayable challenge
//! 2. Request arrives with `x402-batch` → atomic ledger debit, no facilitator call
//! 3. Request arrives with `x402-payment` → verify, then settle, then forward
//! 4. `batchPurchase: true` settlements mint a new batch instead of forwarding

pub mod challenge;
pub mod payment;

#[cfg(test)]
mod tests;

pub use challenge::{build_challenge_requirements, usd_to_base_units};
pub use payment::{validate_request, PaymentDecision, RpcCallRequest, X402Middleware};
