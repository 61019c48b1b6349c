//! Error types for the gateway
//!
//! All fallible operations in the crate return [`Result`] with a single
//! [`GatewayError`] enum. Facilitator adapters never surface these errors
//! across the middleware boundary; the manager converts them into
//! structured verify/settle outcomes first.

use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors produced by the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or incomplete client request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The router found no eligible provider
    #[error("No provider available for chain '{chain}'")]
    NoProviderAvailable { chain: String },

    /// Registry lookup for an unknown provider id
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Payment was required but missing, invalid, or unsettled
    #[error("Payment required: {reason}")]
    PaymentRequired { reason: String },

    /// A client-forced facilitator type cannot be served
    #[error("Facilitator '{kind}' is not available")]
    FacilitatorUnavailable { kind: String },

    /// A facilitator call failed
    #[error("Facilitator error: {0}")]
    FacilitatorError(String),

    /// The payment payload could not be decoded or has the wrong shape
    #[error("Invalid payment payload: {0}")]
    InvalidPaymentPayload(String),

    /// Signature verification or signing failed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// An EIP-3009 authorization is malformed
    #[error("Invalid authorization: {0}")]
    InvalidAuthorization(String),

    /// A chain identifier the gateway does not know
    #[error("Chain not supported: {chain}")]
    ChainNotSupported { chain: String },

    /// All upstream providers failed for a forwarded call
    #[error("Upstream RPC failure: {0}")]
    UpstreamFailure(String),

    /// Price oracle failure
    #[error("Price oracle error: {0}")]
    Oracle(String),

    /// Outbound HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Base64 decoding error
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Unexpected internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid-request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a no-provider error for a chain
    pub fn no_provider(chain: impl Into<String>) -> Self {
        Self::NoProviderAvailable {
            chain: chain.into(),
        }
    }

    /// Create a payment-required error
    pub fn payment_required(reason: impl Into<String>) -> Self {
        Self::PaymentRequired {
            reason: reason.into(),
        }
    }

    /// Create a facilitator-unavailable error
    pub fn facilitator_unavailable(kind: impl Into<String>) -> Self {
        Self::FacilitatorUnavailable { kind: kind.into() }
    }

    /// Create a facilitator error
    pub fn facilitator_error(message: impl Into<String>) -> Self {
        Self::FacilitatorError(message.into())
    }

    /// Create an invalid-payload error
    pub fn invalid_payment_payload(message: impl Into<String>) -> Self {
        Self::InvalidPaymentPayload(message.into())
    }

    /// Create an invalid-signature error
    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::InvalidSignature(message.into())
    }

    /// Create an invalid-authorization error
    pub fn invalid_authorization(message: impl Into<String>) -> Self {
        Self::InvalidAuthorization(message.into())
    }

    /// Create a chain-not-supported error
    pub fn chain_not_supported(chain: impl Into<String>) -> Self {
        Self::ChainNotSupported {
            chain: chain.into(),
        }
    }

    /// Create an upstream-failure error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamFailure(message.into())
    }

    /// Create an oracle error
    pub fn oracle(message: impl Into<String>) -> Self {
        Self::Oracle(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::no_provider("solana");
        assert_eq!(err.to_string(), "No provider available for chain 'solana'");

        let err = GatewayError::facilitator_unavailable("remoteB");
        assert_eq!(err.to_string(), "Facilitator 'remoteB' is not available");
    }

    #[test]
    fn test_error_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: GatewayError = parse_err.into();
        assert!(matches!(err, GatewayError::Serialization(_)));
    }
}
