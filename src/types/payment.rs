//! Payment-related wire types
//!
//! Defines the 402 challenge body, the client payment submission carried in
//! the `x402-payment` header, the tagged per-adapter payment payloads, and
//! the settlement receipt attached to every paid response.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::facilitator::FacilitatorKind;

/// x402 protocol version
pub const X402_VERSION: u32 = 1;

/// Payment requirements for a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequirements {
    /// Payment scheme identifier (e.g., "exact")
    pub scheme: String,
    /// Chain identifier (e.g., "solana", "base")
    pub network: String,
    /// Required payment amount as a decimal string in the asset's base unit
    #[serde(rename = "maxAmountRequired")]
    pub max_amount_required: String,
    /// Asset symbol or mint/contract address
    pub asset: String,
    /// Recipient wallet address for the payment
    #[serde(rename = "payTo")]
    pub pay_to: String,
    /// URL of the paid resource
    pub resource: String,
    /// Human-readable description of the resource
    pub description: String,
    /// MIME type of the expected response
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// JSON schema describing the response format
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Maximum time allowed for payment completion in seconds
    #[serde(rename = "maxTimeoutSeconds")]
    pub max_timeout_seconds: u32,
    /// Scheme- and gateway-specific additional information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    /// Create a new payment requirements instance
    pub fn new(
        scheme: impl Into<String>,
        network: impl Into<String>,
        max_amount_required: impl Into<String>,
        asset: impl Into<String>,
        pay_to: impl Into<String>,
        resource: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            network: network.into(),
            max_amount_required: max_amount_required.into(),
            asset: asset.into(),
            pay_to: pay_to.into(),
            resource: resource.into(),
            description: description.into(),
            mime_type: None,
            output_schema: None,
            max_timeout_seconds: 60,
            extra: None,
        }
    }

    /// Required amount parsed as a base-unit integer
    pub fn amount_base_units(&self) -> crate::Result<u128> {
        self.max_amount_required.parse().map_err(|_| {
            crate::GatewayError::invalid_request("Invalid maxAmountRequired format")
        })
    }

    /// Fill the optional metadata fields remote facilitators insist on
    pub fn fill_defaults(&mut self) {
        if self.mime_type.is_none() {
            self.mime_type = Some("application/json".to_string());
        }
        if self.description.is_empty() {
            self.description = "RPC access".to_string();
        }
        if self.max_timeout_seconds == 0 {
            self.max_timeout_seconds = 60;
        }
    }
}

/// Payment payload submitted by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPayload {
    /// Protocol version identifier
    #[serde(rename = "x402Version")]
    pub x402_version: u32,
    /// Payment scheme identifier
    pub scheme: String,
    /// Chain identifier
    pub network: String,
    /// Adapter-specific payment data
    pub payload: PaymentData,
}

impl PaymentPayload {
    /// Create a new payment payload
    pub fn new(
        scheme: impl Into<String>,
        network: impl Into<String>,
        payload: PaymentData,
    ) -> Self {
        Self {
            x402_version: X402_VERSION,
            scheme: scheme.into(),
            network: network.into(),
            payload,
        }
    }

    /// Decode a base64-encoded payment payload
    pub fn from_base64(encoded: &str) -> crate::Result<Self> {
        use base64::{engine::general_purpose, Engine as _};
        let decoded = general_purpose::STANDARD.decode(encoded)?;
        let payload: PaymentPayload = serde_json::from_slice(&decoded)?;
        Ok(payload)
    }

    /// Encode the payment payload to base64
    pub fn to_base64(&self) -> crate::Result<String> {
        use base64::{engine::general_purpose, Engine as _};
        let json = serde_json::to_string(self)?;
        Ok(general_purpose::STANDARD.encode(json))
    }
}

/// Adapter-specific payment data
///
/// Each facilitator family owns one variant; the shared envelope fields live
/// on [`PaymentPayload`]. Unknown shapes deserialize into `Other` and are
/// passed to remote facilitators verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentData {
    /// EIP-3009 authorization with an EIP-712 signature (EVM chains)
    Evm(ExactEvmPayload),
    /// Fully signed, base64-encoded transaction (Solana chains)
    Svm(ExactSvmPayload),
    /// Vendor-specific shape the gateway forwards untouched
    Other(Value),
}

impl PaymentData {
    /// The payer address, where the payload shape carries one
    pub fn payer_hint(&self) -> Option<String> {
        match self {
            PaymentData::Evm(evm) => Some(evm.authorization.from.clone()),
            PaymentData::Svm(_) => None,
            PaymentData::Other(value) => value
                .get("payer")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        }
    }

    /// Borrow the EVM variant, if that is what this is
    pub fn as_evm(&self) -> Option<&ExactEvmPayload> {
        match self {
            PaymentData::Evm(evm) => Some(evm),
            _ => None,
        }
    }

    /// Borrow the Solana variant, if that is what this is
    pub fn as_svm(&self) -> Option<&ExactSvmPayload> {
        match self {
            PaymentData::Svm(svm) => Some(svm),
            _ => None,
        }
    }
}

/// Exact EVM payment payload (EIP-3009)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactEvmPayload {
    /// EIP-712 signature over the authorization
    pub signature: String,
    /// EIP-3009 authorization parameters
    pub authorization: ExactEvmAuthorization,
}

/// EIP-3009 authorization parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactEvmAuthorization {
    /// Payer's wallet address
    pub from: String,
    /// Recipient's wallet address
    pub to: String,
    /// Payment amount in atomic units
    pub value: String,
    /// Unix timestamp when authorization becomes valid
    #[serde(rename = "validAfter")]
    pub valid_after: String,
    /// Unix timestamp when authorization expires
    #[serde(rename = "validBefore")]
    pub valid_before: String,
    /// 32-byte random nonce to prevent replay attacks
    pub nonce: String,
}

impl ExactEvmAuthorization {
    /// Check if the authorization window covers the current time
    pub fn is_valid_now(&self) -> crate::Result<bool> {
        let now = Utc::now().timestamp();
        let valid_after: i64 = self.valid_after.parse().map_err(|_| {
            crate::GatewayError::invalid_authorization("Invalid validAfter timestamp")
        })?;
        let valid_before: i64 = self.valid_before.parse().map_err(|_| {
            crate::GatewayError::invalid_authorization("Invalid validBefore timestamp")
        })?;
        Ok(now >= valid_after && now <= valid_before)
    }
}

/// Exact Solana payment payload: a client-signed transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactSvmPayload {
    /// Base64-encoded signed transaction
    pub transaction: String,
}

/// Client payment submission carried in the `x402-payment` header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSubmission {
    #[serde(rename = "paymentPayload")]
    pub payment_payload: PaymentPayload,
    /// Echo of the challenge the client is answering
    #[serde(rename = "paymentRequirements")]
    pub payment_requirements: PaymentRequirements,
    /// When true, the payment buys the provider's pre-paid bundle
    #[serde(rename = "batchPurchase", default)]
    pub batch_purchase: bool,
}

impl PaymentSubmission {
    /// Parse the submission from the raw header value
    pub fn from_header(value: &str) -> crate::Result<Self> {
        serde_json::from_str(value).map_err(|e| {
            crate::GatewayError::invalid_payment_payload(format!(
                "Failed to parse x402-payment header: {}",
                e
            ))
        })
    }
}

/// Batch spend reference carried in the `x402-batch` header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchHeader {
    #[serde(rename = "batchId")]
    pub batch_id: String,
}

impl BatchHeader {
    /// Parse the reference from the raw header value
    pub fn from_header(value: &str) -> crate::Result<Self> {
        serde_json::from_str(value).map_err(|e| {
            crate::GatewayError::invalid_request(format!(
                "Failed to parse x402-batch header: {}",
                e
            ))
        })
    }
}

/// HTTP 402 challenge body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentChallenge {
    /// Protocol version
    #[serde(rename = "x402Version")]
    pub x402_version: u32,
    /// Why the previous attempt (if any) was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Adapter-provided failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Facilitator the failure is attributed to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facilitator: Option<String>,
    /// Acceptable payment methods; always replayable
    pub accepts: Vec<PaymentRequirements>,
}

impl PaymentChallenge {
    /// Challenge with no attached error
    pub fn new(accepts: Vec<PaymentRequirements>) -> Self {
        Self {
            x402_version: X402_VERSION,
            error: None,
            details: None,
            facilitator: None,
            accepts,
        }
    }

    /// Attach an error message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach adapter failure detail
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attribute the failure to a facilitator
    pub fn with_facilitator(mut self, facilitator: impl Into<String>) -> Self {
        self.facilitator = Some(facilitator.into());
        self
    }
}

/// Facilitator block advertised inside a challenge's `extra`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorAdvert {
    /// Primary facilitator name
    pub primary: String,
    /// Primary facilitator type key
    #[serde(rename = "type")]
    pub kind: FacilitatorKind,
    /// Fallback facilitator name, when one is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// Pre-paid bundle offer advertised inside a challenge's `extra`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOption {
    /// Number of calls in the bundle
    pub calls: u32,
    /// Total bundle price in USD
    pub price: Decimal,
    /// Discount versus paying per call, rendered as a percentage
    pub savings: String,
}

/// Settlement outcome recorded on a paid response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Settled,
    Failed,
}

/// On-chain payment detail inside a [`Receipt`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInfo {
    /// Chain the payment settled on
    pub chain: String,
    /// Settlement transaction hash
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    /// Amount paid in USD
    pub amount: Decimal,
    /// Payer address, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// Settlement wall-clock time
    pub timestamp: DateTime<Utc>,
    /// Block-explorer link for the transaction
    pub explorer: String,
    /// Facilitator that produced the settlement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// The `x402` sub-object attached to every paid RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Upstream provider that served the call
    pub provider: String,
    /// Cost of the call in USD
    pub cost: Decimal,
    /// Settlement outcome
    pub status: SettlementStatus,
    /// On-chain settlement proof
    #[serde(rename = "paymentInfo")]
    pub payment_info: PaymentInfo,
    /// Free-form annotation, e.g. fallback usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Descriptor returned after a successful batch purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDescriptor {
    #[serde(rename = "batchId")]
    pub batch_id: String,
    /// Total number of calls purchased
    pub calls: u32,
    #[serde(rename = "callsRemaining")]
    pub calls_remaining: u32,
    #[serde(rename = "amountPaid")]
    pub amount_paid: Decimal,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn evm_payload() -> PaymentPayload {
        PaymentPayload::new(
            "exact",
            "base",
            PaymentData::Evm(ExactEvmPayload {
                signature: "0x2d6a".to_string(),
                authorization: ExactEvmAuthorization {
                    from: "0x857b06519E91e3A54538791bDbb0E22373e36b66".to_string(),
                    to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string(),
                    value: "150".to_string(),
                    valid_after: "0".to_string(),
                    valid_before: "99999999999".to_string(),
                    nonce: "0xf374".to_string(),
                },
            }),
        )
    }

    #[test]
    fn test_payload_base64_round_trip() {
        let payload = evm_payload();
        let encoded = payload.to_base64().unwrap();
        let decoded = PaymentPayload::from_base64(&encoded).unwrap();
        assert_eq!(decoded.x402_version, X402_VERSION);
        assert_eq!(decoded.network, "base");
        assert_eq!(
            decoded.payload.payer_hint().unwrap(),
            "0x857b06519E91e3A54538791bDbb0E22373e36b66"
        );
    }

    #[test]
    fn test_payment_data_untagged_svm() {
        let json = serde_json::json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "solana",
            "payload": { "transaction": "AQIDBA==" }
        });
        let payload: PaymentPayload = serde_json::from_value(json).unwrap();
        assert!(payload.payload.as_svm().is_some());
        assert!(payload.payload.as_evm().is_none());
    }

    #[test]
    fn test_requirements_fill_defaults() {
        let mut reqs = PaymentRequirements::new(
            "exact", "solana", "150", "USDC", "GatewayWallet111", "https://gw/rpc", "",
        );
        reqs.max_timeout_seconds = 0;
        reqs.fill_defaults();
        assert_eq!(reqs.mime_type.as_deref(), Some("application/json"));
        assert_eq!(reqs.description, "RPC access");
        assert_eq!(reqs.max_timeout_seconds, 60);
    }

    #[test]
    fn test_requirements_amount_base_units() {
        let reqs = PaymentRequirements::new(
            "exact", "solana", "150", "USDC", "w", "r", "d",
        );
        assert_eq!(reqs.amount_base_units().unwrap(), 150);

        let bad = PaymentRequirements::new(
            "exact", "solana", "0.15", "USDC", "w", "r", "d",
        );
        assert!(bad.amount_base_units().is_err());
    }

    #[test]
    fn test_submission_from_header() {
        let header = serde_json::json!({
            "paymentPayload": serde_json::to_value(evm_payload()).unwrap(),
            "paymentRequirements": {
                "scheme": "exact",
                "network": "base",
                "maxAmountRequired": "150",
                "asset": "USDC",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "resource": "https://gw/rpc",
                "description": "RPC access",
                "maxTimeoutSeconds": 60
            },
            "batchPurchase": true
        })
        .to_string();
        let submission = PaymentSubmission::from_header(&header).unwrap();
        assert!(submission.batch_purchase);
        assert_eq!(submission.payment_requirements.network, "base");
    }

    #[test]
    fn test_challenge_serialization_skips_empty_error() {
        let challenge = PaymentChallenge::new(vec![]);
        let json = serde_json::to_value(&challenge).unwrap();
        assert_eq!(json["x402Version"], 1);
        assert!(json.get("error").is_none());

        let challenge = challenge.with_error("Batch expired or depleted");
        let json = serde_json::to_value(&challenge).unwrap();
        assert_eq!(json["error"], "Batch expired or depleted");
    }

    #[test]
    fn test_receipt_wire_shape() {
        let receipt = Receipt {
            provider: "Helius".to_string(),
            cost: Decimal::from_str("0.00015").unwrap(),
            status: SettlementStatus::Settled,
            payment_info: PaymentInfo {
                chain: "solana".to_string(),
                tx_hash: "abc123".to_string(),
                amount: Decimal::from_str("0.00015").unwrap(),
                payer: Some("Payer111".to_string()),
                timestamp: Utc::now(),
                explorer: "https://orb.helius.dev/tx/abc123".to_string(),
                provider: Some("self-hosted".to_string()),
            },
            note: None,
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["status"], "settled");
        assert_eq!(json["paymentInfo"]["txHash"], "abc123");
        assert!(json.get("note").is_none());
    }
}
