//! Facilitator kinds and structured verify/settle outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type key of a facilitator adapter
///
/// The set is closed at configuration time; clients force a specific
/// adapter by sending one of these keys in the `facilitator` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacilitatorKind {
    /// In-process signer holding the gateway's own keys
    #[serde(rename = "self-hosted")]
    SelfHosted,
    /// Remote facilitator with separate verify and settle endpoints
    #[serde(rename = "remoteA")]
    RemoteA,
    /// Remote facilitator whose settle endpoint performs both steps
    #[serde(rename = "remoteB")]
    RemoteB,
    /// Remote facilitator reached through a vendor API with JWT auth
    #[serde(rename = "remoteC")]
    RemoteC,
}

impl FacilitatorKind {
    /// The wire/config key for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilitatorKind::SelfHosted => "self-hosted",
            FacilitatorKind::RemoteA => "remoteA",
            FacilitatorKind::RemoteB => "remoteB",
            FacilitatorKind::RemoteC => "remoteC",
        }
    }

    /// All remote kinds, the ones constructible on demand
    pub fn remote_kinds() -> [FacilitatorKind; 3] {
        [
            FacilitatorKind::RemoteA,
            FacilitatorKind::RemoteB,
            FacilitatorKind::RemoteC,
        ]
    }

    /// Whether this kind is served by a remote HTTP facilitator
    pub fn is_remote(&self) -> bool {
        !matches!(self, FacilitatorKind::SelfHosted)
    }
}

impl fmt::Display for FacilitatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacilitatorKind {
    type Err = crate::GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self-hosted" => Ok(FacilitatorKind::SelfHosted),
            "remoteA" => Ok(FacilitatorKind::RemoteA),
            "remoteB" => Ok(FacilitatorKind::RemoteB),
            "remoteC" => Ok(FacilitatorKind::RemoteC),
            other => Err(crate::GatewayError::config(format!(
                "Unknown facilitator type: {}",
                other
            ))),
        }
    }
}

/// Result of a payment verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    /// Whether the payment is valid
    pub valid: bool,
    /// Payer address, when the adapter could determine it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// Rejection reason, verbatim from the adapter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Name of the adapter that produced this outcome, set by the manager
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facilitator: Option<String>,
}

impl VerifyOutcome {
    /// A valid outcome with an optional payer
    pub fn valid(payer: Option<String>) -> Self {
        Self {
            valid: true,
            payer,
            error: None,
            facilitator: None,
        }
    }

    /// An invalid outcome with a reason
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            payer: None,
            error: Some(error.into()),
            facilitator: None,
        }
    }

    /// Annotate with the producing adapter's name
    pub fn from_facilitator(mut self, name: impl Into<String>) -> Self {
        self.facilitator = Some(name.into());
        self
    }
}

/// Result of a payment settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleOutcome {
    /// Whether the settlement executed on chain
    pub settled: bool,
    /// Settlement transaction hash
    #[serde(rename = "txHash", skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure reason, verbatim from the adapter
    #[serde(rename = "errorReason", skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Payer address, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// Name of the adapter that produced this outcome, set by the manager
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facilitator: Option<String>,
}

impl SettleOutcome {
    /// A successful settlement
    pub fn settled(tx_hash: impl Into<String>, payer: Option<String>) -> Self {
        Self {
            settled: true,
            tx_hash: Some(tx_hash.into()),
            error: None,
            error_reason: None,
            payer,
            facilitator: None,
        }
    }

    /// A failed settlement with a reason
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            settled: false,
            tx_hash: None,
            error: Some(error.into()),
            error_reason: None,
            payer: None,
            facilitator: None,
        }
    }

    /// Attach the machine-readable reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.error_reason = Some(reason.into());
        self
    }

    /// Annotate with the producing adapter's name
    pub fn from_facilitator(mut self, name: impl Into<String>) -> Self {
        self.facilitator = Some(name.into());
        self
    }
}

/// Availability view of one configured adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// Adapter display name
    pub name: String,
    /// Adapter type key
    #[serde(rename = "type")]
    pub kind: FacilitatorKind,
    /// Whether the adapter can serve requests right now
    pub available: bool,
}

/// Snapshot of the manager's configured adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorInfo {
    pub primary: AdapterInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<AdapterInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&FacilitatorKind::SelfHosted).unwrap(),
            "\"self-hosted\""
        );
        assert_eq!(
            serde_json::to_string(&FacilitatorKind::RemoteB).unwrap(),
            "\"remoteB\""
        );
        let kind: FacilitatorKind = serde_json::from_str("\"remoteC\"").unwrap();
        assert_eq!(kind, FacilitatorKind::RemoteC);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            "self-hosted".parse::<FacilitatorKind>().unwrap(),
            FacilitatorKind::SelfHosted
        );
        assert!("remoteD".parse::<FacilitatorKind>().is_err());
    }

    #[test]
    fn test_outcome_constructors() {
        let outcome = VerifyOutcome::valid(Some("payer".to_string())).from_facilitator("remoteA");
        assert!(outcome.valid);
        assert_eq!(outcome.facilitator.as_deref(), Some("remoteA"));

        let outcome = SettleOutcome::failed("insufficient funds").with_reason("insufficient_funds");
        assert!(!outcome.settled);
        assert_eq!(outcome.error_reason.as_deref(), Some("insufficient_funds"));
    }

    #[test]
    fn test_settle_outcome_wire_shape() {
        let outcome = SettleOutcome::settled("abc123", None);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["txHash"], "abc123");
        assert!(json.get("error").is_none());
    }
}
