//! Remote facilitator whose settle endpoint verifies and settles in one step
//!
//! The service exposes no `/verify`. Its `/settle` takes
//! `{x402Version, paymentHeader, paymentRequirements}` where
//! `paymentHeader` is `base64(JSON(paymentPayload))`. Verification here is
//! therefore optimistic: deserialize the payment transaction, pull out the
//! fee payer, and report valid when the structural shape holds. The real
//! check happens at settle.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    classify_transport_error, decode_svm_transaction, normalize_requirements, svm_fee_payer,
    FacilitatorAdapter,
};
use crate::types::{
    FacilitatorKind, PaymentData, PaymentPayload, PaymentRequirements, SettleOutcome,
    VerifyOutcome, X402_VERSION,
};
use crate::{GatewayError, Result};

/// Default base URL for the remoteB facilitator
pub const DEFAULT_REMOTE_B_URL: &str = "https://pay.corbits.network";

/// Default request timeout; settle does the whole job here
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct WireSettleResponse {
    success: bool,
    #[serde(default)]
    transaction: String,
    #[serde(rename = "errorReason", default)]
    error_reason: Option<String>,
    #[serde(default)]
    payer: Option<String>,
}

/// HTTP client for the remoteB facilitator
#[derive(Debug, Clone)]
pub struct RemoteBFacilitator {
    url: String,
    client: reqwest::Client,
}

impl RemoteBFacilitator {
    /// Create a client against a base URL
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(GatewayError::config("remoteB facilitator URL is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { url, client })
    }

    /// Create a client from `FACILITATOR_REMOTE_B_URL` or the public default
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("FACILITATOR_REMOTE_B_URL")
            .unwrap_or_else(|_| DEFAULT_REMOTE_B_URL.to_string());
        Self::new(url)
    }

    /// Base URL of this facilitator
    pub fn url(&self) -> &str {
        &self.url
    }

    fn payment_header(payload: &PaymentPayload) -> Result<String> {
        payload.to_base64()
    }
}

#[async_trait]
impl FacilitatorAdapter for RemoteBFacilitator {
    fn name(&self) -> &str {
        "remoteB"
    }

    fn kind(&self) -> FacilitatorKind {
        FacilitatorKind::RemoteB
    }

    fn available(&self) -> bool {
        !self.url.is_empty()
    }

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyOutcome> {
        // Structural check only; /settle is authoritative.
        normalize_requirements(requirements)?;
        match &payload.payload {
            PaymentData::Svm(svm) => match decode_svm_transaction(&svm.transaction) {
                Ok(tx) => {
                    if tx.signatures.is_empty() {
                        return Ok(VerifyOutcome::invalid("transaction is unsigned"));
                    }
                    match svm_fee_payer(&tx) {
                        Some(payer) => Ok(VerifyOutcome::valid(Some(payer))),
                        None => Ok(VerifyOutcome::invalid("transaction has no fee payer")),
                    }
                }
                Err(err) => Ok(VerifyOutcome::invalid(err.to_string())),
            },
            PaymentData::Evm(evm) => {
                if evm.signature.is_empty() {
                    return Ok(VerifyOutcome::invalid("authorization is unsigned"));
                }
                if !evm.authorization.is_valid_now()? {
                    return Ok(VerifyOutcome::invalid("authorization window is closed"));
                }
                Ok(VerifyOutcome::valid(Some(evm.authorization.from.clone())))
            }
            PaymentData::Other(_) => Ok(VerifyOutcome::invalid("unrecognized payload shape")),
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleOutcome> {
        let requirements = normalize_requirements(requirements)?;
        let body = json!({
            "x402Version": X402_VERSION,
            "paymentHeader": Self::payment_header(payload)?,
            "paymentRequirements": requirements,
        });

        let response = self
            .client
            .post(format!("{}/settle", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::facilitator_error(classify_transport_error(&e)))?;

        let status = response.status();
        if status.is_client_error() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| format!("facilitator rejected request ({})", status));
            return Ok(SettleOutcome::failed(detail));
        }
        if !status.is_success() {
            return Err(GatewayError::facilitator_error(format!(
                "Settlement failed with status: {}",
                status
            )));
        }

        let wire: WireSettleResponse = response.json().await?;
        if wire.success {
            let payer = wire.payer.or_else(|| match &payload.payload {
                PaymentData::Svm(svm) => decode_svm_transaction(&svm.transaction)
                    .ok()
                    .and_then(|tx| svm_fee_payer(&tx)),
                PaymentData::Evm(evm) => Some(evm.authorization.from.clone()),
                PaymentData::Other(_) => None,
            });
            Ok(SettleOutcome::settled(wire.transaction, payer))
        } else {
            let reason = wire
                .error_reason
                .unwrap_or_else(|| "settlement failed".to_string());
            Ok(SettleOutcome::failed(reason.clone()).with_reason(reason))
        }
    }
}
