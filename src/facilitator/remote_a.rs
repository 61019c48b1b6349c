//! Remote facilitator with separate verify and settle endpoints
//!
//! Wire contract: `GET /supported`, `POST /verify`, `POST /settle`, both
//! POSTs carrying `{paymentPayload, paymentRequirements}`. Verify answers
//! `{isValid, payer, invalidReason?}`, settle answers
//! `{success, transaction, errorReason?}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{classify_transport_error, normalize_requirements, FacilitatorAdapter};
use crate::types::{
    FacilitatorKind, PaymentPayload, PaymentRequirements, SettleOutcome, VerifyOutcome,
};
use crate::{GatewayError, Result};

/// Default base URL for the remoteA facilitator
pub const DEFAULT_REMOTE_A_URL: &str = "https://facilitator.codenut.io";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct WireVerifyResponse {
    #[serde(rename = "isValid")]
    is_valid: bool,
    #[serde(default)]
    payer: Option<String>,
    #[serde(rename = "invalidReason", default)]
    invalid_reason: Option<String>,
}

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

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "invalidReason", default)]
    invalid_reason: Option<String>,
}

/// HTTP client for the remoteA facilitator
#[derive(Debug, Clone)]
pub struct RemoteAFacilitator {
    url: String,
    client: reqwest::Client,
}

impl RemoteAFacilitator {
    /// Create a client against a base URL
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(GatewayError::config("remoteA facilitator URL is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { url, client })
    }

    /// Create a client from `FACILITATOR_REMOTE_A_URL` or the public default
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("FACILITATOR_REMOTE_A_URL")
            .unwrap_or_else(|_| DEFAULT_REMOTE_A_URL.to_string());
        Self::new(url)
    }

    /// Base URL of this facilitator
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Query the supported scheme/network kinds
    pub async fn supported(&self) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}/supported", self.url))
            .send()
            .await
            .map_err(|e| GatewayError::facilitator_error(classify_transport_error(&e)))?;
        if !response.status().is_success() {
            return Err(GatewayError::facilitator_error(format!(
                "Supported query failed with status: {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// Read the vendor's rejection reason out of a 4xx body
    async fn rejection_reason(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<WireErrorBody>().await {
            Ok(body) => body
                .invalid_reason
                .or(body.error)
                .unwrap_or_else(|| format!("facilitator rejected request ({})", status)),
            Err(_) => format!("facilitator rejected request ({})", status),
        }
    }
}

#[async_trait]
impl FacilitatorAdapter for RemoteAFacilitator {
    fn name(&self) -> &str {
        "remoteA"
    }

    fn kind(&self) -> FacilitatorKind {
        FacilitatorKind::RemoteA
    }

    fn available(&self) -> bool {
        !self.url.is_empty()
    }

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyOutcome> {
        let requirements = normalize_requirements(requirements)?;
        let body = json!({
            "paymentPayload": payload,
            "paymentRequirements": requirements,
        });
        tracing::debug!(url = %self.url, "remoteA verify request");

        let response = self
            .client
            .post(format!("{}/verify", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::facilitator_error(classify_transport_error(&e)))?;

        let status = response.status();
        if status.is_client_error() {
            // 4xx carries the vendor's reason verbatim; not retriable.
            return Ok(VerifyOutcome::invalid(
                Self::rejection_reason(response).await,
            ));
        }
        if !status.is_success() {
            return Err(GatewayError::facilitator_error(format!(
                "Verification failed with status: {}",
                status
            )));
        }

        let wire: WireVerifyResponse = response.json().await?;
        if wire.is_valid {
            Ok(VerifyOutcome::valid(wire.payer))
        } else {
            let mut outcome = VerifyOutcome::invalid(
                wire.invalid_reason
                    .unwrap_or_else(|| "payment rejected".to_string()),
            );
            outcome.payer = wire.payer;
            Ok(outcome)
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleOutcome> {
        let requirements = normalize_requirements(requirements)?;
        let body = json!({
            "paymentPayload": payload,
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
            return Ok(SettleOutcome::failed(
                Self::rejection_reason(response).await,
            ));
        }
        if !status.is_success() {
            return Err(GatewayError::facilitator_error(format!(
                "Settlement failed with status: {}",
                status
            )));
        }

        let wire: WireSettleResponse = response.json().await?;
        if wire.success {
            Ok(SettleOutcome::settled(wire.transaction, wire.payer))
        } else {
            let reason = wire
                .error_reason
                .unwrap_or_else(|| "settlement failed".to_string());
            Ok(SettleOutcome::failed(reason.clone()).with_reason(reason))
        }
    }
}
