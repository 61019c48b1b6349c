//! Vendor-API facilitator with JWT auth and a direct-HTTP fallback
//!
//! The vendor's endpoints accept a base64-encoded payment header plus
//! typed requirements, authenticated with an HS256 bearer token. The same
//! field shape is also served on bare `/verify` and `/settle` routes,
//! which this adapter falls back to when the vendor routes are absent.
//! The adapter requires a fee payer in `extra.feePayer`; one configured
//! via environment is injected when the challenge did not carry it.

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::json;

use super::{classify_transport_error, normalize_requirements, FacilitatorAdapter};
use crate::crypto::jwt;
use crate::types::{
    FacilitatorKind, PaymentPayload, PaymentRequirements, SettleOutcome, VerifyOutcome,
    X402_VERSION,
};
use crate::{GatewayError, Result};

/// Default base URL for the remoteC vendor API
pub const DEFAULT_REMOTE_C_URL: &str = "https://api.payai.cloud";

/// Vendor API route prefix
pub const VENDOR_ROUTE: &str = "/v1/x402";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct WireVerifyResponse {
    #[serde(rename = "isValid")]
    is_valid: bool,
    #[serde(rename = "invalidReason", default)]
    invalid_reason: Option<String>,
    #[serde(default)]
    payer: Option<String>,
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

/// HTTP client for the remoteC vendor facilitator
#[derive(Debug, Clone)]
pub struct RemoteCFacilitator {
    url: String,
    api_key_id: String,
    api_key_secret: String,
    fee_payer: Option<String>,
    client: reqwest::Client,
}

impl RemoteCFacilitator {
    /// Create a client against a base URL with explicit credentials
    pub fn new(
        url: impl Into<String>,
        api_key_id: impl Into<String>,
        api_key_secret: impl Into<String>,
    ) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(GatewayError::config("remoteC facilitator URL is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            url,
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
            fee_payer: None,
            client,
        })
    }

    /// Create a client from environment variables
    ///
    /// Reads `FACILITATOR_REMOTE_C_URL`, `REMOTE_C_API_KEY_ID`,
    /// `REMOTE_C_API_KEY_SECRET`, and `REMOTE_C_FEE_PAYER`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("FACILITATOR_REMOTE_C_URL")
            .unwrap_or_else(|_| DEFAULT_REMOTE_C_URL.to_string());
        let api_key_id = std::env::var("REMOTE_C_API_KEY_ID").unwrap_or_default();
        let api_key_secret = std::env::var("REMOTE_C_API_KEY_SECRET").unwrap_or_default();
        let mut facilitator = Self::new(url, api_key_id, api_key_secret)?;
        facilitator.fee_payer = std::env::var("REMOTE_C_FEE_PAYER").ok();
        Ok(facilitator)
    }

    /// Set the fee payer injected into requirements that lack one
    pub fn with_fee_payer(mut self, fee_payer: impl Into<String>) -> Self {
        self.fee_payer = Some(fee_payer.into());
        self
    }

    /// Base URL of this facilitator
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Configured fee payer, if any
    pub fn fee_payer(&self) -> Option<&str> {
        self.fee_payer.as_deref()
    }

    /// Requirements with `extra.feePayer` present, or an explanation why not
    fn requirements_with_fee_payer(
        &self,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<PaymentRequirements, String> {
        let mut normalized = match normalize_requirements(requirements) {
            Ok(reqs) => reqs,
            Err(err) => return Err(err.to_string()),
        };
        let extra = normalized
            .extra
            .get_or_insert_with(|| json!({}));
        let has_fee_payer = extra
            .get("feePayer")
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !has_fee_payer {
            match &self.fee_payer {
                Some(fee_payer) => {
                    extra["feePayer"] = json!(fee_payer);
                }
                None => return Err("missing extra.feePayer in payment requirements".to_string()),
            }
        }
        Ok(normalized)
    }

    fn correlation_header() -> String {
        let data = [
            ("sdk_language", "rust"),
            ("source", "x402-rpc-gateway"),
            ("source_version", crate::VERSION),
        ];
        let pairs: Vec<String> = data
            .iter()
            .map(|(key, value)| {
                format!("{}={}", key, utf8_percent_encode(value, NON_ALPHANUMERIC))
            })
            .collect();
        pairs.join(",")
    }

    /// POST one vendor operation, falling back to the bare route on 404
    async fn post_with_fallback(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        let vendor_path = format!("{}{}/{}", self.url, VENDOR_ROUTE, operation);
        let auth = jwt::create_auth_header(
            &self.api_key_id,
            &self.api_key_secret,
            "POST",
            &self.url,
            &format!("{}/{}", VENDOR_ROUTE, operation),
        )?;

        let response = self
            .client
            .post(&vendor_path)
            .header("Authorization", &auth)
            .header("Correlation-Context", Self::correlation_header())
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::facilitator_error(classify_transport_error(&e)))?;

        if response.status() != reqwest::StatusCode::NOT_FOUND {
            return Ok(response);
        }

        // Direct HTTP fallback with the same field shape.
        tracing::debug!(operation, "vendor route absent, using direct fallback");
        self.client
            .post(format!("{}/{}", self.url, operation))
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::facilitator_error(classify_transport_error(&e)))
    }
}

#[async_trait]
impl FacilitatorAdapter for RemoteCFacilitator {
    fn name(&self) -> &str {
        "remoteC"
    }

    fn kind(&self) -> FacilitatorKind {
        FacilitatorKind::RemoteC
    }

    fn available(&self) -> bool {
        !self.url.is_empty()
    }

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyOutcome> {
        let requirements = match self.requirements_with_fee_payer(requirements) {
            Ok(reqs) => reqs,
            Err(reason) => return Ok(VerifyOutcome::invalid(reason)),
        };
        let body = json!({
            "x402Version": X402_VERSION,
            "paymentHeader": payload.to_base64()?,
            "paymentRequirements": requirements,
        });

        let response = self.post_with_fallback("verify", &body).await?;
        let status = response.status();
        if status.is_client_error() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| format!("facilitator rejected request ({})", status));
            return Ok(VerifyOutcome::invalid(detail));
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
        let requirements = match self.requirements_with_fee_payer(requirements) {
            Ok(reqs) => reqs,
            Err(reason) => return Ok(SettleOutcome::failed(reason)),
        };
        let body = json!({
            "x402Version": X402_VERSION,
            "paymentHeader": payload.to_base64()?,
            "paymentRequirements": requirements,
        });

        let response = self.post_with_fallback("settle", &body).await?;
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
            Ok(SettleOutcome::settled(wire.transaction, wire.payer))
        } else {
            let reason = wire
                .error_reason
                .unwrap_or_else(|| "settlement failed".to_string());
            Ok(SettleOutcome::failed(reason.clone()).with_reason(reason))
        }
    }
}
