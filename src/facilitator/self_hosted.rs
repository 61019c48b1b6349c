//! In-process facilitator backed by the gateway's own keys
//!
//! Verification checks the payload against the requirements locally:
//! recipient, amount, authorization window, and (for EVM payloads) the
//! EIP-712 signature. Settlement broadcasts on chain through plain
//! JSON-RPC: EVM payments are wrapped in a `transferWithAuthorization`
//! call signed with the gateway's key, Solana payments are the client's
//! own signed transaction, co-signed when a fee-payer slot was left for
//! the gateway.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ethereum_types::{Address, U256};
use serde_json::{json, Value};
use solana_sdk::signature::{Keypair, Signature, Signer};

use super::{decode_svm_transaction, svm_fee_payer, FacilitatorAdapter};
use crate::crypto::signature::{
    address_of_private_key, encode_transfer_with_authorization, verify_payment_payload,
    LegacyTransaction,
};
use crate::types::{
    assets, chains, schemes, ExactEvmPayload, ExactSvmPayload, FacilitatorKind, PaymentData,
    PaymentPayload, PaymentRequirements, SettleOutcome, VerifyOutcome,
};
use crate::{GatewayError, Result};

/// Gas budget for a `transferWithAuthorization` call
const TRANSFER_GAS_LIMIT: u64 = 120_000;

/// Deadline for each on-chain JSON-RPC call
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

fn default_rpc_url(chain: &str) -> Option<&'static str> {
    match chain {
        chains::SOLANA => Some("https://api.mainnet-beta.solana.com"),
        chains::SOLANA_DEVNET => Some("https://api.devnet.solana.com"),
        chains::ETHEREUM => Some("https://eth.llamarpc.com"),
        chains::BASE => Some("https://mainnet.base.org"),
        _ => None,
    }
}

/// In-process signer facilitator
pub struct SelfHostedFacilitator {
    evm_private_key: Option<String>,
    solana_keypair: Option<Keypair>,
    rpc_overrides: HashMap<String, String>,
    client: reqwest::Client,
}

impl SelfHostedFacilitator {
    /// Create a signer with no keys configured (unavailable)
    pub fn new() -> Self {
        Self {
            evm_private_key: None,
            solana_keypair: None,
            rpc_overrides: HashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a signer from environment variables
    ///
    /// Reads `FACILITATOR_EVM_PRIVATE_KEY` (0x-hex),
    /// `FACILITATOR_SOLANA_KEYPAIR` (JSON byte array, keypair-file format),
    /// and per-chain RPC overrides `FACILITATOR_<CHAIN>_RPC_URL`.
    pub fn from_env() -> Result<Self> {
        let mut facilitator = Self::new();
        if let Ok(key) = std::env::var("FACILITATOR_EVM_PRIVATE_KEY") {
            if !key.is_empty() {
                facilitator = facilitator.with_evm_private_key(key)?;
            }
        }
        if let Ok(raw) = std::env::var("FACILITATOR_SOLANA_KEYPAIR") {
            if !raw.is_empty() {
                facilitator = facilitator.with_solana_keypair_json(&raw)?;
            }
        }
        for chain in chains::all_supported() {
            let var = format!(
                "FACILITATOR_{}_RPC_URL",
                chain.replace('-', "_").to_uppercase()
            );
            if let Ok(url) = std::env::var(&var) {
                if !url.is_empty() {
                    facilitator.rpc_overrides.insert(chain.to_string(), url);
                }
            }
        }
        Ok(facilitator)
    }

    /// Configure the EVM signing key
    pub fn with_evm_private_key(mut self, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        // Fail fast on a malformed key rather than at settlement time.
        let signer = address_of_private_key(&key)?;
        tracing::info!(signer = %format!("{:?}", signer), "self-hosted EVM signer configured");
        self.evm_private_key = Some(key);
        Ok(self)
    }

    /// Configure the Solana keypair from keypair-file JSON
    pub fn with_solana_keypair_json(mut self, raw: &str) -> Result<Self> {
        let bytes: Vec<u8> = serde_json::from_str(raw)
            .map_err(|_| GatewayError::config("Invalid Solana keypair JSON"))?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|_| GatewayError::config("Invalid Solana keypair bytes"))?;
        tracing::info!(signer = %keypair.pubkey(), "self-hosted Solana signer configured");
        self.solana_keypair = Some(keypair);
        Ok(self)
    }

    /// Override the RPC URL used for a chain
    pub fn with_rpc_url(mut self, chain: impl Into<String>, url: impl Into<String>) -> Self {
        self.rpc_overrides.insert(chain.into(), url.into());
        self
    }

    fn rpc_url(&self, chain: &str) -> Result<String> {
        if let Some(url) = self.rpc_overrides.get(chain) {
            return Ok(url.clone());
        }
        default_rpc_url(chain)
            .map(|url| url.to_string())
            .ok_or_else(|| GatewayError::chain_not_supported(chain))
    }

    async fn rpc_call(&self, url: &str, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(url)
            .timeout(RPC_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::facilitator_error(format!(
                "RPC call '{}' failed with status: {}",
                method,
                response.status()
            )));
        }
        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error");
            return Err(GatewayError::facilitator_error(format!(
                "RPC call '{}' failed: {}",
                method, message
            )));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| GatewayError::facilitator_error("RPC response missing result"))
    }

    fn verify_evm(
        &self,
        payload: &PaymentPayload,
        evm: &ExactEvmPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyOutcome> {
        let auth = &evm.authorization;
        let payer = auth.from.clone();

        if payload.scheme != requirements.scheme || payload.scheme != schemes::EXACT {
            return Ok(VerifyOutcome::invalid("scheme_mismatch"));
        }
        if payload.network != requirements.network {
            return Ok(VerifyOutcome::invalid("network_mismatch"));
        }
        if !auth.to.eq_ignore_ascii_case(&requirements.pay_to) {
            let mut outcome = VerifyOutcome::invalid("recipient_mismatch");
            outcome.payer = Some(payer);
            return Ok(outcome);
        }

        let offered: u128 = auth
            .value
            .parse()
            .map_err(|_| GatewayError::invalid_authorization("Invalid authorization value"))?;
        let required = requirements.amount_base_units()?;
        if offered < required {
            let mut outcome = VerifyOutcome::invalid("insufficient_amount");
            outcome.payer = Some(payer);
            return Ok(outcome);
        }

        if !auth.is_valid_now()? {
            let mut outcome = VerifyOutcome::invalid("authorization_expired");
            outcome.payer = Some(payer);
            return Ok(outcome);
        }

        match verify_payment_payload(evm, &payload.network) {
            Ok(true) => Ok(VerifyOutcome::valid(Some(payer))),
            Ok(false) => {
                let mut outcome = VerifyOutcome::invalid("invalid_signature");
                outcome.payer = Some(payer);
                Ok(outcome)
            }
            Err(err) => Ok(VerifyOutcome::invalid(err.to_string())),
        }
    }

    fn verify_svm(
        &self,
        payload: &PaymentPayload,
        svm: &ExactSvmPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyOutcome> {
        if payload.scheme != requirements.scheme || payload.scheme != schemes::EXACT {
            return Ok(VerifyOutcome::invalid("scheme_mismatch"));
        }
        if payload.network != requirements.network {
            return Ok(VerifyOutcome::invalid("network_mismatch"));
        }
        let tx = match decode_svm_transaction(&svm.transaction) {
            Ok(tx) => tx,
            Err(err) => return Ok(VerifyOutcome::invalid(err.to_string())),
        };
        if tx.signatures.is_empty() {
            return Ok(VerifyOutcome::invalid("transaction_unsigned"));
        }
        match svm_fee_payer(&tx) {
            Some(payer) => Ok(VerifyOutcome::valid(Some(payer))),
            None => Ok(VerifyOutcome::invalid("missing_fee_payer")),
        }
    }

    async fn settle_evm(
        &self,
        payload: &PaymentPayload,
        evm: &ExactEvmPayload,
    ) -> Result<SettleOutcome> {
        let key = match &self.evm_private_key {
            Some(key) => key,
            None => return Ok(SettleOutcome::failed("no EVM signing key configured")),
        };
        let chain = payload.network.as_str();
        let chain_id = chains::evm_chain_id(chain)
            .ok_or_else(|| GatewayError::chain_not_supported(chain))?;
        let contract = assets::usdc_address(chain)
            .ok_or_else(|| GatewayError::chain_not_supported(chain))?;
        let contract: Address = contract
            .parse()
            .map_err(|_| GatewayError::internal("Bad asset address table entry"))?;
        let url = self.rpc_url(chain)?;

        let signer = address_of_private_key(key)?;
        let data = encode_transfer_with_authorization(evm)?;

        let nonce = self
            .rpc_call(
                &url,
                "eth_getTransactionCount",
                json!([format!("{:?}", signer), "pending"]),
            )
            .await?;
        let nonce = parse_quantity(&nonce)?;
        let gas_price = self.rpc_call(&url, "eth_gasPrice", json!([])).await?;
        let gas_price = parse_quantity(&gas_price)?;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit: U256::from(TRANSFER_GAS_LIMIT),
            to: contract,
            value: U256::zero(),
            data,
            chain_id,
        };
        let raw = tx.sign(key)?;

        let tx_hash = self
            .rpc_call(&url, "eth_sendRawTransaction", json!([raw]))
            .await?;
        let tx_hash = tx_hash
            .as_str()
            .ok_or_else(|| GatewayError::facilitator_error("Malformed transaction hash"))?;
        tracing::info!(chain, tx_hash, "EVM settlement broadcast");
        Ok(SettleOutcome::settled(
            tx_hash,
            Some(evm.authorization.from.clone()),
        ))
    }

    async fn settle_svm(
        &self,
        payload: &PaymentPayload,
        svm: &ExactSvmPayload,
    ) -> Result<SettleOutcome> {
        use base64::{engine::general_purpose, Engine as _};

        let chain = payload.network.as_str();
        let url = self.rpc_url(chain)?;
        let mut tx = decode_svm_transaction(&svm.transaction)?;

        // Fill a fee-payer slot the client left for the gateway's signer.
        if let Some(keypair) = &self.solana_keypair {
            let our_key = keypair.pubkey();
            let position = tx
                .message
                .static_account_keys()
                .iter()
                .position(|key| *key == our_key);
            if let Some(position) = position {
                if position < tx.signatures.len()
                    && tx.signatures[position] == Signature::default()
                {
                    let message_bytes = tx.message.serialize();
                    tx.signatures[position] = keypair.sign_message(&message_bytes);
                    tracing::debug!(signer = %our_key, "co-signed settlement transaction");
                }
            }
        }

        let serialized = bincode::serialize(&tx)
            .map_err(|e| GatewayError::internal(format!("Failed to serialize transaction: {}", e)))?;
        let encoded = general_purpose::STANDARD.encode(serialized);

        let payer = svm_fee_payer(&tx);
        let signature = self
            .rpc_call(
                &url,
                "sendTransaction",
                json!([encoded, {"encoding": "base64"}]),
            )
            .await?;
        let signature = signature
            .as_str()
            .ok_or_else(|| GatewayError::facilitator_error("Malformed transaction signature"))?;
        tracing::info!(chain, signature, "Solana settlement broadcast");
        Ok(SettleOutcome::settled(signature, payer))
    }
}

impl Default for SelfHostedFacilitator {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_quantity(value: &Value) -> Result<U256> {
    let raw = value
        .as_str()
        .ok_or_else(|| GatewayError::facilitator_error("Malformed RPC quantity"))?;
    U256::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|_| GatewayError::facilitator_error("Malformed RPC quantity"))
}

#[async_trait]
impl FacilitatorAdapter for SelfHostedFacilitator {
    fn name(&self) -> &str {
        "self-hosted"
    }

    fn kind(&self) -> FacilitatorKind {
        FacilitatorKind::SelfHosted
    }

    fn available(&self) -> bool {
        self.evm_private_key.is_some() || self.solana_keypair.is_some()
    }

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyOutcome> {
        if requirements.pay_to.is_empty() {
            return Ok(VerifyOutcome::invalid("payTo is required"));
        }
        match &payload.payload {
            PaymentData::Evm(evm) => self.verify_evm(payload, evm, requirements),
            PaymentData::Svm(svm) => self.verify_svm(payload, svm, requirements),
            PaymentData::Other(_) => Ok(VerifyOutcome::invalid("unrecognized payload shape")),
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleOutcome> {
        // Settlement re-checks the payload before touching the chain.
        let verification = self.verify(payload, requirements).await?;
        if !verification.valid {
            let reason = verification
                .error
                .unwrap_or_else(|| "verification failed".to_string());
            return Ok(SettleOutcome::failed(reason.clone()).with_reason(reason));
        }
        match &payload.payload {
            PaymentData::Evm(evm) => self.settle_evm(payload, evm).await,
            PaymentData::Svm(svm) => self.settle_svm(payload, svm).await,
            PaymentData::Other(_) => Ok(SettleOutcome::failed("unrecognized payload shape")),
        }
    }
}
