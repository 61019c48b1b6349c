//! 402 challenge construction
//!
//! Builds the `accepts[0]` entry of a challenge from the selected provider,
//! the gateway's receiving wallet, and the price oracle. Amounts are always
//! decimal strings in the asset's base unit; fractional base units are
//! floored.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::json;

use crate::oracle::{PriceFreshness, PriceOracle};
use crate::types::{
    assets, schemes, BatchOption, FacilitatorAdvert, FacilitatorInfo, PaymentRequirements,
    Provider,
};
use crate::{GatewayError, Result};

/// Convert a USD amount into the asset's base unit
///
/// Returns the floored base-unit amount as a decimal string, plus the
/// freshness of the price used (pegged assets are always fresh).
pub async fn usd_to_base_units(
    amount_usd: Decimal,
    asset: &str,
    oracle: &PriceOracle,
) -> Result<(String, PriceFreshness)> {
    let decimals = assets::decimals(asset)
        .ok_or_else(|| GatewayError::invalid_request(format!("Unknown asset '{}'", asset)))?;
    let factor = Decimal::from(10u64.pow(decimals));

    let (scaled, freshness) = match asset {
        assets::USDC => (amount_usd * factor, PriceFreshness::Fresh),
        _ => {
            let quote = oracle.usd_price(asset).await?;
            if quote.price <= Decimal::ZERO {
                return Err(GatewayError::oracle("Non-positive asset price"));
            }
            ((amount_usd / quote.price) * factor, quote.freshness)
        }
    };

    Ok((scaled.floor().normalize().to_string(), freshness))
}

/// Nonce of the form `<unix-ms>-<random>`; uniqueness is the facilitators'
/// concern, not the gateway's
pub fn generate_nonce() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Percentage saved by the batch offer versus paying per call
pub fn batch_savings(per_call: Decimal, calls: u32, batch_price: Decimal) -> Option<String> {
    let full_price = per_call * Decimal::from(calls);
    if full_price <= Decimal::ZERO {
        return None;
    }
    let saved = (Decimal::ONE - batch_price / full_price) * Decimal::from(100u32);
    Some(format!("{}%", saved.round_dp(1).normalize()))
}

/// Build the `accepts[0]` requirements for a challenge
pub async fn build_challenge_requirements(
    provider: &Provider,
    chain: &str,
    amount_usd: Decimal,
    asset: &str,
    pay_to: &str,
    resource: &str,
    oracle: &PriceOracle,
    facilitator_info: &FacilitatorInfo,
    fee_payer: Option<&str>,
) -> Result<(PaymentRequirements, PriceFreshness)> {
    if pay_to.is_empty() {
        return Err(GatewayError::config("Gateway wallet is not configured"));
    }
    let (max_amount_required, freshness) = usd_to_base_units(amount_usd, asset, oracle).await?;

    let advert = FacilitatorAdvert {
        primary: facilitator_info.primary.name.clone(),
        kind: facilitator_info.primary.kind,
        fallback: facilitator_info.fallback.as_ref().map(|f| f.name.clone()),
    };

    let mut extra = json!({
        "provider": provider.name,
        "providerId": provider.id,
        "nonce": generate_nonce(),
        "facilitator": advert,
    });
    if let Some(batch) = &provider.batch_cost {
        if let Some(savings) = batch_savings(provider.cost_per_call, batch.calls, batch.price) {
            extra["batchOption"] = serde_json::to_value(BatchOption {
                calls: batch.calls,
                price: batch.price,
                savings,
            })?;
        }
    }
    if let Some(fee_payer) = fee_payer {
        extra["feePayer"] = json!(fee_payer);
    }

    let mut requirements = PaymentRequirements::new(
        schemes::EXACT,
        chain,
        max_amount_required,
        asset,
        pay_to,
        resource,
        format!("RPC access via {}", provider.name),
    );
    requirements.mime_type = Some("application/json".to_string());
    requirements.max_timeout_seconds = 60;
    requirements.extra = Some(extra);
    Ok((requirements, freshness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{PriceOracle, PriceSource};
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::Arc;

    struct FixedSource(Decimal);

    #[async_trait]
    impl PriceSource for FixedSource {
        async fn usd_price(&self, _asset: &str) -> Result<Decimal> {
            Ok(self.0)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn oracle(price: &str) -> PriceOracle {
        PriceOracle::new(Arc::new(FixedSource(Decimal::from_str(price).unwrap())))
    }

    #[tokio::test]
    async fn test_usdc_conversion_is_micro_usdc() {
        let oracle = oracle("1.0");
        let (amount, _) = usd_to_base_units(
            Decimal::from_str("0.00015").unwrap(),
            "USDC",
            &oracle,
        )
        .await
        .unwrap();
        assert_eq!(amount, "150");
    }

    #[tokio::test]
    async fn test_sol_conversion_uses_oracle_price() {
        // 0.00015 USD at 150 USD/SOL is 0.000001 SOL = 1000 lamports.
        let oracle = oracle("150");
        let (amount, _) = usd_to_base_units(
            Decimal::from_str("0.00015").unwrap(),
            "SOL",
            &oracle,
        )
        .await
        .unwrap();
        assert_eq!(amount, "1000");
    }

    #[tokio::test]
    async fn test_eth_conversion_to_wei() {
        // 3 USD at 3000 USD/ETH is 0.001 ETH = 1e15 wei.
        let oracle = oracle("3000");
        let (amount, _) =
            usd_to_base_units(Decimal::from_str("3").unwrap(), "ETH", &oracle)
                .await
                .unwrap();
        assert_eq!(amount, "1000000000000000");
    }

    #[tokio::test]
    async fn test_fractional_base_units_are_floored() {
        // 0.0000015 USD is 1.5 micro-USDC; floor keeps 1.
        let oracle = oracle("1.0");
        let (amount, _) = usd_to_base_units(
            Decimal::from_str("0.0000015").unwrap(),
            "USDC",
            &oracle,
        )
        .await
        .unwrap();
        assert_eq!(amount, "1");
    }

    #[tokio::test]
    async fn test_conversion_round_trips_within_one_base_unit() {
        let oracle = oracle("1.0");
        let usd = Decimal::from_str("0.123456").unwrap();
        let (amount, _) = usd_to_base_units(usd, "USDC", &oracle).await.unwrap();
        let back = Decimal::from_str(&amount).unwrap() / Decimal::from(1_000_000u64);
        let diff = (usd - back).abs();
        assert!(diff < Decimal::from_str("0.000001").unwrap() * Decimal::from(2u32));
    }

    #[test]
    fn test_nonce_shape() {
        let nonce = generate_nonce();
        let (millis, suffix) = nonce.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 10);
        assert_ne!(generate_nonce(), nonce);
    }

    #[test]
    fn test_batch_savings_render() {
        // 1000 calls at 0.00015 is 0.15; batch at 0.08 saves ~46.7%.
        let savings = batch_savings(
            Decimal::from_str("0.00015").unwrap(),
            1000,
            Decimal::from_str("0.08").unwrap(),
        )
        .unwrap();
        assert_eq!(savings, "46.7%");
    }

    #[test]
    fn test_batch_savings_none_for_free_calls() {
        assert!(batch_savings(Decimal::ZERO, 1000, Decimal::ONE).is_none());
    }
}
