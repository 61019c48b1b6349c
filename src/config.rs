//! Environment-driven gateway configuration
//!
//! Everything is read from environment variables with hardcoded defaults;
//! the binary loads `.env` first. Provider URLs in the built-in catalog can
//! be overridden per provider id (`PROVIDER_<ID>_URL`); overriding with an
//! empty value keeps the provider registered but pinned offline.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::types::{assets, chains, Provider};
use crate::{GatewayError, Result};

/// Default listen port
pub const DEFAULT_PORT: u16 = 8402;

/// Top-level gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen port (`PORT`)
    pub port: u16,
    /// Bind host (`HOST`)
    pub host: String,
    /// Receiving wallet used as `payTo` (`GATEWAY_WALLET`)
    pub pay_to: String,
    /// Absolute base URL clients see (`GATEWAY_PUBLIC_URL`)
    pub public_url: String,
    /// Settlement asset symbol for challenges (`GATEWAY_SETTLEMENT_ASSET`)
    pub settlement_asset: String,
    /// Probe interval (`HEALTH_CHECK_INTERVAL_SECS`)
    pub health_check_interval: Duration,
}

impl GatewayConfig {
    /// Load the configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let pay_to = std::env::var("GATEWAY_WALLET")
            .map_err(|_| GatewayError::config("GATEWAY_WALLET must be set"))?;
        if pay_to.is_empty() {
            return Err(GatewayError::config("GATEWAY_WALLET must not be empty"));
        }
        let public_url = std::env::var("GATEWAY_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));
        url::Url::parse(&public_url)
            .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_PUBLIC_URL: {}", e)))?;
        let settlement_asset =
            std::env::var("GATEWAY_SETTLEMENT_ASSET").unwrap_or_else(|_| assets::USDC.to_string());
        if assets::decimals(&settlement_asset).is_none() {
            return Err(GatewayError::config(format!(
                "Unknown settlement asset '{}'",
                settlement_asset
            )));
        }
        let health_check_interval = std::env::var("HEALTH_CHECK_INTERVAL_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Ok(Self {
            port,
            host,
            pay_to,
            public_url,
            settlement_asset,
            health_check_interval,
        })
    }

    /// Address the listener binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Absolute URL of the paid RPC endpoint
    pub fn rpc_resource(&self) -> String {
        format!("{}/rpc", self.public_url.trim_end_matches('/'))
    }
}

/// URL for a catalog provider, honoring the per-provider env override
fn provider_url(id: &str, default_url: &str) -> String {
    let var = format!("PROVIDER_{}_URL", id.replace('-', "_").to_uppercase());
    std::env::var(var).unwrap_or_else(|_| default_url.to_string())
}

fn usd(raw: &str) -> Decimal {
    raw.parse().expect("catalog price literal")
}

/// Built-in provider catalog
///
/// URLs come from the public endpoints of each vendor; every entry can be
/// re-pointed (or emptied, pinning it offline) through `PROVIDER_<ID>_URL`.
pub fn default_providers() -> Vec<Provider> {
    vec![
        Provider::new(
            "helius",
            "Helius",
            vec![chains::SOLANA.to_string()],
            provider_url("helius", "https://mainnet.helius-rpc.com"),
            usd("0.00015"),
        )
        .with_priority(10)
        .with_max_latency_ms(2_000)
        .with_batch_cost(1000, usd("0.08")),
        Provider::new(
            "triton",
            "Triton One",
            vec![chains::SOLANA.to_string()],
            provider_url("triton", "https://free.rpcpool.com"),
            usd("0.0002"),
        )
        .with_priority(8)
        .with_max_latency_ms(2_500),
        Provider::new(
            "quicknode",
            "QuickNode",
            vec![
                chains::SOLANA.to_string(),
                chains::ETHEREUM.to_string(),
                chains::BASE.to_string(),
            ],
            provider_url("quicknode", "https://api.quicknode.com"),
            usd("0.00025"),
        )
        .with_priority(6)
        .with_max_latency_ms(3_000)
        .with_batch_cost(1000, usd("0.15")),
        Provider::new(
            "solana-public",
            "Solana Public RPC",
            vec![chains::SOLANA.to_string()],
            provider_url("solana-public", "https://api.mainnet-beta.solana.com"),
            usd("0.00005"),
        )
        .with_priority(1)
        .with_max_latency_ms(4_000),
        Provider::new(
            "alchemy",
            "Alchemy",
            vec![chains::ETHEREUM.to_string(), chains::BASE.to_string()],
            provider_url("alchemy", "https://eth-mainnet.g.alchemy.com/v2/demo"),
            usd("0.0002"),
        )
        .with_priority(9)
        .with_max_latency_ms(2_000)
        .with_batch_cost(1000, usd("0.12")),
        Provider::new(
            "infura",
            "Infura",
            vec![chains::ETHEREUM.to_string()],
            provider_url("infura", "https://mainnet.infura.io/v3/demo"),
            usd("0.00025"),
        )
        .with_priority(7)
        .with_max_latency_ms(2_500),
        Provider::new(
            "base-public",
            "Base Public RPC",
            vec![chains::BASE.to_string()],
            provider_url("base-public", "https://mainnet.base.org"),
            usd("0.0001"),
        )
        .with_priority(2)
        .with_max_latency_ms(3_000),
    ]
}
