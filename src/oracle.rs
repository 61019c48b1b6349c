//! Cached USD price oracle
//!
//! Challenge amounts for native assets (SOL, ETH) need a USD price. The
//! oracle wraps a pluggable [`PriceSource`] with a three-tier cache: a
//! fresh value (fetched within 30 s) is served directly, a stale value is
//! tolerated for up to 5 minutes when the source is down, and beyond that a
//! documented static constant takes over. The gateway therefore keeps
//! pricing (degraded) even with no network path to the source.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::types::assets;
use crate::{GatewayError, Result};

/// Age below which a cached price is served without refetching
pub const FRESH_WINDOW: Duration = Duration::from_secs(30);

/// Age up to which a cached price is still served when the source fails
pub const STALE_WINDOW: Duration = Duration::from_secs(300);

/// Static SOL/USD fallback used when no price can be fetched at all
pub const SOL_USD_FALLBACK: &str = "150.0";

/// Static ETH/USD fallback used when no price can be fetched at all
pub const ETH_USD_FALLBACK: &str = "3000.0";

/// How a quote was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceFreshness {
    /// Fetched (or cached) within the fresh window
    Fresh,
    /// Served from a cache older than the fresh window
    Stale,
    /// Hardcoded fallback constant
    Static,
}

/// A USD price together with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Decimal,
    pub source: String,
    pub freshness: PriceFreshness,
}

/// A remote source of USD prices
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the current USD price of an asset symbol
    async fn usd_price(&self, asset: &str) -> Result<Decimal>;

    /// Source name recorded on quotes
    fn name(&self) -> &str;
}

/// Public price API source (CoinGecko simple-price shape)
pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoSource {
    /// Source against the public API
    pub fn new() -> Self {
        Self::with_base_url("https://api.coingecko.com")
    }

    /// Source against a custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn coin_id(asset: &str) -> Result<&'static str> {
        match asset {
            assets::SOL => Ok("solana"),
            assets::ETH => Ok("ethereum"),
            other => Err(GatewayError::oracle(format!(
                "No price feed for asset '{}'",
                other
            ))),
        }
    }
}

impl Default for CoinGeckoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn usd_price(&self, asset: &str) -> Result<Decimal> {
        let coin = Self::coin_id(asset)?;
        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies=usd",
            self.base_url, coin
        );
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::oracle(format!(
                "Price fetch failed with status: {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response.json().await?;
        let price = body
            .get(coin)
            .and_then(|c| c.get("usd"))
            .and_then(|p| p.as_f64())
            .ok_or_else(|| GatewayError::oracle("Malformed price response"))?;
        Decimal::from_f64_retain(price)
            .ok_or_else(|| GatewayError::oracle("Price out of range"))
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price: Decimal,
    fetched_at: Instant,
}

/// Three-tier cached oracle over a [`PriceSource`]
pub struct PriceOracle {
    source: Arc<dyn PriceSource>,
    cache: RwLock<HashMap<String, CachedPrice>>,
}

impl PriceOracle {
    /// Wrap a price source
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Oracle over the public CoinGecko API
    pub fn coingecko() -> Self {
        Self::new(Arc::new(CoinGeckoSource::new()))
    }

    fn static_fallback(asset: &str) -> Option<Decimal> {
        let raw = match asset {
            assets::SOL => SOL_USD_FALLBACK,
            assets::ETH => ETH_USD_FALLBACK,
            _ => return None,
        };
        Decimal::from_str(raw).ok()
    }

    /// USD price of an asset, with provenance
    pub async fn usd_price(&self, asset: &str) -> Result<PriceQuote> {
        // Stablecoins are pegged; no fetch needed.
        if asset == assets::USDC {
            return Ok(PriceQuote {
                price: Decimal::ONE,
                source: "pegged".to_string(),
                freshness: PriceFreshness::Fresh,
            });
        }

        let cached = {
            let cache = self.cache.read().await;
            cache.get(asset).copied()
        };
        if let Some(entry) = cached {
            if entry.fetched_at.elapsed() <= FRESH_WINDOW {
                return Ok(PriceQuote {
                    price: entry.price,
                    source: self.source.name().to_string(),
                    freshness: PriceFreshness::Fresh,
                });
            }
        }

        match self.source.usd_price(asset).await {
            Ok(price) => {
                let mut cache = self.cache.write().await;
                cache.insert(
                    asset.to_string(),
                    CachedPrice {
                        price,
                        fetched_at: Instant::now(),
                    },
                );
                Ok(PriceQuote {
                    price,
                    source: self.source.name().to_string(),
                    freshness: PriceFreshness::Fresh,
                })
            }
            Err(err) => {
                tracing::warn!(asset, error = %err, "price source failed");
                if let Some(entry) = cached {
                    if entry.fetched_at.elapsed() <= STALE_WINDOW {
                        return Ok(PriceQuote {
                            price: entry.price,
                            source: self.source.name().to_string(),
                            freshness: PriceFreshness::Stale,
                        });
                    }
                }
                let price = Self::static_fallback(asset)
                    .ok_or_else(|| GatewayError::oracle(format!("No fallback price for '{}'", asset)))?;
                Ok(PriceQuote {
                    price,
                    source: "static".to_string(),
                    freshness: PriceFreshness::Static,
                })
            }
        }
    }
}
