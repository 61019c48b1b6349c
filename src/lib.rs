//! # x402 RPC Gateway
//!
//! A **pay-per-call blockchain RPC gateway** built on the x402 micropayment
//! protocol. Clients POST JSON-RPC requests; the gateway picks the best
//! upstream provider, challenges the caller with HTTP 402, verifies and
//! settles the payment through one of several facilitator backends, then
//! forwards the call and attaches an on-chain receipt to the response.
//!
//! ## Features
//!
//! - **Provider registry with live health scoring**: latency EMA,
//!   consecutive-failure decay, periodic JSON-RPC probes
//! - **Intelligent routing**: lowest-cost, lowest-latency,
//!   highest-priority, and round-robin strategies with caller preferences
//! - **x402 middleware**: 402 challenges, verify→settle, settlement receipts
//! - **Pluggable facilitators**: an in-process signer plus three remote
//!   HTTP backends behind one trait, with primary/fallback orchestration
//! - **Pre-paid batches**: discounted call bundles with atomic debits and
//!   background expiry
//! - **Degraded-mode pricing**: cached price oracle with stale and static
//!   fallback tiers
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use x402_rpc_gateway::config::{default_providers, GatewayConfig};
//! use x402_rpc_gateway::facilitator::FacilitatorManager;
//! use x402_rpc_gateway::gateway::{build_router, AppState};
//! use x402_rpc_gateway::ledger::BatchLedger;
//! use x402_rpc_gateway::middleware::X402Middleware;
//! use x402_rpc_gateway::oracle::PriceOracle;
//! use x402_rpc_gateway::registry::ProviderRegistry;
//! use x402_rpc_gateway::router::Router;
//!
//! # async fn example() -> x402_rpc_gateway::Result<()> {
//! let config = Arc::new(GatewayConfig::from_env()?);
//! let registry = Arc::new(ProviderRegistry::new());
//! for provider in default_providers() {
//!     registry.register(provider)?;
//! }
//! ProviderRegistry::start_health_checks(&registry, config.health_check_interval);
//!
//! let router = Arc::new(Router::new(Arc::clone(&registry)));
//! let manager = Arc::new(FacilitatorManager::from_env()?);
//! let ledger = Arc::new(BatchLedger::new());
//! BatchLedger::start_sweeper(&ledger);
//! let oracle = Arc::new(PriceOracle::coingecko());
//!
//! let middleware = Arc::new(X402Middleware::new(
//!     Arc::clone(&router),
//!     Arc::clone(&manager),
//!     Arc::clone(&ledger),
//!     Arc::clone(&oracle),
//!     config.pay_to.clone(),
//!     config.settlement_asset.clone(),
//! ));
//!
//! let state = AppState {
//!     registry,
//!     router,
//!     manager,
//!     ledger,
//!     middleware,
//!     config: Arc::clone(&config),
//!     http: reqwest::Client::new(),
//! };
//! let app = build_router(state);
//! let server = x402_rpc_gateway::server::ServerConfig::new(config.bind_addr());
//! x402_rpc_gateway::server::serve(app, server).await
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - **`types`**: Core data structures and wire types
//! - **`registry`**: Provider registry and background health prober
//! - **`router`**: Strategy-based provider selection
//! - **`ledger`**: Pre-paid batch bundles
//! - **`oracle`**: Cached USD price oracle
//! - **`facilitator`**: Payment verification and settlement adapters
//! - **`middleware`**: The x402 payment pipeline
//! - **`gateway`**: HTTP endpoints and upstream forwarding
//! - **`crypto`**: EIP-712, signature, and vendor-auth utilities
//! - **`config`**: Environment-driven configuration
//! - **`error`**: Comprehensive error handling

pub mod config;
pub mod crypto;
pub mod error;
pub mod facilitator;
pub mod gateway;
pub mod ledger;
pub mod middleware;
pub mod oracle;
pub mod registry;
pub mod router;
pub mod server;
pub mod types;

// Re-exports for convenience
pub use error::{GatewayError, Result};
pub use facilitator::FacilitatorManager;
pub use ledger::BatchLedger;
pub use middleware::X402Middleware;
pub use oracle::PriceOracle;
pub use registry::ProviderRegistry;
pub use router::Router;

/// Current version of the gateway
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// x402 protocol version
pub const X402_VERSION: u32 = 1;
