//! x402 RPC Gateway Server
//!
//! Pay-per-call JSON-RPC gateway: providers are scored by live health
//! probes, calls are paid through x402 micropayments, and settlements run
//! through a primary/fallback pair of facilitators.

use std::env;
use std::sync::Arc;

use x402_rpc_gateway::config::{default_providers, GatewayConfig};
use x402_rpc_gateway::facilitator::FacilitatorManager;
use x402_rpc_gateway::gateway::{build_router, AppState};
use x402_rpc_gateway::ledger::BatchLedger;
use x402_rpc_gateway::middleware::X402Middleware;
use x402_rpc_gateway::oracle::PriceOracle;
use x402_rpc_gateway::registry::ProviderRegistry;
use x402_rpc_gateway::router::Router;
use x402_rpc_gateway::server::{self, ServerConfig};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Arc::new(GatewayConfig::from_env()?);

    let registry = Arc::new(ProviderRegistry::new());
    for provider in default_providers() {
        registry.register(provider)?;
    }
    ProviderRegistry::start_health_checks(&registry, config.health_check_interval);

    let router = Arc::new(Router::new(Arc::clone(&registry)));
    let manager = Arc::new(FacilitatorManager::from_env()?);
    let ledger = Arc::new(BatchLedger::new());
    BatchLedger::start_sweeper(&ledger);
    let oracle = Arc::new(PriceOracle::coingecko());

    let mut middleware = X402Middleware::new(
        Arc::clone(&router),
        Arc::clone(&manager),
        Arc::clone(&ledger),
        Arc::clone(&oracle),
        config.pay_to.clone(),
        config.settlement_asset.clone(),
    );
    if let Ok(fee_payer) = env::var("REMOTE_C_FEE_PAYER") {
        if !fee_payer.is_empty() {
            middleware = middleware.with_fee_payer_hint(fee_payer);
        }
    }

    let state = AppState {
        registry: Arc::clone(&registry),
        router,
        manager: Arc::clone(&manager),
        ledger: Arc::clone(&ledger),
        middleware: Arc::new(middleware),
        config: Arc::clone(&config),
        http: reqwest::Client::new(),
    };
    let app = build_router(state);

    let info = manager.info();
    println!("💸 x402 RPC Gateway running on http://{}", config.bind_addr());
    println!("📋 Available endpoints:");
    println!("   POST /rpc - Paid RPC call (x402)");
    println!("   POST /chain-rpc-proxy - Free passthrough for read methods");
    println!("   GET /health - Service and provider stats");
    println!("   GET /providers - Provider registry");
    println!("   GET /facilitator - Facilitator configuration");
    println!("   GET /rpc-methods?chain=... - Supported methods");
    println!("   GET /batch-pricing?chain=... - Pre-paid bundle offers");
    println!(
        "🤝 Facilitator: {} (fallback: {})",
        info.primary.name,
        info.fallback
            .as_ref()
            .map(|f| f.name.as_str())
            .unwrap_or("none")
    );
    println!("💰 Receiving wallet: {}", config.pay_to);

    let result = server::serve(app, ServerConfig::new(config.bind_addr())).await;

    registry.stop_health_checks();
    ledger.stop_sweeper();
    result?;
    Ok(())
}
