//! Common constants for chains, assets, and schemes

/// Supported chain identifiers
pub mod chains {
    /// Solana mainnet
    pub const SOLANA: &str = "solana";
    /// Solana devnet
    pub const SOLANA_DEVNET: &str = "solana-devnet";
    /// Ethereum mainnet
    pub const ETHEREUM: &str = "ethereum";
    /// Base mainnet
    pub const BASE: &str = "base";

    /// Check if a chain is supported
    pub fn is_supported(chain: &str) -> bool {
        matches!(chain, SOLANA | SOLANA_DEVNET | ETHEREUM | BASE)
    }

    /// Chains whose RPC speaks the Solana JSON-RPC dialect
    pub fn is_solana_family(chain: &str) -> bool {
        matches!(chain, SOLANA | SOLANA_DEVNET)
    }

    /// Chains whose RPC speaks the Ethereum JSON-RPC dialect
    pub fn is_evm_family(chain: &str) -> bool {
        matches!(chain, ETHEREUM | BASE)
    }

    /// EVM chain id, where one exists
    pub fn evm_chain_id(chain: &str) -> Option<u64> {
        match chain {
            ETHEREUM => Some(1),
            BASE => Some(8453),
            _ => None,
        }
    }

    /// Get all supported chains
    pub fn all_supported() -> Vec<&'static str> {
        vec![SOLANA, SOLANA_DEVNET, ETHEREUM, BASE]
    }
}

/// Settlement assets and their on-chain identities
pub mod assets {
    /// USDC symbol, the default settlement asset on every chain
    pub const USDC: &str = "USDC";
    /// Native Solana token symbol
    pub const SOL: &str = "SOL";
    /// Native Ethereum token symbol
    pub const ETH: &str = "ETH";

    /// Get the USDC mint or contract address for a chain
    pub fn usdc_address(chain: &str) -> Option<&'static str> {
        match chain {
            super::chains::SOLANA => Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            super::chains::SOLANA_DEVNET => Some("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
            super::chains::ETHEREUM => Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            super::chains::BASE => Some("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            _ => None,
        }
    }

    /// Number of base-unit decimals for an asset symbol
    pub fn decimals(asset: &str) -> Option<u32> {
        match asset {
            USDC => Some(6),
            SOL => Some(9),
            ETH => Some(18),
            _ => None,
        }
    }
}

/// Common payment schemes
pub mod schemes {
    /// Exact payment scheme
    pub const EXACT: &str = "exact";
}

/// Build a block-explorer URL for a settled transaction
pub fn explorer_tx_url(chain: &str, tx_hash: &str) -> String {
    match chain {
        chains::SOLANA => format!("https://orb.helius.dev/tx/{}", tx_hash),
        chains::SOLANA_DEVNET => {
            format!("https://orb.helius.dev/tx/{}?cluster=devnet", tx_hash)
        }
        chains::ETHEREUM => format!("https://etherscan.io/tx/{}", tx_hash),
        chains::BASE => format!("https://basescan.org/tx/{}", tx_hash),
        _ => format!("https://blockscan.com/tx/{}", tx_hash),
    }
}

/// Read-only RPC methods the free passthrough endpoint accepts
pub mod rpc_methods {
    use super::chains;

    const SOLANA_READ: &[&str] = &[
        "getSlot",
        "getBlockHeight",
        "getLatestBlockhash",
        "getBalance",
        "getAccountInfo",
        "getTokenAccountBalance",
        "getRecentPerformanceSamples",
        "getEpochInfo",
        "getVersion",
        "getHealth",
    ];

    const EVM_READ: &[&str] = &[
        "eth_blockNumber",
        "eth_getBalance",
        "eth_getTransactionCount",
        "eth_gasPrice",
        "eth_call",
        "eth_chainId",
        "eth_getBlockByNumber",
        "eth_getTransactionReceipt",
        "eth_estimateGas",
        "net_version",
    ];

    /// Allowlisted read methods for a chain
    pub fn read_allowlist(chain: &str) -> &'static [&'static str] {
        if chains::is_solana_family(chain) {
            SOLANA_READ
        } else if chains::is_evm_family(chain) {
            EVM_READ
        } else {
            &[]
        }
    }

    /// Check whether a method is on the free-passthrough allowlist
    pub fn is_allowed(chain: &str, method: &str) -> bool {
        read_allowlist(chain).contains(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_families() {
        assert!(chains::is_solana_family(chains::SOLANA));
        assert!(!chains::is_solana_family(chains::BASE));
        assert!(chains::is_evm_family(chains::ETHEREUM));
        assert_eq!(chains::evm_chain_id(chains::BASE), Some(8453));
        assert_eq!(chains::evm_chain_id(chains::SOLANA), None);
    }

    #[test]
    fn test_usdc_addresses() {
        assert_eq!(
            assets::usdc_address("solana"),
            Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
        );
        assert_eq!(
            assets::usdc_address("base"),
            Some("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913")
        );
        assert_eq!(assets::usdc_address("unknown-chain"), None);
    }

    #[test]
    fn test_asset_decimals() {
        assert_eq!(assets::decimals("USDC"), Some(6));
        assert_eq!(assets::decimals("SOL"), Some(9));
        assert_eq!(assets::decimals("ETH"), Some(18));
        assert_eq!(assets::decimals("DOGE"), None);
    }

    #[test]
    fn test_explorer_urls() {
        assert_eq!(
            explorer_tx_url("solana", "abc123"),
            "https://orb.helius.dev/tx/abc123"
        );
        assert!(explorer_tx_url("ethereum", "0xdead").starts_with("https://etherscan.io/tx/"));
    }

    #[test]
    fn test_rpc_method_allowlist() {
        assert!(rpc_methods::is_allowed("solana", "getSlot"));
        assert!(rpc_methods::is_allowed("ethereum", "eth_blockNumber"));
        assert!(!rpc_methods::is_allowed("solana", "sendTransaction"));
        assert!(!rpc_methods::is_allowed("ethereum", "eth_sendRawTransaction"));
    }
}
