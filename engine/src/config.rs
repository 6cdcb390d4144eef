use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tc_engine_core::TxHash;

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub max_connections: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

/// Endpoint of the wallet bridge that owns the keys and answers
/// `eth_accounts` / `eth_sendTransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub url: String,
    #[serde(default)]
    pub account: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    pub engine: Address,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxConfig {
    pub confirmations: u64,
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_explorer_tx_url")]
    pub explorer_tx_url: String,
}

fn default_explorer_tx_url() -> String {
    "https://sepolia.etherscan.io/tx/".to_string()
}

impl TxConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn tx_url(&self, hash: &TxHash) -> String {
        format!("{}{}", self.explorer_tx_url, hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetToken {
    pub name: String,
    pub symbol: String,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
    pub contracts: ContractsConfig,
    pub tx: TxConfig,
    /// Share of collateral value that may be borrowed, in basis points.
    pub collateral_factor_bps: u32,
    #[serde(default)]
    pub faucet_tokens: Vec<FaucetToken>,
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                url: "https://rpc.sepolia.org".to_string(),
                timeout_ms: 10_000,
                max_connections: 8,
                poll_interval_ms: default_poll_interval_ms(),
            },
            wallet: WalletConfig {
                url: "http://127.0.0.1:1248".to_string(),
                account: None,
            },
            contracts: ContractsConfig {
                engine: address!("DD15Ec62C853E492a6E31b7EBa2e9A2ECFBc123F"),
                chain_id: SEPOLIA_CHAIN_ID,
            },
            tx: TxConfig {
                confirmations: 1,
                confirmation_timeout_ms: 180_000,
                explorer_tx_url: default_explorer_tx_url(),
            },
            collateral_factor_bps: 4_500,
            faucet_tokens: vec![
                FaucetToken {
                    name: "Wrapped ETH".to_string(),
                    symbol: "WETH".to_string(),
                    address: address!("61facfdcd0804ca6847e7d7a5a0c2e00307a84cd"),
                },
                FaucetToken {
                    name: "Wrapped BTC".to_string(),
                    symbol: "WBTC".to_string(),
                    address: address!("069F34476ba3f540f4979303904957294caAae47"),
                },
            ],
            metrics_port: None,
        }
    }
}
