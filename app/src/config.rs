use std::{env, io, path::Path};

use alloy_primitives::Address;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tc_engine::config::EngineConfig;
use tokio::fs;
use tracing::info;

pub const ENV_RPC_URL: &str = "TC_RPC_URL";
pub const ENV_WALLET_URL: &str = "TC_WALLET_URL";
pub const ENV_ENGINE_ADDRESS: &str = "TC_ENGINE_ADDRESS";
pub const ENV_CHAIN_ID: &str = "TC_CHAIN_ID";

/// Reads the JSON config at `config_path` on top of the built-in Sepolia
/// defaults, then applies `TC_*` environment overrides. A missing file is
/// not an error.
pub async fn load_config(config_path: &Path) -> Result<EngineConfig> {
    let mut cfg = match fs::read(config_path).await {
        Ok(raw) => {
            let disk_cfg: Value = serde_json::from_slice(&raw)
                .with_context(|| format!("parse config json: {}", config_path.display()))?;
            merge_with_defaults(disk_cfg)?
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(target: "app", path = %config_path.display(), "config file not found, using defaults");
            EngineConfig::default()
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("read config file: {}", config_path.display()));
        }
    };
    apply_env_overrides(&mut cfg, |key| env::var(key).ok())?;
    Ok(cfg)
}

fn merge_with_defaults(disk_cfg: Value) -> Result<EngineConfig> {
    if !disk_cfg.is_object() {
        return Err(anyhow!("config root must be a JSON object"));
    }
    let mut merged =
        serde_json::to_value(EngineConfig::default()).context("serialize default config")?;
    merge(&mut merged, disk_cfg);
    serde_json::from_value(merged).context("invalid config")
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn apply_env_overrides(
    cfg: &mut EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(url) = lookup(ENV_RPC_URL) {
        cfg.rpc.url = url;
    }
    if let Some(url) = lookup(ENV_WALLET_URL) {
        cfg.wallet.url = url;
    }
    if let Some(addr) = lookup(ENV_ENGINE_ADDRESS) {
        cfg.contracts.engine = addr
            .trim()
            .parse::<Address>()
            .with_context(|| format!("{} is not an address: {}", ENV_ENGINE_ADDRESS, addr))?;
    }
    if let Some(id) = lookup(ENV_CHAIN_ID) {
        cfg.contracts.chain_id = id
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} is not a chain id: {}", ENV_CHAIN_ID, id))?;
    }
    Ok(())
}
