use crate::abi::IERC20;
use crate::rpc_pool::RpcPool;
use alloy_primitives::{hex, Address, Bytes, U256};
use alloy_sol_types::SolCall;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tc_engine_core::{
    AccountContext, ChainClient, TxHash, TxReceipt, TxStatus, WalletProvider,
};
use tracing::{debug, info, warn};

fn call_object(to: Address, data: &Bytes, from: Option<Address>) -> Value {
    let mut obj = json!({ "to": to, "data": data });
    if let Some(from) = from {
        obj["from"] = json!(from);
    }
    obj
}

pub(crate) fn parse_quantity(value: Option<&Value>) -> Result<u64> {
    let s = value
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("quantity is not a hex string"))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("parse quantity '{}'", s))
}

pub(crate) fn parse_bytes(value: &Value) -> Result<Bytes> {
    let s = value
        .as_str()
        .ok_or_else(|| anyhow!("call result is not a hex string"))?;
    let raw = hex::decode(s).with_context(|| format!("decode call result '{}'", s))?;
    Ok(Bytes::from(raw))
}

pub(crate) fn parse_hash(value: &Value) -> Result<TxHash> {
    let s = value
        .as_str()
        .ok_or_else(|| anyhow!("transaction hash is not a string"))?;
    s.parse::<TxHash>()
        .with_context(|| format!("parse transaction hash '{}'", s))
}

/// `None` while the transaction is unknown or not yet in a block.
pub(crate) fn parse_receipt(hash: TxHash, value: &Value) -> Result<Option<TxReceipt>> {
    if value.is_null() {
        return Ok(None);
    }
    let block = value.get("blockNumber").filter(|v| !v.is_null());
    if block.is_none() {
        return Ok(None);
    }
    let block_number = parse_quantity(block).context("receipt blockNumber")?;
    let status = match value.get("status").and_then(|v| v.as_str()) {
        Some("0x1") => TxStatus::Success,
        _ => TxStatus::Reverted,
    };
    Ok(Some(TxReceipt {
        hash,
        status,
        block_number,
    }))
}

/// `ChainClient` over two JSON-RPC endpoints: a node for reads and receipts,
/// and the wallet bridge for signing.
#[derive(Clone)]
pub struct JsonRpcChain {
    reads: Arc<RpcPool>,
    wallet: Arc<RpcPool>,
    poll_interval: Duration,
}

impl JsonRpcChain {
    pub fn new(reads: Arc<RpcPool>, wallet: Arc<RpcPool>, poll_interval: Duration) -> Self {
        Self {
            reads,
            wallet,
            poll_interval,
        }
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let v = self.reads.request("eth_chainId", json!([])).await?;
        parse_quantity(Some(&v))
    }

    pub async fn block_number(&self) -> Result<u64> {
        let v = self.reads.request("eth_blockNumber", json!([])).await?;
        parse_quantity(Some(&v))
    }

    /// One poll: `Some` once the receipt is deep enough.
    async fn poll_receipt(&self, hash: TxHash, confirmations: u64) -> Result<Option<TxReceipt>> {
        let v = self
            .reads
            .request("eth_getTransactionReceipt", json!([hash]))
            .await?;
        let Some(receipt) = parse_receipt(hash, &v)? else {
            return Ok(None);
        };
        if confirmations <= 1 {
            return Ok(Some(receipt));
        }
        let head = self.block_number().await?;
        if head + 1 >= receipt.block_number + confirmations {
            return Ok(Some(receipt));
        }
        debug!(target: "rpc", %hash, head, mined = receipt.block_number, "waiting for more confirmations");
        Ok(None)
    }
}

#[async_trait]
impl ChainClient for JsonRpcChain {
    async fn read_call(&self, to: Address, data: Bytes, from: Option<Address>) -> Result<Bytes> {
        let params = json!([call_object(to, &data, from), "latest"]);
        let v = self.reads.request("eth_call", params).await?;
        parse_bytes(&v)
    }

    async fn write_call(&self, to: Address, data: Bytes, from: Address) -> Result<TxHash> {
        let tx = call_object(to, &data, Some(from));

        // dry run first: a revert here never reaches the wallet prompt
        if let Err(err) = self.reads.request("eth_call", json!([tx.clone(), "latest"])).await {
            if err.is_revert() {
                return Err(anyhow!("simulation reverted: {}", err));
            }
            return Err(anyhow::Error::from(err).context("simulate transaction"));
        }

        let v = match self.wallet.request("eth_sendTransaction", json!([tx])).await {
            Ok(v) => v,
            Err(err) if err.is_user_rejection() => {
                return Err(anyhow!("user rejected the request"));
            }
            Err(err) => return Err(anyhow::Error::from(err).context("eth_sendTransaction")),
        };
        let hash = parse_hash(&v)?;
        info!(target: "rpc", %hash, %to, %from, "transaction submitted");
        Ok(hash)
    }

    /// Polls until the receipt has `confirmations` blocks. Failed polls are
    /// retried; the caller bounds the wait.
    async fn await_confirmation(&self, hash: TxHash, confirmations: u64) -> Result<TxReceipt> {
        loop {
            match self.poll_receipt(hash, confirmations).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(err) => {
                    warn!(target: "rpc", %hash, error = %format!("{:#}", err), "receipt poll failed, retrying");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn token_balance(&self, owner: Address, token: Address) -> Result<U256> {
        let data = Bytes::from(IERC20::balanceOfCall { owner }.abi_encode());
        let raw = self.read_call(token, data, None).await?;
        let ret = IERC20::balanceOfCall::abi_decode_returns(&raw, true)
            .context("decode balanceOf")?;
        Ok(ret.balance)
    }
}

#[derive(Clone)]
pub struct JsonRpcWallet {
    wallet: Arc<RpcPool>,
    pinned: Option<Address>,
}

impl JsonRpcWallet {
    /// `pinned` selects one of the wallet's accounts instead of the first.
    pub fn new(wallet: Arc<RpcPool>, pinned: Option<Address>) -> Self {
        Self { wallet, pinned }
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn account(&self) -> Result<Option<AccountContext>> {
        let accounts = self
            .wallet
            .request("eth_accounts", json!([]))
            .await
            .context("eth_accounts")?;
        let accounts: Vec<Address> =
            serde_json::from_value(accounts).context("parse eth_accounts")?;
        let address = match self.pinned {
            Some(pinned) if accounts.contains(&pinned) => pinned,
            Some(pinned) => {
                return Err(anyhow!("account {} is not exposed by the wallet", pinned));
            }
            None => match accounts.first() {
                Some(first) => *first,
                None => return Ok(None),
            },
        };
        let chain = self
            .wallet
            .request("eth_chainId", json!([]))
            .await
            .context("eth_chainId")?;
        let chain_id = parse_quantity(Some(&chain))?;
        Ok(Some(AccountContext::new(address, chain_id)))
    }
}
