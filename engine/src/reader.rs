use crate::abi::{ILendingEngine, IERC20};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use futures::join;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tc_engine_core::{
    math, AccountContext, AccountVault, ChainClient, ChainReader, Metrics, Position,
    PositionId, PositionView, TokenInfo, Vault, VaultDetails, VaultId, DEFAULT_DECIMALS,
};
use tracing::{debug, warn};

/// `ChainReader` over the lending engine and ERC-20 view functions.
pub struct EngineReader<C: ChainClient> {
    chain: Arc<C>,
    engine: Address,
    metrics: Arc<Metrics>,
}

impl<C: ChainClient> Clone for EngineReader<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            engine: self.engine,
            metrics: self.metrics.clone(),
        }
    }
}

impl<C: ChainClient> EngineReader<C> {
    pub fn new(chain: Arc<C>, engine: Address, metrics: Arc<Metrics>) -> Self {
        Self {
            chain,
            engine,
            metrics,
        }
    }

    pub fn engine_address(&self) -> Address {
        self.engine
    }

    async fn call<T>(&self, to: Address, call: T, from: Option<Address>) -> Option<T::Return>
    where
        T: SolCall + Send,
    {
        self.metrics.reads_total.inc();
        let data = Bytes::from(call.abi_encode());
        let raw = match self.chain.read_call(to, data, from).await {
            Ok(raw) => raw,
            Err(err) => {
                self.metrics.read_failures.inc();
                warn!(target: "reader", method = T::SIGNATURE, %to, error = %err, "view call failed");
                return None;
            }
        };
        match T::abi_decode_returns(&raw, true) {
            Ok(ret) => Some(ret),
            Err(err) => {
                self.metrics.read_failures.inc();
                warn!(target: "reader", method = T::SIGNATURE, %to, error = %err, "undecodable return data");
                None
            }
        }
    }

    async fn engine_call<T>(&self, call: T, from: Option<Address>) -> Option<T::Return>
    where
        T: SolCall + Send,
    {
        self.call(self.engine, call, from).await
    }
}

fn to_id(value: U256) -> Option<u64> {
    u64::try_from(value).ok()
}

#[async_trait]
impl<C: ChainClient> ChainReader for EngineReader<C> {
    async fn vault_count(&self) -> Option<u64> {
        let ret = self
            .engine_call(ILendingEngine::getCurrentVaultIdCall {}, None)
            .await?;
        to_id(ret.currentVaultId)
    }

    async fn vault_address(&self, vault_id: VaultId) -> Option<Address> {
        let call = ILendingEngine::getVaultAddressCall {
            vaultId: U256::from(vault_id),
        };
        Some(self.engine_call(call, None).await?.collateral)
    }

    async fn vault_balance(&self, vault_id: VaultId) -> Option<U256> {
        let call = ILendingEngine::getVaultBalanceCall {
            vaultId: U256::from(vault_id),
        };
        Some(self.engine_call(call, None).await?.balance)
    }

    async fn collateral_usd_value(&self, collateral: Address, amount: U256) -> Option<U256> {
        let call = ILendingEngine::getUSDValueOfCollateralCall { collateral, amount };
        Some(self.engine_call(call, None).await?.usdValue)
    }

    async fn deposited(&self, vault_id: VaultId, account: &AccountContext) -> Option<U256> {
        let call = ILendingEngine::getCollateralDepositedCall {
            vaultId: U256::from(vault_id),
        };
        Some(self.engine_call(call, Some(account.address)).await?.deposited)
    }

    async fn borrowable(&self, vault_id: VaultId, account: &AccountContext) -> Option<U256> {
        let call = ILendingEngine::getAmountCanBorrowCall {
            vaultId: U256::from(vault_id),
        };
        Some(self.engine_call(call, Some(account.address)).await?.amount)
    }

    async fn token_balance(&self, token: Address, account: &AccountContext) -> Option<U256> {
        self.metrics.reads_total.inc();
        match self.chain.token_balance(account.address, token).await {
            Ok(balance) => Some(balance),
            Err(err) => {
                self.metrics.read_failures.inc();
                warn!(target: "reader", %token, owner = %account.address, error = %err, "balance read failed");
                None
            }
        }
    }

    async fn token_name(&self, token: Address) -> Option<String> {
        Some(self.call(token, IERC20::nameCall {}, None).await?.name)
    }

    async fn token_symbol(&self, token: Address) -> Option<String> {
        Some(self.call(token, IERC20::symbolCall {}, None).await?.symbol)
    }

    async fn token_decimals(&self, token: Address) -> Option<u8> {
        Some(self.call(token, IERC20::decimalsCall {}, None).await?.decimals)
    }

    async fn open_positions(&self, account: &AccountContext) -> Option<Vec<PositionId>> {
        let call = ILendingEngine::getAllPostionExistsCall {
            owner: account.address,
        };
        let ret = self.engine_call(call, Some(account.address)).await?;
        ret.positionIds.into_iter().map(to_id).collect()
    }

    async fn position(
        &self,
        position_id: PositionId,
        account: &AccountContext,
    ) -> Option<Position> {
        let call = ILendingEngine::getUniquePositionCall {
            positionId: U256::from(position_id),
        };
        let ret = self.engine_call(call, Some(account.address)).await?;
        Some(Position {
            id: position_id,
            owner: ret.owner,
            vault_id: to_id(ret.vaultId)?,
            amount_collateral: ret.amountCollateral,
            amount_borrowed: ret.amountToBorrow,
            health_factor: ret.healthFactor,
        })
    }
}

/// Name, symbol and decimals in one round. Decimals fall back to 18.
pub async fn load_token<R: ChainReader + ?Sized>(reader: &R, address: Address) -> TokenInfo {
    let (name, symbol, decimals) = join!(
        reader.token_name(address),
        reader.token_symbol(address),
        reader.token_decimals(address)
    );
    TokenInfo {
        address,
        name,
        symbol,
        decimals: decimals.unwrap_or(DEFAULT_DECIMALS),
    }
}

async fn unit_price<R: ChainReader + ?Sized>(reader: &R, token: &TokenInfo) -> Option<U256> {
    let one = math::ten_pow(token.decimals)?;
    reader.collateral_usd_value(token.address, one).await
}

async fn load_vault<R: ChainReader + ?Sized>(reader: &R, id: VaultId) -> Option<Vault> {
    let Some(collateral) = reader.vault_address(id).await else {
        debug!(target: "reader", vault_id = id, "vault skipped, collateral address unavailable");
        return None;
    };
    let (total_deposited, token) = join!(reader.vault_balance(id), load_token(reader, collateral));
    let unit_price_usd = unit_price(reader, &token).await;
    Some(Vault {
        id,
        collateral: token,
        total_deposited,
        unit_price_usd,
    })
}

/// Rows loaded at once by the table loaders. Each row is several view calls,
/// and the counts come straight from the engine.
pub const MAX_PARALLEL_LOADS: usize = 8;

/// Borrow page table: every vault with its collateral token and USD valuation.
/// `None` only when the vault count itself is unavailable.
pub async fn load_vaults<R: ChainReader + ?Sized>(reader: &R) -> Option<Vec<Vault>> {
    let count = reader.vault_count().await?;
    let vaults: Vec<Option<Vault>> = stream::iter(0..count)
        .map(|id| load_vault(reader, id))
        .buffered(MAX_PARALLEL_LOADS)
        .collect()
        .await;
    Some(vaults.into_iter().flatten().collect())
}

/// Vault page batch. Account fields are read against the collateral address
/// fetched in this same batch.
pub async fn load_vault_details<R: ChainReader + ?Sized>(
    reader: &R,
    vault_id: VaultId,
    account: Option<&AccountContext>,
) -> Option<VaultDetails> {
    let collateral = reader.vault_address(vault_id).await?;
    let token = load_token(reader, collateral).await;
    let unit_price_usd = unit_price(reader, &token).await;
    let account = match account {
        Some(acct) => {
            let (wallet_balance, deposited, can_borrow) = join!(
                reader.token_balance(collateral, acct),
                reader.deposited(vault_id, acct),
                reader.borrowable(vault_id, acct)
            );
            Some(AccountVault {
                wallet_balance,
                deposited,
                can_borrow,
            })
        }
        None => None,
    };
    Some(VaultDetails {
        vault_id,
        collateral: token,
        unit_price_usd,
        account,
    })
}

async fn load_position<R: ChainReader + ?Sized>(
    reader: &R,
    id: PositionId,
    account: &AccountContext,
) -> Option<PositionView> {
    let position = reader.position(id, account).await?;
    let (collateral_symbol, collateral_decimals) = match reader.vault_address(position.vault_id).await
    {
        Some(collateral) => {
            let (symbol, decimals) =
                join!(reader.token_symbol(collateral), reader.token_decimals(collateral));
            (symbol, decimals.unwrap_or(DEFAULT_DECIMALS))
        }
        None => (None, DEFAULT_DECIMALS),
    };
    Some(PositionView {
        position,
        collateral_symbol,
        collateral_decimals,
    })
}

/// Dashboard batch: open positions of `account` joined with their collateral symbol.
pub async fn load_positions<R: ChainReader + ?Sized>(
    reader: &R,
    account: &AccountContext,
) -> Option<Vec<PositionView>> {
    let ids = reader.open_positions(account).await?;
    let rows: Vec<Option<PositionView>> = stream::iter(ids)
        .map(|id| load_position(reader, id, account))
        .buffered(MAX_PARALLEL_LOADS)
        .collect()
        .await;
    Some(rows.into_iter().flatten().collect())
}
