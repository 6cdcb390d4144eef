use crate::flow::FlowError;
use crate::model::*;
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;

/// Raw chain access: ABI-encoded calls in, ABI-encoded results out.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn read_call(
        &self,
        to: Address,
        data: Bytes,
        from: Option<Address>,
    ) -> anyhow::Result<Bytes>;

    async fn write_call(&self, to: Address, data: Bytes, from: Address) -> anyhow::Result<TxHash>;

    async fn await_confirmation(&self, hash: TxHash, confirmations: u64)
        -> anyhow::Result<TxReceipt>;

    async fn token_balance(&self, owner: Address, token: Address) -> anyhow::Result<U256>;
}

// Wallet port: connection state only, keys stay with the provider
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn account(&self) -> anyhow::Result<Option<AccountContext>>;
}

/// Typed view queries. A failed read is `None`, never an error.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn vault_count(&self) -> Option<u64>;
    async fn vault_address(&self, vault_id: VaultId) -> Option<Address>;
    async fn vault_balance(&self, vault_id: VaultId) -> Option<U256>;
    async fn collateral_usd_value(&self, collateral: Address, amount: U256) -> Option<U256>;
    async fn deposited(&self, vault_id: VaultId, account: &AccountContext) -> Option<U256>;
    async fn borrowable(&self, vault_id: VaultId, account: &AccountContext) -> Option<U256>;
    async fn token_balance(&self, token: Address, account: &AccountContext) -> Option<U256>;
    async fn token_name(&self, token: Address) -> Option<String>;
    async fn token_symbol(&self, token: Address) -> Option<String>;
    async fn token_decimals(&self, token: Address) -> Option<u8>;
    async fn open_positions(&self, account: &AccountContext) -> Option<Vec<PositionId>>;
    async fn position(&self, position_id: PositionId, account: &AccountContext)
        -> Option<Position>;
}

/// State-changing calls. Each returns once the transaction is submitted;
/// waiting is a separate step through `await_confirmation`.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Lending engine address, the spender for collateral approvals.
    fn engine_address(&self) -> Address;

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
        account: &AccountContext,
    ) -> Result<TxHash, FlowError>;

    async fn deposit_collateral(
        &self,
        vault_id: VaultId,
        amount: U256,
        account: &AccountContext,
    ) -> Result<TxHash, FlowError>;

    async fn create_position(
        &self,
        vault_id: VaultId,
        amount_collateral: U256,
        amount_to_borrow: U256,
        account: &AccountContext,
    ) -> Result<TxHash, FlowError>;

    async fn cancel_position(
        &self,
        position_id: PositionId,
        account: &AccountContext,
    ) -> Result<TxHash, FlowError>;

    async fn faucet(&self, token: Address, account: &AccountContext) -> Result<TxHash, FlowError>;

    async fn await_confirmation(&self, hash: TxHash) -> anyhow::Result<TxReceipt>;
}
