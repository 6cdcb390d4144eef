use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

pub type VaultId = u64;
pub type PositionId = u64;
pub type TxHash = B256;

/// Decimals assumed for tokens whose `decimals()` read fails, and for tcUSD.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Connected wallet as reported by the wallet provider.
///
/// Passed explicitly into every account-scoped read and every write so that
/// nothing below the screen layer queries the wallet on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    pub address: Address,
    pub chain_id: u64,
}

impl AccountContext {
    pub fn new(address: Address, chain_id: u64) -> Self {
        Self { address, chain_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: u8,
}

impl TokenInfo {
    pub fn label(&self) -> String {
        self.symbol
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| crate::math::shorten_address(&self.address))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub collateral: TokenInfo,
    pub total_deposited: Option<U256>,
    /// USD value (1e18) of one whole collateral token.
    pub unit_price_usd: Option<U256>,
}

impl Vault {
    pub fn total_value_usd(&self) -> Option<U256> {
        let total = self.total_deposited?;
        let price = self.unit_price_usd?;
        crate::math::usd_value(total, price, self.collateral.decimals)
    }
}

/// Per-account slice of a vault. Every field is independently optional
/// because each one is a separate view call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountVault {
    pub wallet_balance: Option<U256>,
    pub deposited: Option<U256>,
    pub can_borrow: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDetails {
    pub vault_id: VaultId,
    pub collateral: TokenInfo,
    pub unit_price_usd: Option<U256>,
    pub account: Option<AccountVault>,
}

impl VaultDetails {
    /// Borrowable tcUSD if the whole wallet balance were deposited.
    pub fn wallet_borrow_capacity(&self, collateral_factor_bps: u32) -> Option<U256> {
        let balance = self.account.as_ref()?.wallet_balance?;
        let price = self.unit_price_usd?;
        crate::math::borrow_capacity_scaled(
            balance,
            price,
            self.collateral.decimals,
            collateral_factor_bps,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: Address,
    pub vault_id: VaultId,
    pub amount_collateral: U256,
    pub amount_borrowed: U256,
    /// Collateralization proxy as returned by the engine, 1e18 == 1.0.
    pub health_factor: U256,
}

/// Dashboard row: a position joined with its vault's collateral token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionView {
    pub position: Position,
    pub collateral_symbol: Option<String>,
    pub collateral_decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Reverted,
}

impl TxStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TxStatus::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub status: TxStatus,
    pub block_number: u64,
}

/// One submitted transaction and, once known, how it settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub outcome: Option<TxStatus>,
}

impl TransactionRecord {
    pub fn pending(hash: TxHash) -> Self {
        Self {
            hash,
            outcome: None,
        }
    }

    pub fn settled(mut self, status: TxStatus) -> Self {
        self.outcome = Some(status);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }
}
