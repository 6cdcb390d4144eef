use crate::config::FaucetToken;
use crate::reader::{load_positions, load_vault_details, load_vaults};
use crate::sequencer::{DepositFlow, FlowContext, SubmitFlow, WriteAction};
use crate::view::{ScreenGuard, SharedView, ViewState};
use alloy_primitives::{Address, U256};
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use tc_engine_core::{
    math, AccountContext, ChainReader, FlowError, PositionId, PositionView, TransactionRecord,
    TxReceipt, Vault, VaultDetails, VaultId, DEFAULT_DECIMALS,
};
use tracing::{debug, info};

/// Copies a finished flow's outcome into the view and clears `busy`.
fn settle<T: Clone>(
    view: &SharedView<T>,
    last_tx: Option<TransactionRecord>,
    res: &Result<TxReceipt, FlowError>,
) {
    view.update(|s| {
        s.busy = false;
        if last_tx.is_some() {
            s.last_tx = last_tx;
        }
        s.last_error = res.as_ref().err().cloned();
    });
}

/// Precheck failures never reach the chain: record the error, keep the rest.
fn reject<T: Clone>(view: &SharedView<T>, err: FlowError) -> Result<TxReceipt, FlowError> {
    view.update(|s| s.last_error = Some(err.clone()));
    Err(err)
}

/// Borrow page: the table of all vaults.
pub struct VaultListScreen {
    reader: Arc<dyn ChainReader>,
    guard: ScreenGuard,
    view: SharedView<Vec<Vault>>,
}

impl VaultListScreen {
    pub async fn mount(reader: Arc<dyn ChainReader>) -> Self {
        let guard = ScreenGuard::new();
        let view = SharedView::new(guard.token());
        let screen = Self {
            reader,
            guard,
            view,
        };
        screen.refresh().await;
        screen
    }

    pub async fn refresh(&self) {
        self.view.update(|s| s.loading = true);
        let vaults = load_vaults(&*self.reader).await;
        debug!(target: "screen", screen = "vaults", loaded = vaults.as_ref().map(|v| v.len()), "refreshed");
        self.view.update(|s| {
            s.loading = false;
            s.data = vaults;
        });
    }

    pub fn state(&self) -> ViewState<Vec<Vault>> {
        self.view.snapshot()
    }

    pub fn unmount(&self) {
        self.guard.unmount();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VaultStep {
    #[default]
    Deposit,
    CreatePosition,
    Done,
}

/// Vault page: balances for one vault plus the deposit and create-position steps.
pub struct VaultScreen {
    reader: Arc<dyn ChainReader>,
    collateral_factor_bps: u32,
    guard: ScreenGuard,
    view: SharedView<VaultDetails>,
    vault_id: RwLock<VaultId>,
    account: RwLock<Option<AccountContext>>,
    step: RwLock<VaultStep>,
    deposit: DepositFlow,
    borrow: SubmitFlow,
}

impl VaultScreen {
    pub async fn mount(
        reader: Arc<dyn ChainReader>,
        flows: FlowContext,
        collateral_factor_bps: u32,
        vault_id: VaultId,
        account: Option<AccountContext>,
    ) -> Self {
        let guard = ScreenGuard::new();
        let view = SharedView::new(guard.token());
        let screen = Self {
            reader,
            collateral_factor_bps,
            guard,
            view,
            vault_id: RwLock::new(vault_id),
            account: RwLock::new(account),
            step: RwLock::new(VaultStep::Deposit),
            deposit: DepositFlow::new(flows.clone()),
            borrow: SubmitFlow::new(flows),
        };
        screen.refresh().await;
        screen
    }

    pub async fn refresh(&self) {
        let vault_id = *self.vault_id.read();
        let account = *self.account.read();
        self.view.update(|s| s.loading = true);
        let details = load_vault_details(&*self.reader, vault_id, account.as_ref()).await;
        // a route or account change while loading owns the view now
        if *self.vault_id.read() != vault_id || *self.account.read() != account {
            debug!(target: "screen", screen = "vault", vault_id, "stale refresh dropped");
            return;
        }
        debug!(target: "screen", screen = "vault", vault_id, found = details.is_some(), "refreshed");
        self.view.update(|s| {
            s.loading = false;
            s.data = details;
        });
    }

    pub async fn set_account(&self, account: Option<AccountContext>) {
        if *self.account.read() == account {
            return;
        }
        *self.account.write() = account;
        self.refresh().await;
    }

    /// Route change: a different vault starts over at the deposit step.
    pub async fn set_vault(&self, vault_id: VaultId) {
        if *self.vault_id.read() == vault_id {
            return;
        }
        *self.vault_id.write() = vault_id;
        *self.step.write() = VaultStep::Deposit;
        self.deposit.reset();
        self.refresh().await;
    }

    pub fn state(&self) -> ViewState<VaultDetails> {
        let mut state = self.view.snapshot();
        state.busy = self.deposit.is_busy() || self.borrow.is_busy();
        state
    }

    pub fn step(&self) -> VaultStep {
        *self.step.read()
    }

    /// "Had deposited?": go straight to creating a position.
    pub fn skip_to_borrow(&self) {
        let mut step = self.step.write();
        if *step == VaultStep::Deposit {
            *step = VaultStep::CreatePosition;
        }
    }

    pub fn back(&self) {
        let mut step = self.step.write();
        if *step == VaultStep::CreatePosition {
            *step = VaultStep::Deposit;
        }
    }

    /// tcUSD borrowable against the full wallet balance.
    pub fn borrow_capacity(&self) -> Option<U256> {
        self.view
            .data()?
            .wallet_borrow_capacity(self.collateral_factor_bps)
    }

    /// Borrowable preview for depositing `input` of the wallet balance.
    pub fn deposit_preview(&self, input: U256) -> Option<U256> {
        let details = self.view.data()?;
        let balance = details.account.as_ref()?.wallet_balance?;
        let capacity = details.wallet_borrow_capacity(self.collateral_factor_bps)?;
        Some(math::preview_borrowable(input, balance, capacity))
    }

    /// Borrow amount for a slider percentage of what the engine allows.
    pub fn borrow_for_percent(&self, percent: U256) -> Option<U256> {
        let max = self.view.data()?.account?.can_borrow?;
        Some(math::scaled_borrow_amount(percent, max))
    }

    pub async fn deposit(&self, amount: U256) -> Result<TxReceipt, FlowError> {
        let Some(account) = *self.account.read() else {
            return reject(&self.view, FlowError::NotConnected);
        };
        let Some(details) = self.view.data() else {
            return reject(
                &self.view,
                FlowError::InvalidAmount("vault not loaded".into()),
            );
        };
        let Some(balance) = details.account.as_ref().and_then(|a| a.wallet_balance) else {
            return reject(
                &self.view,
                FlowError::InvalidAmount("wallet balance unavailable".into()),
            );
        };

        self.view.update(|s| s.busy = true);
        let res = self
            .deposit
            .run(
                details.vault_id,
                details.collateral.address,
                amount,
                balance,
                &account,
                self.view.token(),
            )
            .await;
        settle(&self.view, self.deposit.last_tx(), &res);
        if res.is_ok() {
            info!(target: "screen", vault_id = details.vault_id, %amount, "deposit confirmed");
            *self.step.write() = VaultStep::CreatePosition;
            self.refresh().await;
        }
        res
    }

    pub async fn borrow(
        &self,
        amount_collateral: U256,
        amount_to_borrow: U256,
    ) -> Result<TxReceipt, FlowError> {
        let Some(account) = *self.account.read() else {
            return reject(&self.view, FlowError::NotConnected);
        };
        let vault_id = *self.vault_id.read();
        let action = WriteAction::Borrow {
            vault_id,
            amount_collateral,
            amount_to_borrow,
        };

        self.view.update(|s| s.busy = true);
        let res = self.borrow.run(action, &account, self.view.token()).await;
        settle(&self.view, self.borrow.last_tx(), &res);
        if res.is_ok() {
            info!(target: "screen", vault_id, %amount_to_borrow, "position created");
            *self.step.write() = VaultStep::Done;
            self.refresh().await;
        }
        res
    }

    pub fn unmount(&self) {
        self.guard.unmount();
    }
}

/// Open positions of the connected account, with cancel.
pub struct DashboardScreen {
    reader: Arc<dyn ChainReader>,
    guard: ScreenGuard,
    view: SharedView<Vec<PositionView>>,
    account: RwLock<Option<AccountContext>>,
    cancel: SubmitFlow,
}

impl DashboardScreen {
    pub async fn mount(
        reader: Arc<dyn ChainReader>,
        flows: FlowContext,
        account: Option<AccountContext>,
    ) -> Self {
        let guard = ScreenGuard::new();
        let view = SharedView::new(guard.token());
        let screen = Self {
            reader,
            guard,
            view,
            account: RwLock::new(account),
            cancel: SubmitFlow::new(flows),
        };
        screen.refresh().await;
        screen
    }

    pub async fn refresh(&self) {
        let Some(account) = *self.account.read() else {
            self.view.update(|s| {
                s.loading = false;
                s.data = None;
            });
            return;
        };
        self.view.update(|s| s.loading = true);
        let rows = load_positions(&*self.reader, &account).await;
        debug!(target: "screen", screen = "dashboard", positions = rows.as_ref().map(|r| r.len()), "refreshed");
        self.view.update(|s| {
            s.loading = false;
            s.data = rows;
        });
    }

    pub async fn set_account(&self, account: Option<AccountContext>) {
        if *self.account.read() == account {
            return;
        }
        *self.account.write() = account;
        self.refresh().await;
    }

    pub fn state(&self) -> ViewState<Vec<PositionView>> {
        let mut state = self.view.snapshot();
        state.busy = self.cancel.is_busy();
        state
    }

    /// Cancels `position_id` and re-reads the open positions once confirmed.
    pub async fn cancel(&self, position_id: PositionId) -> Result<TxReceipt, FlowError> {
        let Some(account) = *self.account.read() else {
            return reject(&self.view, FlowError::NotConnected);
        };
        self.view.update(|s| s.busy = true);
        let res = self
            .cancel
            .run(WriteAction::Cancel { position_id }, &account, self.view.token())
            .await;
        settle(&self.view, self.cancel.last_tx(), &res);
        if res.is_ok() {
            info!(target: "screen", position_id, "position cancelled");
            self.refresh().await;
        }
        res
    }

    pub fn unmount(&self) {
        self.guard.unmount();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaucetBalance {
    pub token: FaucetToken,
    pub balance: Option<U256>,
    pub decimals: u8,
}

/// Test-token balances of the connected account and the faucet claim.
pub struct FaucetScreen {
    reader: Arc<dyn ChainReader>,
    tokens: Vec<FaucetToken>,
    guard: ScreenGuard,
    view: SharedView<Vec<FaucetBalance>>,
    account: RwLock<Option<AccountContext>>,
    claim: SubmitFlow,
}

impl FaucetScreen {
    pub async fn mount(
        reader: Arc<dyn ChainReader>,
        flows: FlowContext,
        tokens: Vec<FaucetToken>,
        account: Option<AccountContext>,
    ) -> Self {
        let guard = ScreenGuard::new();
        let view = SharedView::new(guard.token());
        let screen = Self {
            reader,
            tokens,
            guard,
            view,
            account: RwLock::new(account),
            claim: SubmitFlow::new(flows),
        };
        screen.refresh().await;
        screen
    }

    pub async fn refresh(&self) {
        let account = *self.account.read();
        self.view.update(|s| s.loading = true);
        let reader = &*self.reader;
        let rows = join_all(self.tokens.iter().map(|token| async move {
            let (balance, decimals) = match account.as_ref() {
                Some(acct) => futures::join!(
                    reader.token_balance(token.address, acct),
                    reader.token_decimals(token.address)
                ),
                None => (None, reader.token_decimals(token.address).await),
            };
            FaucetBalance {
                token: token.clone(),
                balance,
                decimals: decimals.unwrap_or(DEFAULT_DECIMALS),
            }
        }))
        .await;
        self.view.update(|s| {
            s.loading = false;
            s.data = Some(rows);
        });
    }

    pub async fn set_account(&self, account: Option<AccountContext>) {
        if *self.account.read() == account {
            return;
        }
        *self.account.write() = account;
        self.refresh().await;
    }

    pub fn tokens(&self) -> &[FaucetToken] {
        &self.tokens
    }

    pub fn state(&self) -> ViewState<Vec<FaucetBalance>> {
        let mut state = self.view.snapshot();
        state.busy = self.claim.is_busy();
        state
    }

    pub async fn claim(&self, token: Address) -> Result<TxReceipt, FlowError> {
        let Some(account) = *self.account.read() else {
            return reject(&self.view, FlowError::NotConnected);
        };
        self.view.update(|s| s.busy = true);
        let res = self
            .claim
            .run(WriteAction::Faucet { token }, &account, self.view.token())
            .await;
        settle(&self.view, self.claim.last_tx(), &res);
        if res.is_ok() {
            info!(target: "screen", %token, "faucet claimed");
            self.refresh().await;
        }
        res
    }

    pub fn unmount(&self) {
        self.guard.unmount();
    }
}
