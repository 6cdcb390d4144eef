use crate::config::EngineConfig;
use crate::view::ScreenToken;
use alloy_primitives::{Address, U256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tc_engine_core::{
    AccountContext, ChainWriter, DepositState, FlowError, Metrics, PositionId, SubmitState,
    TransactionRecord, TxHash, TxReceipt, VaultId,
};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Writes are refused unless the wallet reports this chain.
    pub chain_id: u64,
    pub confirmation_timeout: Duration,
}

impl FlowSettings {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            chain_id: cfg.contracts.chain_id,
            confirmation_timeout: cfg.tx.confirmation_timeout(),
        }
    }
}

/// What every flow shares: the writer, timing and metrics.
#[derive(Clone)]
pub struct FlowContext {
    writer: Arc<dyn ChainWriter>,
    settings: FlowSettings,
    metrics: Arc<Metrics>,
}

impl FlowContext {
    pub fn new(writer: Arc<dyn ChainWriter>, settings: FlowSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            writer,
            settings,
            metrics,
        }
    }

    pub fn writer(&self) -> &Arc<dyn ChainWriter> {
        &self.writer
    }

    fn check_network(&self, account: &AccountContext) -> Result<(), FlowError> {
        if account.chain_id != self.settings.chain_id {
            return Err(FlowError::WrongNetwork {
                expected: self.settings.chain_id,
                actual: account.chain_id,
            });
        }
        Ok(())
    }

    /// Waits for the receipt, bounded by the timeout and abandoned on unmount.
    async fn wait(&self, hash: TxHash, screen: &ScreenToken) -> Result<TxReceipt, FlowError> {
        let timeout = self.settings.confirmation_timeout;
        tokio::select! {
            biased;
            _ = screen.unmounted() => Err(FlowError::Cancelled),
            res = tokio::time::timeout(timeout, self.writer.await_confirmation(hash)) => match res {
                Ok(Ok(receipt)) => Ok(receipt),
                Ok(Err(err)) => Err(FlowError::ConfirmationFailed {
                    hash,
                    reason: format!("{:#}", err),
                }),
                Err(_) => Err(FlowError::ConfirmationTimeout {
                    hash,
                    waited_ms: timeout.as_millis() as u64,
                }),
            },
        }
    }

    /// One write: submit, publish the pending record, wait, publish the outcome.
    /// Nothing is submitted once the screen is gone.
    async fn step<F>(
        &self,
        label: &'static str,
        submit: F,
        screen: &ScreenToken,
        last_tx: &watch::Sender<Option<TransactionRecord>>,
    ) -> Result<TxReceipt, FlowError>
    where
        F: Future<Output = Result<TxHash, FlowError>> + Send,
    {
        if screen.is_unmounted() {
            return Err(FlowError::Cancelled);
        }
        let hash = match submit.await {
            Ok(hash) => hash,
            Err(err) => {
                self.metrics.tx_failed.inc();
                return Err(err);
            }
        };
        self.metrics.tx_submitted.inc();
        let record = TransactionRecord::pending(hash);
        last_tx.send_replace(Some(record));
        info!(target: "flow", step = label, %hash, "awaiting confirmation");

        self.metrics.inflight_tx.inc();
        let res = self.wait(hash, screen).await;
        self.metrics.inflight_tx.dec();

        match res {
            Ok(receipt) => {
                last_tx.send_replace(Some(record.settled(receipt.status)));
                if receipt.status.is_success() {
                    self.metrics.tx_confirmed.inc();
                    info!(target: "flow", step = label, %hash, block = receipt.block_number, "confirmed");
                    Ok(receipt)
                } else {
                    self.metrics.tx_failed.inc();
                    Err(FlowError::ConfirmationFailed {
                        hash,
                        reason: "transaction reverted".to_string(),
                    })
                }
            }
            Err(FlowError::Cancelled) => Err(FlowError::Cancelled),
            Err(err) => {
                self.metrics.tx_failed.inc();
                Err(err)
            }
        }
    }
}

/// Single-permit guard: at most one run per flow instance.
struct RunGuard {
    permit: Arc<Semaphore>,
}

impl RunGuard {
    fn new() -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    fn acquire(&self) -> Result<OwnedSemaphorePermit, FlowError> {
        self.permit
            .clone()
            .try_acquire_owned()
            .map_err(|_| FlowError::Busy)
    }

    fn is_busy(&self) -> bool {
        self.permit.available_permits() == 0
    }
}

/// Approve the engine for exactly `amount`, then deposit it into the vault.
pub struct DepositFlow {
    ctx: FlowContext,
    guard: RunGuard,
    state: watch::Sender<DepositState>,
    last_tx: watch::Sender<Option<TransactionRecord>>,
}

impl DepositFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self {
            ctx,
            guard: RunGuard::new(),
            state: watch::channel(DepositState::Idle).0,
            last_tx: watch::channel(None).0,
        }
    }

    pub fn state(&self) -> DepositState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DepositState> {
        self.state.subscribe()
    }

    pub fn last_tx(&self) -> Option<TransactionRecord> {
        *self.last_tx.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    pub fn reset(&self) {
        if !self.is_busy() {
            self.state.send_replace(DepositState::Idle);
        }
    }

    fn validate(amount: U256, wallet_balance: U256) -> Result<(), FlowError> {
        if amount.is_zero() {
            return Err(FlowError::InvalidAmount("amount must be greater than zero".into()));
        }
        if amount > wallet_balance {
            return Err(FlowError::InvalidAmount("amount exceeds wallet balance".into()));
        }
        Ok(())
    }

    /// Returns the deposit receipt. Precheck errors and cancellation leave the
    /// state as it was.
    pub async fn run(
        &self,
        vault_id: VaultId,
        collateral: Address,
        amount: U256,
        wallet_balance: U256,
        account: &AccountContext,
        screen: &ScreenToken,
    ) -> Result<TxReceipt, FlowError> {
        let _permit = self.guard.acquire()?;
        if screen.is_unmounted() {
            return Err(FlowError::Cancelled);
        }
        Self::validate(amount, wallet_balance)?;
        self.ctx.check_network(account)?;

        let writer = self.ctx.writer.clone();
        let spender = writer.engine_address();
        self.state.send_replace(DepositState::Approving);
        info!(target: "flow", vault_id, %amount, %collateral, "deposit started");

        let res = async {
            self.ctx
                .step(
                    "approve",
                    writer.approve(collateral, spender, amount, account),
                    screen,
                    &self.last_tx,
                )
                .await?;
            self.state.send_replace(DepositState::Depositing);
            self.ctx
                .step(
                    "deposit",
                    writer.deposit_collateral(vault_id, amount, account),
                    screen,
                    &self.last_tx,
                )
                .await
        }
        .await;

        match res {
            Ok(receipt) => {
                self.state.send_replace(DepositState::Confirmed);
                Ok(receipt)
            }
            Err(FlowError::Cancelled) => {
                info!(target: "flow", vault_id, "deposit abandoned on unmount");
                Err(FlowError::Cancelled)
            }
            Err(err) => {
                warn!(target: "flow", vault_id, error = %err, "deposit failed");
                self.state.send_replace(DepositState::Failed);
                Err(err)
            }
        }
    }
}

/// Single-transaction writes driven by `SubmitFlow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Borrow {
        vault_id: VaultId,
        amount_collateral: U256,
        amount_to_borrow: U256,
    },
    /// No ownership check here; the engine refuses positions of other owners.
    Cancel { position_id: PositionId },
    Faucet { token: Address },
}

impl WriteAction {
    pub fn label(&self) -> &'static str {
        match self {
            WriteAction::Borrow { .. } => "create_position",
            WriteAction::Cancel { .. } => "cancel_position",
            WriteAction::Faucet { .. } => "faucet",
        }
    }
}

pub struct SubmitFlow {
    ctx: FlowContext,
    guard: RunGuard,
    state: watch::Sender<SubmitState>,
    last_tx: watch::Sender<Option<TransactionRecord>>,
}

impl SubmitFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self {
            ctx,
            guard: RunGuard::new(),
            state: watch::channel(SubmitState::Idle).0,
            last_tx: watch::channel(None).0,
        }
    }

    pub fn state(&self) -> SubmitState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmitState> {
        self.state.subscribe()
    }

    pub fn last_tx(&self) -> Option<TransactionRecord> {
        *self.last_tx.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    pub async fn run(
        &self,
        action: WriteAction,
        account: &AccountContext,
        screen: &ScreenToken,
    ) -> Result<TxReceipt, FlowError> {
        let _permit = self.guard.acquire()?;
        if screen.is_unmounted() {
            return Err(FlowError::Cancelled);
        }
        self.ctx.check_network(account)?;

        let writer = self.ctx.writer.clone();
        let label = action.label();
        self.state.send_replace(SubmitState::Submitting);
        info!(target: "flow", action = label, "submit started");

        let res = match action {
            WriteAction::Borrow {
                vault_id,
                amount_collateral,
                amount_to_borrow,
            } => {
                let submit =
                    writer.create_position(vault_id, amount_collateral, amount_to_borrow, account);
                self.ctx.step(label, submit, screen, &self.last_tx).await
            }
            WriteAction::Cancel { position_id } => {
                let submit = writer.cancel_position(position_id, account);
                self.ctx.step(label, submit, screen, &self.last_tx).await
            }
            WriteAction::Faucet { token } => {
                let submit = writer.faucet(token, account);
                self.ctx.step(label, submit, screen, &self.last_tx).await
            }
        };

        match res {
            Ok(receipt) => {
                self.state.send_replace(SubmitState::Confirmed);
                Ok(receipt)
            }
            Err(FlowError::Cancelled) => {
                info!(target: "flow", action = label, "submit abandoned on unmount");
                Err(FlowError::Cancelled)
            }
            Err(err) => {
                warn!(target: "flow", action = label, error = %err, "submit failed");
                self.state.send_replace(SubmitState::Failed);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::view::ScreenGuard;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use tc_engine_core::TxStatus;

    pub(crate) const CHAIN: u64 = 11_155_111;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Confirm {
        Success,
        Revert,
        Hang,
    }

    /// Records submitted methods; hashes are fixed per method.
    #[derive(Default)]
    pub(crate) struct MockWriter {
        pub(crate) calls: Mutex<Vec<&'static str>>,
        pub(crate) reject: Mutex<HashSet<&'static str>>,
        pub(crate) confirm: Mutex<HashMap<TxHash, Confirm>>,
    }

    pub(crate) fn hash_of(method: &str) -> TxHash {
        let byte = match method {
            "approve" => 1,
            "deposit" => 2,
            "create_position" => 3,
            "cancel_position" => 4,
            _ => 5,
        };
        TxHash::repeat_byte(byte)
    }

    impl MockWriter {
        fn record(&self, method: &'static str) -> Result<TxHash, FlowError> {
            self.calls.lock().push(method);
            if self.reject.lock().contains(method) {
                return Err(FlowError::SubmitRejected("user rejected the request".into()));
            }
            Ok(hash_of(method))
        }

        pub(crate) fn set_confirm(&self, method: &str, confirm: Confirm) {
            self.confirm.lock().insert(hash_of(method), confirm);
        }

        pub(crate) fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ChainWriter for MockWriter {
        fn engine_address(&self) -> Address {
            Address::repeat_byte(0xee)
        }

        async fn approve(
            &self,
            _token: Address,
            _spender: Address,
            _amount: U256,
            _account: &AccountContext,
        ) -> Result<TxHash, FlowError> {
            self.record("approve")
        }

        async fn deposit_collateral(
            &self,
            _vault_id: VaultId,
            _amount: U256,
            _account: &AccountContext,
        ) -> Result<TxHash, FlowError> {
            self.record("deposit")
        }

        async fn create_position(
            &self,
            _vault_id: VaultId,
            _c: U256,
            _b: U256,
            _account: &AccountContext,
        ) -> Result<TxHash, FlowError> {
            self.record("create_position")
        }

        async fn cancel_position(
            &self,
            _position_id: PositionId,
            _account: &AccountContext,
        ) -> Result<TxHash, FlowError> {
            self.record("cancel_position")
        }

        async fn faucet(&self, _token: Address, _account: &AccountContext) -> Result<TxHash, FlowError> {
            self.record("faucet")
        }

        async fn await_confirmation(&self, hash: TxHash) -> anyhow::Result<TxReceipt> {
            let mode = self
                .confirm
                .lock()
                .get(&hash)
                .copied()
                .unwrap_or(Confirm::Success);
            let status = match mode {
                Confirm::Success => TxStatus::Success,
                Confirm::Revert => TxStatus::Reverted,
                Confirm::Hang => std::future::pending().await,
            };
            Ok(TxReceipt {
                hash,
                status,
                block_number: 1,
            })
        }
    }

    pub(crate) fn context(writer: Arc<MockWriter>, timeout: Duration) -> (FlowContext, Arc<Metrics>) {
        let metrics = Metrics::detached();
        let settings = FlowSettings {
            chain_id: CHAIN,
            confirmation_timeout: timeout,
        };
        (FlowContext::new(writer, settings, metrics.clone()), metrics)
    }

    pub(crate) fn account() -> AccountContext {
        AccountContext::new(Address::repeat_byte(0xab), CHAIN)
    }

    fn setup() -> (Arc<MockWriter>, DepositFlow, Arc<Metrics>) {
        let writer = Arc::new(MockWriter::default());
        let (ctx, metrics) = context(writer.clone(), Duration::from_secs(5));
        (writer, DepositFlow::new(ctx), metrics)
    }

    fn token() -> Address {
        Address::repeat_byte(0x01)
    }

    const BAL: u64 = 1_000;

    #[tokio::test]
    async fn deposit_runs_approve_then_deposit() {
        let (writer, flow, metrics) = setup();
        let screen = ScreenGuard::new();
        let receipt = flow
            .run(0, token(), U256::from(400u64), U256::from(BAL), &account(), &screen.token())
            .await
            .unwrap();
        assert_eq!(receipt.hash, hash_of("deposit"));
        assert_eq!(writer.calls(), vec!["approve", "deposit"]);
        assert_eq!(flow.state(), DepositState::Confirmed);
        let last = flow.last_tx().unwrap();
        assert_eq!(last.hash, hash_of("deposit"));
        assert_eq!(last.outcome, Some(TxStatus::Success));
        assert_eq!(metrics.tx_confirmed.get(), 2);
        assert_eq!(metrics.inflight_tx.get(), 0);
    }

    #[tokio::test]
    async fn rejected_approve_never_deposits() {
        let (writer, flow, metrics) = setup();
        writer.reject.lock().insert("approve");
        let screen = ScreenGuard::new();
        let err = flow
            .run(0, token(), U256::from(1u8), U256::from(BAL), &account(), &screen.token())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::SubmitRejected(_)));
        assert_eq!(err.user_message(), "Transaction Error");
        assert_eq!(writer.calls(), vec!["approve"]);
        assert_eq!(flow.state(), DepositState::Failed);
        assert_eq!(metrics.tx_failed.get(), 1);
    }

    #[tokio::test]
    async fn reverted_approve_never_deposits() {
        let (writer, flow, _) = setup();
        writer.set_confirm("approve", Confirm::Revert);
        let screen = ScreenGuard::new();
        let err = flow
            .run(0, token(), U256::from(1u8), U256::from(BAL), &account(), &screen.token())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ConfirmationFailed { hash, .. } if hash == hash_of("approve")));
        assert_eq!(writer.calls(), vec!["approve"]);
        assert_eq!(flow.last_tx().unwrap().outcome, Some(TxStatus::Reverted));
    }

    #[tokio::test]
    async fn failed_deposit_can_be_retried() {
        let (writer, flow, _) = setup();
        writer.set_confirm("deposit", Confirm::Revert);
        let screen = ScreenGuard::new();
        let amount = U256::from(BAL);
        let err = flow
            .run(1, token(), amount, amount, &account(), &screen.token())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ConfirmationFailed { .. }));
        assert_eq!(flow.state(), DepositState::Failed);

        writer.set_confirm("deposit", Confirm::Success);
        flow.run(1, token(), amount, amount, &account(), &screen.token())
            .await
            .unwrap();
        assert_eq!(flow.state(), DepositState::Confirmed);
        assert_eq!(writer.calls(), vec!["approve", "deposit", "approve", "deposit"]);
    }

    #[tokio::test]
    async fn invalid_amounts_leave_state_untouched() {
        let (writer, flow, _) = setup();
        let screen = ScreenGuard::new();
        for amount in [U256::ZERO, U256::from(BAL + 1)] {
            let err = flow
                .run(0, token(), amount, U256::from(BAL), &account(), &screen.token())
                .await
                .unwrap_err();
            assert!(matches!(err, FlowError::InvalidAmount(_)));
            assert!(err.is_precheck());
        }
        assert_eq!(flow.state(), DepositState::Idle);
        assert!(writer.calls().is_empty());
    }

    #[tokio::test]
    async fn wrong_network_is_refused() {
        let (writer, flow, _) = setup();
        let screen = ScreenGuard::new();
        let mainnet = AccountContext::new(Address::repeat_byte(0xab), 1);
        let err = flow
            .run(0, token(), U256::from(1u8), U256::from(BAL), &mainnet, &screen.token())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FlowError::WrongNetwork {
                expected: CHAIN,
                actual: 1
            }
        );
        assert!(writer.calls().is_empty());
    }

    #[tokio::test]
    async fn second_run_while_pending_is_busy_and_unmount_cancels() {
        let writer = Arc::new(MockWriter::default());
        writer.set_confirm("approve", Confirm::Hang);
        let (ctx, metrics) = context(writer.clone(), Duration::from_secs(30));
        let flow = Arc::new(DepositFlow::new(ctx));
        let screen = ScreenGuard::new();

        let mut states = flow.subscribe();
        let running = {
            let flow = flow.clone();
            let token_ = screen.token();
            tokio::spawn(async move {
                flow.run(0, token(), U256::from(5u8), U256::from(BAL), &account(), &token_)
                    .await
            })
        };
        states
            .wait_for(|s| *s == DepositState::Approving)
            .await
            .unwrap();
        assert!(flow.is_busy());

        let err = flow
            .run(0, token(), U256::from(5u8), U256::from(BAL), &account(), &screen.token())
            .await
            .unwrap_err();
        assert_eq!(err, FlowError::Busy);

        screen.unmount();
        let first = running.await.unwrap().unwrap_err();
        assert_eq!(first, FlowError::Cancelled);
        assert!(!flow.is_busy());
        assert_eq!(writer.calls(), vec!["approve"]);
        assert_eq!(metrics.inflight_tx.get(), 0);
        assert_eq!(metrics.tx_failed.get(), 0);
        assert_ne!(flow.state(), DepositState::Failed);
    }

    #[tokio::test]
    async fn unmounted_screen_submits_nothing() {
        let (writer, flow, metrics) = setup();
        let screen = ScreenGuard::new();
        let token_ = screen.token();
        screen.unmount();
        let err = flow
            .run(0, token(), U256::from(5u8), U256::from(BAL), &account(), &token_)
            .await
            .unwrap_err();
        assert_eq!(err, FlowError::Cancelled);
        assert!(writer.calls().is_empty());
        assert_eq!(flow.state(), DepositState::Idle);
        assert!(flow.last_tx().is_none());
        assert_eq!(metrics.tx_submitted.get(), 0);

        let (ctx, _) = context(writer.clone(), Duration::from_secs(5));
        let submit = SubmitFlow::new(ctx);
        let err = submit
            .run(WriteAction::Faucet { token: token() }, &account(), &token_)
            .await
            .unwrap_err();
        assert_eq!(err, FlowError::Cancelled);
        assert!(writer.calls().is_empty());
        assert_eq!(submit.state(), SubmitState::Idle);
    }

    #[tokio::test]
    async fn step_after_unmount_never_polls_submit() {
        let writer = Arc::new(MockWriter::default());
        let (ctx, metrics) = context(writer, Duration::from_secs(5));
        let (last_tx, _) = watch::channel(None);
        let screen = ScreenGuard::new();
        let token_ = screen.token();
        screen.unmount();

        let polled = std::sync::atomic::AtomicBool::new(false);
        let submit = async {
            polled.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(hash_of("deposit"))
        };
        let err = ctx.step("deposit", submit, &token_, &last_tx).await.unwrap_err();
        assert_eq!(err, FlowError::Cancelled);
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
        assert!(last_tx.borrow().is_none());
        assert_eq!(metrics.tx_submitted.get(), 0);
        assert_eq!(metrics.tx_failed.get(), 0);
    }

    #[tokio::test]
    async fn confirmation_timeout_fails_flow() {
        let writer = Arc::new(MockWriter::default());
        writer.set_confirm("approve", Confirm::Hang);
        let (ctx, _) = context(writer.clone(), Duration::from_millis(20));
        let flow = DepositFlow::new(ctx);
        let screen = ScreenGuard::new();
        let err = flow
            .run(0, token(), U256::from(5u8), U256::from(BAL), &account(), &screen.token())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FlowError::ConfirmationTimeout {
                hash: hash_of("approve"),
                waited_ms: 20
            }
        );
        assert_eq!(flow.state(), DepositState::Failed);
        assert!(flow.last_tx().unwrap().is_pending());
    }

    #[tokio::test]
    async fn cancel_submits_without_ownership_check() {
        let writer = Arc::new(MockWriter::default());
        let (ctx, _) = context(writer.clone(), Duration::from_secs(5));
        let flow = SubmitFlow::new(ctx);
        let screen = ScreenGuard::new();
        flow.run(
            WriteAction::Cancel { position_id: 999 },
            &account(),
            &screen.token(),
        )
        .await
        .unwrap();
        assert_eq!(writer.calls(), vec!["cancel_position"]);
        assert_eq!(flow.state(), SubmitState::Confirmed);
    }

    #[tokio::test]
    async fn borrow_revert_marks_failed() {
        let writer = Arc::new(MockWriter::default());
        writer.set_confirm("create_position", Confirm::Revert);
        let (ctx, _) = context(writer.clone(), Duration::from_secs(5));
        let flow = SubmitFlow::new(ctx);
        let screen = ScreenGuard::new();
        let action = WriteAction::Borrow {
            vault_id: 0,
            amount_collateral: U256::from(10u8),
            amount_to_borrow: U256::from(4u8),
        };
        let err = flow.run(action, &account(), &screen.token()).await.unwrap_err();
        assert_eq!(err.user_message(), "Transaction failed");
        assert_eq!(flow.state(), SubmitState::Failed);
    }
}
