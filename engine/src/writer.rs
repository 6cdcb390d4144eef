use crate::abi::{ILendingEngine, IMockToken, IERC20};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;
use tc_engine_core::{
    AccountContext, ChainClient, ChainWriter, FlowError, PositionId, TxHash, TxReceipt, VaultId,
};
use tracing::{info, warn};

/// `ChainWriter` over the lending engine and its collateral tokens.
///
/// Amounts go on the wire exactly as given, in the token's base units.
pub struct EngineWriter<C: ChainClient> {
    chain: Arc<C>,
    engine: Address,
    confirmations: u64,
}

impl<C: ChainClient> EngineWriter<C> {
    pub fn new(chain: Arc<C>, engine: Address, confirmations: u64) -> Self {
        Self {
            chain,
            engine,
            confirmations: confirmations.max(1),
        }
    }

    async fn submit<T>(
        &self,
        to: Address,
        call: T,
        account: &AccountContext,
    ) -> Result<TxHash, FlowError>
    where
        T: SolCall + Send,
    {
        let data = Bytes::from(call.abi_encode());
        match self.chain.write_call(to, data, account.address).await {
            Ok(hash) => {
                info!(target: "writer", method = T::SIGNATURE, %to, %hash, "transaction sent");
                Ok(hash)
            }
            Err(err) => {
                warn!(target: "writer", method = T::SIGNATURE, %to, error = %err, "transaction rejected");
                Err(FlowError::SubmitRejected(format!("{:#}", err)))
            }
        }
    }
}

#[async_trait]
impl<C: ChainClient> ChainWriter for EngineWriter<C> {
    fn engine_address(&self) -> Address {
        self.engine
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
        account: &AccountContext,
    ) -> Result<TxHash, FlowError> {
        self.submit(token, IERC20::approveCall { spender, amount }, account)
            .await
    }

    async fn deposit_collateral(
        &self,
        vault_id: VaultId,
        amount: U256,
        account: &AccountContext,
    ) -> Result<TxHash, FlowError> {
        let call = ILendingEngine::depostionCollateralCall {
            vaultId: U256::from(vault_id),
            amount,
        };
        self.submit(self.engine, call, account).await
    }

    async fn create_position(
        &self,
        vault_id: VaultId,
        amount_collateral: U256,
        amount_to_borrow: U256,
        account: &AccountContext,
    ) -> Result<TxHash, FlowError> {
        let call = ILendingEngine::createPositionCall {
            vaultId: U256::from(vault_id),
            amountCollateral: amount_collateral,
            amountToBorrow: amount_to_borrow,
        };
        self.submit(self.engine, call, account).await
    }

    async fn cancel_position(
        &self,
        position_id: PositionId,
        account: &AccountContext,
    ) -> Result<TxHash, FlowError> {
        let call = ILendingEngine::canclePositionCall {
            positionId: U256::from(position_id),
        };
        self.submit(self.engine, call, account).await
    }

    async fn faucet(&self, token: Address, account: &AccountContext) -> Result<TxHash, FlowError> {
        self.submit(token, IMockToken::faucetCall {}, account).await
    }

    async fn await_confirmation(&self, hash: TxHash) -> anyhow::Result<TxReceipt> {
        self.chain.await_confirmation(hash, self.confirmations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use parking_lot::Mutex;
    use tc_engine_core::TxStatus;

    #[derive(Default)]
    struct RecordingChain {
        sent: Mutex<Vec<(Address, Bytes, Address)>>,
        reject: bool,
    }

    #[async_trait]
    impl ChainClient for RecordingChain {
        async fn read_call(&self, _to: Address, _d: Bytes, _f: Option<Address>) -> Result<Bytes> {
            Err(anyhow!("write-only mock"))
        }

        async fn write_call(&self, to: Address, data: Bytes, from: Address) -> Result<TxHash> {
            if self.reject {
                return Err(anyhow!("user rejected the request"));
            }
            self.sent.lock().push((to, data, from));
            Ok(TxHash::repeat_byte(0x42))
        }

        async fn await_confirmation(&self, hash: TxHash, confirmations: u64) -> Result<TxReceipt> {
            Ok(TxReceipt {
                hash,
                status: TxStatus::Success,
                block_number: confirmations,
            })
        }

        async fn token_balance(&self, _o: Address, _t: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }
    }

    fn acct() -> AccountContext {
        AccountContext::new(Address::repeat_byte(0xab), 11_155_111)
    }

    #[tokio::test]
    async fn approve_targets_token_with_engine_as_spender() {
        let chain = Arc::new(RecordingChain::default());
        let engine = Address::repeat_byte(0xee);
        let token = Address::repeat_byte(0x01);
        let w = EngineWriter::new(chain.clone(), engine, 1);
        let amount = U256::from(123_456_789u64);
        w.approve(token, w.engine_address(), amount, &acct()).await.unwrap();

        let sent = chain.sent.lock();
        let (to, data, from) = &sent[0];
        assert_eq!(*to, token);
        assert_eq!(*from, acct().address);
        let call = IERC20::approveCall::abi_decode(data, true).unwrap();
        assert_eq!(call.spender, engine);
        assert_eq!(call.amount, amount);
    }

    #[tokio::test]
    async fn create_position_passes_amounts_unchanged() {
        let chain = Arc::new(RecordingChain::default());
        let engine = Address::repeat_byte(0xee);
        let w = EngineWriter::new(chain.clone(), engine, 1);
        let collateral = U256::from(10u64).pow(U256::from(18u8)) + U256::from(1u8);
        let borrow = U256::from(449u64);
        w.create_position(2, collateral, borrow, &acct()).await.unwrap();

        let sent = chain.sent.lock();
        assert_eq!(sent[0].0, engine);
        let call = ILendingEngine::createPositionCall::abi_decode(&sent[0].1, true).unwrap();
        assert_eq!(call.vaultId, U256::from(2u8));
        assert_eq!(call.amountCollateral, collateral);
        assert_eq!(call.amountToBorrow, borrow);
    }

    #[tokio::test]
    async fn rejection_maps_to_submit_rejected() {
        let chain = Arc::new(RecordingChain {
            reject: true,
            ..Default::default()
        });
        let w = EngineWriter::new(chain, Address::repeat_byte(0xee), 1);
        let err = w.cancel_position(9, &acct()).await.unwrap_err();
        assert!(matches!(err, FlowError::SubmitRejected(ref m) if m.contains("rejected")));
    }

    #[tokio::test]
    async fn confirmations_floor_at_one() {
        let chain = Arc::new(RecordingChain::default());
        let w = EngineWriter::new(chain, Address::repeat_byte(0xee), 0);
        let receipt = w.await_confirmation(TxHash::ZERO).await.unwrap();
        assert_eq!(receipt.block_number, 1);
    }
}
