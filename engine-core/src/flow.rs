use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TxHash;

/// Approve → deposit sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositState {
    #[default]
    Idle,
    Approving,
    Depositing,
    Confirmed,
    Failed,
}

impl DepositState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DepositState::Approving | DepositState::Depositing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DepositState::Confirmed | DepositState::Failed)
    }
}

/// Single-transaction flows: create position, cancel position, faucet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitState {
    #[default]
    Idle,
    Submitting,
    Confirmed,
    Failed,
}

impl SubmitState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SubmitState::Submitting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmitState::Confirmed | SubmitState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("no wallet connected")]
    NotConnected,

    #[error("a transaction for this action is still pending")]
    Busy,

    #[error("wallet is on chain {actual}, expected {expected}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("transaction rejected before submission: {0}")]
    SubmitRejected(String),

    #[error("transaction {hash} failed: {reason}")]
    ConfirmationFailed { hash: TxHash, reason: String },

    #[error("no confirmation for {hash} after {waited_ms}ms")]
    ConfirmationTimeout { hash: TxHash, waited_ms: u64 },

    #[error("cancelled")]
    Cancelled,
}

impl FlowError {
    /// Short text for the user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::InvalidAmount(reason) => format!("Invalid amount: {}", reason),
            FlowError::NotConnected => "Connect your wallet".to_string(),
            FlowError::Busy => "Please wait for the pending transaction".to_string(),
            FlowError::WrongNetwork { expected, .. } => {
                format!("Switch your wallet to chain {}", expected)
            }
            FlowError::SubmitRejected(_) => "Transaction Error".to_string(),
            FlowError::ConfirmationFailed { .. } => "Transaction failed".to_string(),
            FlowError::ConfirmationTimeout { .. } => {
                "Transaction not confirmed in time".to_string()
            }
            FlowError::Cancelled => "Cancelled".to_string(),
        }
    }

    /// Errors raised before anything reached the chain leave the flow state untouched.
    pub fn is_precheck(&self) -> bool {
        matches!(
            self,
            FlowError::InvalidAmount(_)
                | FlowError::NotConnected
                | FlowError::Busy
                | FlowError::WrongNetwork { .. }
        )
    }
}
