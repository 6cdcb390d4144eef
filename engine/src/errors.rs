use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;
/// Execution reverted (geth and most providers).
pub const EXECUTION_REVERTED_CODE: i64 = 3;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http {status}: {text}")]
    HttpStatus { status: StatusCode, text: String },

    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("{method} returned no result")]
    MissingResult { method: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl RpcError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, RpcError::Rpc { code, .. } if *code == USER_REJECTED_CODE)
    }

    pub fn is_revert(&self) -> bool {
        match self {
            RpcError::Rpc { code, message, .. } => {
                *code == EXECUTION_REVERTED_CODE || message.to_lowercase().contains("revert")
            }
            _ => false,
        }
    }
}
