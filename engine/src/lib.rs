pub mod abi;
pub mod config;
pub mod errors;
pub mod reader;
pub mod rpc_chain;
pub mod rpc_pool;
pub mod screens;
pub mod sequencer;
pub mod view;
pub mod writer;

pub use config::*;
pub use errors::*;
pub use reader::{load_positions, load_token, load_vault_details, load_vaults, EngineReader};
pub use rpc_chain::{JsonRpcChain, JsonRpcWallet};
pub use rpc_pool::RpcPool;
pub use screens::*;
pub use sequencer::*;
pub use view::*;
pub use writer::EngineWriter;
