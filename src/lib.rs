//! tezos-ops - Tezos operation lifecycle client
//!
//! Prepares, estimates, forges, signs, preapplies, injects and confirms
//! Tezos operations against a node's RPC interface, and watches new blocks
//! for operations matching a filter.

pub mod address;
pub mod client;
pub mod config;
pub mod context;
pub mod contract;
pub mod estimate;
pub mod forger;
pub mod metrics;
pub mod observability;
pub mod operations;
pub mod protocol;
pub mod rpc;
pub mod signer;
pub mod subscribe;
pub mod units;

pub mod test_utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use client::TezosClient;
pub use config::{Config, ConfigError};
pub use context::{Context, ContextHandle, PollingConfig};
pub use contract::{ContractAbstraction, ContractMethod, EntrypointTable};
pub use estimate::{Estimate, EstimationProvider};
pub use operations::{
    Limits, OpResult, Operation, OperationBatch, OperationError, OperationProvider,
    TransferParams,
};
pub use protocol::Protocol;
pub use rpc::{HttpRpcClient, RpcError, TezosRpc};
pub use signer::{Signer, SignerError, Watermark};
pub use subscribe::{Filter, SubscribeProvider, Subscription};
pub use units::Unit;
