//! Byte-forging and injection delegates
//!
//! Wire serialization and broadcast are pluggable. The defaults delegate both
//! to the node; a local forger can be swapped in through the context.

use crate::rpc::{ForgeParams, RpcError, TezosRpc};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ForgeError {
    #[error("Forging failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// `forge({branch, contents}) -> hex`
///
/// Must be deterministic: preapply and injection rely on the same input
/// producing the same bytes.
#[async_trait]
pub trait Forger: Send + Sync {
    async fn forge(&self, params: &ForgeParams) -> Result<String, ForgeError>;
}

/// Broadcast signed bytes, returning the operation hash
#[async_trait]
pub trait Injector: Send + Sync {
    async fn inject(&self, signed_bytes: &str) -> Result<String, RpcError>;
}

/// Forges through `helpers/forge/operations`
#[derive(Clone)]
pub struct RpcForger {
    rpc: Arc<dyn TezosRpc>,
}

impl RpcForger {
    pub fn new(rpc: Arc<dyn TezosRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl Forger for RpcForger {
    async fn forge(&self, params: &ForgeParams) -> Result<String, ForgeError> {
        let bytes = self.rpc.forge_operations(params).await?;
        if bytes.len() % 2 != 0 || hex::decode(&bytes).is_err() {
            return Err(ForgeError::Failed(format!(
                "node returned non-hex forged bytes ({} chars)",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

/// Injects through `injection/operation`
#[derive(Clone)]
pub struct RpcInjector {
    rpc: Arc<dyn TezosRpc>,
}

impl RpcInjector {
    pub fn new(rpc: Arc<dyn TezosRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl Injector for RpcInjector {
    async fn inject(&self, signed_bytes: &str) -> Result<String, RpcError> {
        self.rpc.inject_operation(signed_bytes).await
    }
}
