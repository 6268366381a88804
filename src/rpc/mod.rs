//! Node query surface
//!
//! The lifecycle only talks to the node through [`TezosRpc`]. The bundled
//! [`HttpRpcClient`] speaks the standard JSON endpoints over reqwest; tests
//! and embedders may provide their own implementation.

use async_trait::async_trait;
use serde_json::Value;

pub mod errors;
pub mod http;
pub mod types;

pub use errors::{RpcError, RpcResult};
pub use http::HttpRpcClient;
pub use types::{
    Block, BlockHeader, BlockMetadata, BlockShellHeader, ContractResponse, EntrypointsResponse,
    ForgeParams, PreapplyResponse, RunOperationOperation, RunOperationRequest,
};

use crate::operations::content::OperationGroup;

/// Remote node endpoints required by the operation lifecycle
///
/// All block-scoped calls target the client's configured block (normally
/// `head`).
#[async_trait]
pub trait TezosRpc: Send + Sync {
    /// Endpoint identifier used in logs
    fn url(&self) -> &str;

    async fn get_block_header(&self) -> RpcResult<BlockHeader>;

    /// Must expose `next_protocol`
    async fn get_block_metadata(&self) -> RpcResult<BlockMetadata>;

    /// Full block including the four operation passes
    async fn get_block(&self) -> RpcResult<Block>;

    /// Must expose `counter` for implicit accounts
    async fn get_contract(&self, address: &str) -> RpcResult<ContractResponse>;

    /// `None` when the account's public key has not been revealed
    async fn get_manager_key(&self, address: &str) -> RpcResult<Option<String>>;

    async fn get_entrypoints(&self, address: &str) -> RpcResult<EntrypointsResponse>;

    async fn get_chain_id(&self) -> RpcResult<String>;

    /// Dry-run simulation; signature is not verified
    async fn run_operation(&self, request: &RunOperationRequest) -> RpcResult<PreapplyResponse>;

    /// Validation dry-run; returned untyped so callers can reject
    /// malformed (non-array) responses explicitly
    async fn preapply_operations(&self, groups: &[OperationGroup]) -> RpcResult<Value>;

    /// Node-side forging
    async fn forge_operations(&self, params: &ForgeParams) -> RpcResult<String>;

    /// Broadcast signed bytes, returning the operation hash
    async fn inject_operation(&self, signed_bytes: &str) -> RpcResult<String>;
}
