//! Entry point bundling every provider over one shared context

use crate::config::Config;
use crate::context::{Context, ContextHandle, PollingConfig};
use crate::contract::ContractAbstraction;
use crate::estimate::EstimationProvider;
use crate::forger::{Forger, Injector};
use crate::operations::batch::OperationBatch;
use crate::operations::errors::OpResult;
use crate::operations::operation::Operation;
use crate::operations::provider::OperationProvider;
use crate::protocol::Protocol;
use crate::rpc::{HttpRpcClient, RpcResult, TezosRpc};
use crate::signer::Signer;
use crate::subscribe::SubscribeProvider;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct TezosClient {
    context: ContextHandle,
    subscriptions: SubscribeProvider,
}

impl TezosClient {
    pub fn new(rpc: Arc<dyn TezosRpc>) -> Self {
        Self::from_context(Context::new(rpc))
    }

    pub fn from_context(context: Context) -> Self {
        let context = ContextHandle::new(context);
        Self {
            subscriptions: SubscribeProvider::new(context.clone()),
            context,
        }
    }

    /// HTTP client, polling settings and protocol hint from `config`
    pub fn from_config(config: &Config) -> RpcResult<Self> {
        let rpc = HttpRpcClient::with_chain(
            &config.rpc.url,
            &config.rpc.chain,
            &config.rpc.block,
            config.rpc_timeout(),
        )?;
        Ok(Self::from_context(
            Context::new(Arc::new(rpc))
                .with_config(config.polling_config())
                .with_protocol(config.protocol_hint()),
        ))
    }

    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    pub fn set_rpc(&self, rpc: Arc<dyn TezosRpc>) {
        self.context.set_rpc(rpc);
    }

    pub fn set_signer(&self, signer: Arc<dyn Signer>) {
        self.context.set_signer(signer);
    }

    pub fn set_protocol(&self, protocol: Option<Protocol>) {
        self.context.set_protocol(protocol);
    }

    pub fn set_config(&self, config: PollingConfig) {
        self.context.set_config(config);
    }

    pub fn set_forger(&self, forger: Option<Arc<dyn Forger>>) {
        self.context.set_forger(forger);
    }

    pub fn set_injector(&self, injector: Option<Arc<dyn Injector>>) {
        self.context.set_injector(injector);
    }

    pub fn operations(&self) -> OperationProvider {
        OperationProvider::new(self.context.clone())
    }

    pub fn estimate(&self) -> EstimationProvider {
        EstimationProvider::new(self.context.clone())
    }

    pub fn batch(&self) -> OperationBatch {
        OperationBatch::new(self.context.clone())
    }

    /// Shared by every subscription made through this client
    pub fn subscribe(&self) -> &SubscribeProvider {
        &self.subscriptions
    }

    pub async fn contract(&self, address: &str) -> OpResult<ContractAbstraction> {
        ContractAbstraction::at(self.context.clone(), address).await
    }

    /// Handle for tracking an operation injected elsewhere
    pub fn operation(&self, hash: &str) -> Operation {
        Operation::from_hash(hash, self.context.snapshot())
    }
}
