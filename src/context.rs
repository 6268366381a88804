//! Configuration holder shared by every provider
//!
//! [`Context`] is a cheap-to-clone bundle of handles. Providers keep a
//! [`ContextHandle`] and take a [`Context`] snapshot at the start of each
//! call, so swapping the RPC or signer mid-flight never affects operations
//! that are already being prepared or confirmed.

use crate::forger::{Forger, Injector, RpcForger, RpcInjector};
use crate::operations::head_cache::HeadCache;
use crate::protocol::Protocol;
use crate::rpc::TezosRpc;
use crate::signer::{NoopSigner, Signer};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Polling behaviour for confirmations and subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub confirmation_polling_interval: Duration,
    pub confirmation_polling_timeout: Duration,
    pub default_confirmations: u32,
    pub stream_polling_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            confirmation_polling_interval: Duration::from_secs(10),
            confirmation_polling_timeout: Duration::from_secs(180),
            default_confirmations: 1,
            stream_polling_interval: Duration::from_secs(20),
        }
    }
}

/// Point-in-time configuration: RPC, signer, protocol hint, polling,
/// forger and injector
#[derive(Clone)]
pub struct Context {
    rpc: Arc<dyn TezosRpc>,
    signer: Arc<dyn Signer>,
    protocol: Option<Protocol>,
    config: PollingConfig,
    forger: Option<Arc<dyn Forger>>,
    injector: Option<Arc<dyn Injector>>,
    head_cache: Arc<HeadCache>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("rpc", &self.rpc.url())
            .field("protocol", &self.protocol)
            .field("config", &self.config)
            .field("custom_forger", &self.forger.is_some())
            .field("custom_injector", &self.injector.is_some())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(rpc: Arc<dyn TezosRpc>) -> Self {
        let head_cache = Arc::new(HeadCache::new(Arc::clone(&rpc)));
        Self {
            rpc,
            signer: Arc::new(NoopSigner),
            protocol: None,
            config: PollingConfig::default(),
            forger: None,
            injector: None,
            head_cache,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_protocol(mut self, protocol: Option<Protocol>) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_config(mut self, config: PollingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_forger(mut self, forger: Arc<dyn Forger>) -> Self {
        self.forger = Some(forger);
        self
    }

    pub fn with_injector(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn with_head_cache(mut self, head_cache: Arc<HeadCache>) -> Self {
        self.head_cache = head_cache;
        self
    }

    pub fn rpc(&self) -> &Arc<dyn TezosRpc> {
        &self.rpc
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    pub fn protocol(&self) -> Option<&Protocol> {
        self.protocol.as_ref()
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Custom forger, or node-side forging through the current RPC
    pub fn forger(&self) -> Arc<dyn Forger> {
        match &self.forger {
            Some(forger) => Arc::clone(forger),
            None => Arc::new(RpcForger::new(Arc::clone(&self.rpc))),
        }
    }

    /// Custom injector, or injection through the current RPC
    pub fn injector(&self) -> Arc<dyn Injector> {
        match &self.injector {
            Some(injector) => Arc::clone(injector),
            None => Arc::new(RpcInjector::new(Arc::clone(&self.rpc))),
        }
    }

    pub fn head_cache(&self) -> &Arc<HeadCache> {
        &self.head_cache
    }
}

/// Mutable owner of the live configuration
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<RwLock<Context>>,
}

impl ContextHandle {
    pub fn new(context: Context) -> Self {
        Self {
            inner: Arc::new(RwLock::new(context)),
        }
    }

    /// Shallow copy of the current configuration
    pub fn snapshot(&self) -> Context {
        self.inner.read().clone()
    }

    /// Swap the node; the head cache is rebuilt for the new endpoint
    pub fn set_rpc(&self, rpc: Arc<dyn TezosRpc>) {
        let mut ctx = self.inner.write();
        ctx.head_cache = Arc::new(HeadCache::new(Arc::clone(&rpc)));
        ctx.rpc = rpc;
    }

    pub fn set_signer(&self, signer: Arc<dyn Signer>) {
        self.inner.write().signer = signer;
    }

    pub fn set_protocol(&self, protocol: Option<Protocol>) {
        self.inner.write().protocol = protocol;
    }

    pub fn set_config(&self, config: PollingConfig) {
        self.inner.write().config = config;
    }

    pub fn set_forger(&self, forger: Option<Arc<dyn Forger>>) {
        self.inner.write().forger = forger;
    }

    pub fn set_injector(&self, injector: Option<Arc<dyn Injector>>) {
        self.inner.write().injector = injector;
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContextHandle").field(&*self.inner.read()).finish()
    }
}

impl From<Context> for ContextHandle {
    fn from(context: Context) -> Self {
        Self::new(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockRpc;

    #[test]
    fn test_snapshot_is_insulated_from_later_swaps() {
        let first = MockRpc::with_url("http://first");
        let second = MockRpc::with_url("http://second");
        let handle = ContextHandle::new(Context::new(Arc::new(first)));

        let snapshot = handle.snapshot();
        handle.set_rpc(Arc::new(second));

        assert_eq!(snapshot.rpc().url(), "http://first");
        assert_eq!(handle.snapshot().rpc().url(), "http://second");
    }

    #[test]
    fn test_config_swap_does_not_touch_snapshot() {
        let handle = ContextHandle::new(Context::new(Arc::new(MockRpc::new())));
        let snapshot = handle.snapshot();

        handle.set_config(PollingConfig {
            default_confirmations: 5,
            ..PollingConfig::default()
        });

        assert_eq!(snapshot.config().default_confirmations, 1);
        assert_eq!(handle.snapshot().config().default_confirmations, 5);
    }

    #[test]
    fn test_protocol_hint() {
        let ctx = Context::new(Arc::new(MockRpc::new())).with_protocol(Some(Protocol::PsCARTHA));
        assert_eq!(ctx.protocol(), Some(&Protocol::PsCARTHA));
    }
}
