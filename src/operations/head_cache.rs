//! Deduplicated head-block accessor
//!
//! Every confirmation tracker polls the head. Trackers sharing one context
//! share one `HeadCache`, so within a one-second window they all await the
//! same in-flight fetch instead of each hitting the node.

use crate::metrics::metrics;
use crate::rpc::{Block, RpcError, TezosRpc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Window during which a head fetch is reused
pub const HEAD_CACHE_TTL: Duration = Duration::from_secs(1);

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Tokio's clock; follows virtual time when the runtime is paused
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-advanced clock for tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

type SharedHead = Shared<BoxFuture<'static, Result<Arc<Block>, RpcError>>>;

struct CacheEntry {
    created_at: Instant,
    fetch: SharedHead,
}

pub struct HeadCache {
    rpc: Arc<dyn TezosRpc>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl std::fmt::Debug for HeadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadCache")
            .field("rpc", &self.rpc.url())
            .field("ttl", &self.ttl)
            .field("cached", &self.entry.lock().is_some())
            .finish()
    }
}

impl HeadCache {
    pub fn new(rpc: Arc<dyn TezosRpc>) -> Self {
        Self::with_clock(rpc, Arc::new(TokioClock), HEAD_CACHE_TTL)
    }

    pub fn with_clock(rpc: Arc<dyn TezosRpc>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            rpc,
            clock,
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Current head, reusing a fetch started less than `ttl` ago
    pub async fn get(&self) -> Result<Arc<Block>, RpcError> {
        let fetch = {
            let mut entry = self.entry.lock();
            let now = self.clock.now();
            match entry.as_ref() {
                Some(cached) if now.duration_since(cached.created_at) < self.ttl => {
                    metrics().head_cache_hits.inc();
                    cached.fetch.clone()
                }
                _ => {
                    metrics().head_cache_misses.inc();
                    let rpc = Arc::clone(&self.rpc);
                    let fetch = async move { rpc.get_block().await.map(Arc::new) }
                        .boxed()
                        .shared();
                    *entry = Some(CacheEntry {
                        created_at: now,
                        fetch: fetch.clone(),
                    });
                    debug!(url = %self.rpc.url(), "Head cache refreshed");
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Drop any cached fetch
    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }
}
