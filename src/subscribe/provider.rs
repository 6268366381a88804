//! Block watching for subscriptions
//!
//! All subscriptions of one provider share a single poller task. The task
//! is started by the first subscription, reads the head through the
//! context's head cache every `stream_polling_interval`, broadcasts each new
//! block once, and stops when no subscription is left.

use super::filter::{matching_events, Filter, OperationEvent};
use super::subscription::{BlockEvent, Subscription};
use crate::context::ContextHandle;
use crate::operations::head_cache::HeadCache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Block events buffered per subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 64;

type PollerSlot = Arc<Mutex<Option<broadcast::Sender<BlockEvent>>>>;

#[derive(Clone)]
pub struct SubscribeProvider {
    context: ContextHandle,
    poller: PollerSlot,
}

impl std::fmt::Debug for SubscribeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeProvider")
            .field("polling", &self.is_polling())
            .finish_non_exhaustive()
    }
}

impl SubscribeProvider {
    pub fn new(context: ContextHandle) -> Self {
        Self {
            context,
            poller: Arc::default(),
        }
    }

    /// Hash of every new head
    pub fn subscribe_head(&self) -> Subscription<String> {
        Subscription::spawn(self.events(), |block| vec![block.hash.clone()])
    }

    /// Every content of every new block that `filter` selects
    pub fn subscribe_operation(&self, filter: Filter) -> Subscription<OperationEvent> {
        Subscription::spawn(self.events(), move |block| matching_events(block, &filter))
    }

    /// Whether the shared poller is running
    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    fn events(&self) -> broadcast::Receiver<BlockEvent> {
        let mut slot = self.poller.lock();
        if let Some(sender) = slot.as_ref() {
            return sender.subscribe();
        }

        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        let ctx = self.context.snapshot();
        tokio::spawn(poll_blocks(
            sender.clone(),
            Arc::clone(&self.poller),
            Arc::clone(ctx.head_cache()),
            ctx.config().stream_polling_interval,
        ));
        *slot = Some(sender);
        receiver
    }
}

async fn poll_blocks(
    sender: broadcast::Sender<BlockEvent>,
    slot: PollerSlot,
    head_cache: Arc<HeadCache>,
    interval: Duration,
) {
    info!(interval_secs = interval.as_secs_f64(), "Block poller started");
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_hash: Option<String> = None;

    loop {
        ticker.tick().await;
        {
            // Checked under the slot lock so a subscriber can never attach
            // to a poller that is about to exit
            let mut slot = slot.lock();
            if sender.receiver_count() == 0 {
                *slot = None;
                break;
            }
        }

        match head_cache.get().await {
            Ok(block) => {
                if last_hash.as_deref() == Some(block.hash.as_str()) {
                    continue;
                }
                debug!(level = block.level(), hash = %block.hash, "New head");
                last_hash = Some(block.hash.clone());
                let _ = sender.send(BlockEvent::Block(block));
            }
            Err(err) => {
                debug!(error = %err, "Head fetch failed");
                let _ = sender.send(BlockEvent::Error(err.into()));
            }
        }
    }
    info!("Block poller stopped");
}
