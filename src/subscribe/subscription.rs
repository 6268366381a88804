//! Push-style subscription handle
//!
//! A dispatcher task reads block events from the shared poller, maps them to
//! items and calls the attached handlers. The task holds its receiver from
//! the start but only reads it once the first data or error handler is
//! attached, so blocks polled before that stay buffered. Handlers may be
//! attached and detached at any time; closing (or dropping) the handle ends
//! the task and releases its receiver.

use crate::metrics::metrics;
use crate::operations::errors::OperationError;
use crate::rpc::Block;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Identifies one attached handler for [`Subscription::off`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// What the poller broadcasts to every subscription
#[derive(Debug, Clone)]
pub enum BlockEvent {
    Block(Arc<Block>),
    Error(OperationError),
}

type DataHandler<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&OperationError) + Send + Sync>;
type CloseHandler = Arc<dyn Fn() + Send + Sync>;

struct Handlers<T> {
    data: Vec<(HandlerId, DataHandler<T>)>,
    error: Vec<(HandlerId, ErrorHandler)>,
    close: Vec<(HandlerId, CloseHandler)>,
}

impl<T> Default for Handlers<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            error: Vec::new(),
            close: Vec::new(),
        }
    }
}

pub struct Subscription<T> {
    handlers: Arc<Mutex<Handlers<T>>>,
    next_id: AtomicU64,
    ready: Arc<Notify>,
    shutdown: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock();
        f.debug_struct("Subscription")
            .field("data_handlers", &handlers.data.len())
            .field("error_handlers", &handlers.error.len())
            .field("close_handlers", &handlers.close.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Subscription<T> {
    /// Spawn the dispatcher; `map` selects the items delivered per block
    pub(crate) fn spawn<F>(mut events: broadcast::Receiver<BlockEvent>, map: F) -> Self
    where
        F: Fn(&Block) -> Vec<T> + Send + 'static,
    {
        let handlers: Arc<Mutex<Handlers<T>>> = Arc::default();
        let ready = Arc::new(Notify::new());
        let shutdown = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));
        metrics().active_subscriptions.inc();

        let task_handlers = Arc::clone(&handlers);
        let task_ready = Arc::clone(&ready);
        let task_shutdown = Arc::clone(&shutdown);
        let task_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            let started = tokio::select! {
                biased;
                _ = task_shutdown.notified() => false,
                _ = task_ready.notified() => true,
            };

            if started {
                loop {
                    tokio::select! {
                        biased;
                        _ = task_shutdown.notified() => break,
                        event = events.recv() => match event {
                            Ok(BlockEvent::Block(block)) => {
                                let items = map(&block);
                                if items.is_empty() {
                                    continue;
                                }
                                let targets: Vec<DataHandler<T>> =
                                    task_handlers.lock().data.iter().map(|(_, h)| Arc::clone(h)).collect();
                                for item in &items {
                                    metrics().subscription_events.inc();
                                    for handler in &targets {
                                        handler(item);
                                    }
                                }
                            }
                            Ok(BlockEvent::Error(err)) => {
                                let targets: Vec<ErrorHandler> =
                                    task_handlers.lock().error.iter().map(|(_, h)| Arc::clone(h)).collect();
                                for handler in &targets {
                                    handler(&err);
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "Subscription lagged behind the poller");
                            }
                            Err(RecvError::Closed) => break,
                        },
                    }
                }
            }

            drop(events);
            task_closed.store(true, Ordering::Release);
            metrics().active_subscriptions.dec();
            let targets: Vec<CloseHandler> =
                task_handlers.lock().close.iter().map(|(_, h)| Arc::clone(h)).collect();
            for handler in &targets {
                handler();
            }
            debug!("Subscription closed");
        });

        Self {
            handlers,
            next_id: AtomicU64::new(0),
            ready,
            shutdown,
            closed,
        }
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn on_data(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id();
        self.handlers.lock().data.push((id, Arc::new(handler)));
        self.ready.notify_one();
        id
    }

    pub fn on_error(&self, handler: impl Fn(&OperationError) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id();
        self.handlers.lock().error.push((id, Arc::new(handler)));
        self.ready.notify_one();
        id
    }

    pub fn on_close(&self, handler: impl Fn() + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id();
        self.handlers.lock().close.push((id, Arc::new(handler)));
        id
    }
}

impl<T> Subscription<T> {
    /// Detach a handler; returns whether it was attached
    pub fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.data.len() + handlers.error.len() + handlers.close.len();
        handlers.data.retain(|(h, _)| *h != id);
        handlers.error.retain(|(h, _)| *h != id);
        handlers.close.retain(|(h, _)| *h != id);
        before != handlers.data.len() + handlers.error.len() + handlers.close.len()
    }

    /// Stop delivering; close handlers run once the dispatcher exits
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::block_at;
    use tokio::sync::mpsc;

    fn levels(block: &Block) -> Vec<u64> {
        vec![block.level()]
    }

    #[tokio::test]
    async fn test_handlers_receive_until_detached() {
        let (tx, rx) = broadcast::channel(8);
        let sub = Subscription::spawn(rx, levels);
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let id = sub.on_data(move |level| {
            let _ = seen_tx.send(*level);
        });

        tx.send(BlockEvent::Block(Arc::new(block_at(1, &[])))).unwrap();
        assert_eq!(seen.recv().await, Some(1));

        assert!(sub.off(id));
        assert!(!sub.off(id));
        tx.send(BlockEvent::Block(Arc::new(block_at(2, &[])))).unwrap();
        // off() dropped the only sender
        sub.close();
        assert_eq!(seen.recv().await, None);
    }

    #[tokio::test]
    async fn test_blocks_sent_before_first_handler_are_delivered() {
        let (tx, rx) = broadcast::channel(8);
        let sub = Subscription::spawn(rx, levels);
        tx.send(BlockEvent::Block(Arc::new(block_at(1, &[])))).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        // still buffered in the receiver
        assert_eq!(tx.len(), 1);

        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        sub.on_data(move |level| {
            let _ = seen_tx.send(*level);
        });
        assert_eq!(seen.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_close_handlers_alone_do_not_start_delivery() {
        let (tx, rx) = broadcast::channel(8);
        let sub: Subscription<u64> = Subscription::spawn(rx, levels);
        sub.on_close(|| {});
        tx.send(BlockEvent::Block(Arc::new(block_at(1, &[])))).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(tx.len(), 1);
        assert!(!sub.is_closed());
    }

    #[tokio::test]
    async fn test_errors_go_to_error_handlers() {
        let (tx, rx) = broadcast::channel(8);
        let sub: Subscription<u64> = Subscription::spawn(rx, levels);
        let (err_tx, mut errs) = mpsc::unbounded_channel();
        sub.on_error(move |err| {
            let _ = err_tx.send(err.category());
        });

        tx.send(BlockEvent::Error(OperationError::Internal("boom".into())))
            .unwrap();
        assert_eq!(errs.recv().await, Some("internal"));
    }

    #[tokio::test]
    async fn test_close_runs_close_handlers_and_releases_receiver() {
        let (tx, rx) = broadcast::channel::<BlockEvent>(8);
        let sub: Subscription<u64> = Subscription::spawn(rx, levels);
        let (close_tx, mut closes) = mpsc::unbounded_channel();
        sub.on_close(move || {
            let _ = close_tx.send(());
        });
        assert_eq!(tx.receiver_count(), 1);

        sub.close();
        assert_eq!(closes.recv().await, Some(()));
        assert!(sub.is_closed());
        assert_eq!(tx.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_dispatcher() {
        let (tx, rx) = broadcast::channel::<BlockEvent>(8);
        let sub: Subscription<u64> = Subscription::spawn(rx, levels);
        drop(sub);
        for _ in 0..10 {
            if tx.receiver_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(tx.receiver_count(), 0);
    }
}
