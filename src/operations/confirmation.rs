//! Confirmation tracking
//!
//! `Pending -> Found { level } -> Confirmed` or `TimedOut`. One tracker per
//! `confirmation(...)` call; trackers for the same operation share the
//! found-level memo and the context's head cache.

use super::errors::{OpResult, OperationError};
use super::head_cache::HeadCache;
use crate::metrics::{metrics, Timer};
use crate::rpc::Block;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Pending,
    Found { level: u64 },
    Confirmed { level: u64, head: u64 },
    TimedOut,
}

/// Polls allowed before giving up: `ceil(timeout / interval) + 1`
pub fn tick_budget(interval: Duration, timeout: Duration) -> OpResult<u64> {
    if interval.is_zero() || timeout.is_zero() {
        return Err(OperationError::Configuration(format!(
            "polling interval ({:?}) and timeout ({:?}) must be positive",
            interval, timeout
        )));
    }
    let interval_ms = interval.as_millis().max(1);
    let ticks = timeout.as_millis().div_ceil(interval_ms);
    Ok(u64::try_from(ticks).unwrap_or(u64::MAX).saturating_add(1))
}

#[derive(Debug)]
pub struct ConfirmationTracker {
    hash: String,
    found_at: Arc<OnceCell<u64>>,
    head_cache: Arc<HeadCache>,
    confirmations: u32,
    interval: Duration,
    timeout: Duration,
    state: ConfirmationState,
}

impl ConfirmationTracker {
    pub fn new(
        hash: impl Into<String>,
        found_at: Arc<OnceCell<u64>>,
        head_cache: Arc<HeadCache>,
        confirmations: u32,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let state = match found_at.get() {
            Some(level) => ConfirmationState::Found { level: *level },
            None => ConfirmationState::Pending,
        };
        Self {
            hash: hash.into(),
            found_at,
            head_cache,
            confirmations,
            interval,
            timeout,
            state,
        }
    }

    pub fn state(&self) -> ConfirmationState {
        self.state
    }

    /// Advance the state machine with a newly observed head
    pub fn observe(&mut self, head: &Block) -> ConfirmationState {
        if matches!(
            self.state,
            ConfirmationState::Confirmed { .. } | ConfirmationState::TimedOut
        ) {
            return self.state;
        }

        let found = match self.found_at.get() {
            Some(level) => Some(*level),
            None if head.contains_operation(&self.hash) => {
                // Another tracker may have recorded it first; keep theirs
                let level = *self.found_at.get_or_init(|| head.level());
                debug!(hash = %self.hash, level, "Operation found in block");
                Some(level)
            }
            None => None,
        };

        self.state = match found {
            None => ConfirmationState::Pending,
            Some(level) if head.level().saturating_sub(level) >= u64::from(self.confirmations) => {
                ConfirmationState::Confirmed {
                    level,
                    head: head.level(),
                }
            }
            Some(level) => ConfirmationState::Found { level },
        };
        self.state
    }

    /// Poll until confirmed, returning the head level at that point
    #[instrument(skip(self), fields(hash = %self.hash, confirmations = self.confirmations))]
    pub async fn run(mut self) -> OpResult<u64> {
        let budget = tick_budget(self.interval, self.timeout)?;
        let timer = Timer::new();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for tick in 1..=budget {
            ticker.tick().await;
            let head = self.head_cache.get().await?;
            match self.observe(&head) {
                ConfirmationState::Confirmed { level, head } => {
                    metrics().confirmations.inc();
                    timer.observe_duration(&metrics().confirmation_latency);
                    info!(level, head, tick, "Operation confirmed");
                    return Ok(head);
                }
                state => debug!(?state, tick, head = head.level(), "Confirmation poll"),
            }
        }

        self.state = ConfirmationState::TimedOut;
        metrics().confirmation_timeouts.inc();
        warn!(ticks = budget, "Confirmation timed out");
        Err(OperationError::ConfirmationTimeout {
            hash: self.hash,
            ticks: budget,
        })
    }
}
