//! Several manager operations submitted as one group
//!
//! Intents keep their insertion order; counters increase across the whole
//! batch and a single reveal is prepended when needed.

use super::errors::{OpResult, OperationError};
use super::operation::Operation;
use super::params::{
    ActivationParams, DelegateParams, OperationIntent, OriginateParams, TransferParams,
};
use super::provider::send_intents;
use crate::context::ContextHandle;
use crate::estimate::provider::estimate_intents;
use crate::estimate::Estimate;
use crate::metrics::metrics;
use crate::observability::LifecycleTrace;
use tracing::Instrument;

#[derive(Clone)]
pub struct OperationBatch {
    context: ContextHandle,
    intents: Vec<OperationIntent>,
}

impl std::fmt::Debug for OperationBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationBatch")
            .field("intents", &self.intents)
            .finish_non_exhaustive()
    }
}

impl OperationBatch {
    pub fn new(context: ContextHandle) -> Self {
        Self {
            context,
            intents: Vec::new(),
        }
    }

    pub fn with(mut self, intent: OperationIntent) -> Self {
        self.intents.push(intent);
        self
    }

    pub fn with_transfer(self, params: TransferParams) -> Self {
        self.with(OperationIntent::Transfer(params))
    }

    pub fn with_origination(self, params: OriginateParams) -> Self {
        self.with(OperationIntent::Originate(params))
    }

    pub fn with_delegation(self, params: DelegateParams) -> Self {
        self.with(OperationIntent::Delegate(params))
    }

    pub fn with_activation(self, params: ActivationParams) -> Self {
        self.with(OperationIntent::Activate(params))
    }

    pub fn intents(&self) -> &[OperationIntent] {
        &self.intents
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// One estimate per intent, in insertion order
    pub async fn estimate(&self) -> OpResult<Vec<Estimate>> {
        self.ensure_not_empty()?;
        let ctx = self.context.snapshot();
        estimate_intents(&ctx, &self.intents, None).await
    }

    pub async fn send(self) -> OpResult<Operation> {
        self.ensure_not_empty()?;
        let ctx = self.context.snapshot();
        let span = LifecycleTrace::new("batch", ctx.rpc().url()).span();
        send_intents(&ctx, self.intents, None)
            .instrument(span.clone())
            .await
            .inspect(|op| LifecycleTrace::record_hash(&span, op.hash()))
            .inspect_err(|e| metrics().record_error(e.category()))
    }

    fn ensure_not_empty(&self) -> OpResult<()> {
        if self.intents.is_empty() {
            return Err(OperationError::Configuration(
                "batch contains no operations".to_string(),
            ));
        }
        Ok(())
    }
}
