//! High-level operation submission
//!
//! Each call takes a context snapshot, estimates whatever limits the caller
//! left unset, then runs prepare → forge → sign → preapply → inject and
//! hands back an [`Operation`].

use super::batch::OperationBatch;
use super::errors::{OpResult, OperationError};
use super::operation::Operation;
use super::params::{
    ActivationParams, DelegateParams, Limits, OperationIntent, OriginateParams,
    RegisterDelegateParams, RevealParams, TransferParams, ESTIMATION_LIMITS,
};
use super::pipeline::{forge, sign_and_inject};
use super::preparer::prepare_operation;
use crate::context::{Context, ContextHandle};
use crate::estimate::provider::{estimate_contents, estimate_intents, unrevealed_reveal};
use crate::metrics::metrics;
use crate::observability::LifecycleTrace;
use crate::operations::content::OperationContent;
use std::future::Future;
use tracing::{debug, Instrument};

#[derive(Clone)]
pub struct OperationProvider {
    context: ContextHandle,
}

impl OperationProvider {
    pub fn new(context: ContextHandle) -> Self {
        Self { context }
    }

    pub async fn transfer(&self, params: TransferParams) -> OpResult<Operation> {
        let source = params.source.clone();
        self.traced("transfer", |ctx| async move {
            send_intents(&ctx, vec![OperationIntent::Transfer(params)], source.as_deref()).await
        })
        .await
    }

    pub async fn originate(&self, params: OriginateParams) -> OpResult<Operation> {
        let source = params.source.clone();
        self.traced("originate", |ctx| async move {
            send_intents(&ctx, vec![OperationIntent::Originate(params)], source.as_deref()).await
        })
        .await
    }

    pub async fn set_delegate(&self, params: DelegateParams) -> OpResult<Operation> {
        let source = params.source.clone();
        self.traced("set_delegate", |ctx| async move {
            send_intents(&ctx, vec![OperationIntent::Delegate(params)], Some(&source)).await
        })
        .await
    }

    /// Delegate the signer's account to itself
    pub async fn register_delegate(&self, params: RegisterDelegateParams) -> OpResult<Operation> {
        self.traced("register_delegate", |ctx| async move {
            let pkh = ctx.signer().public_key_hash().await?;
            let intent = OperationIntent::Delegate(
                DelegateParams::new(&pkh, Some(pkh.clone())).with_limits(params.limits),
            );
            send_intents(&ctx, vec![intent], Some(&pkh)).await
        })
        .await
    }

    /// Activation carries no fee, so nothing is estimated
    pub async fn activate(&self, params: ActivationParams) -> OpResult<Operation> {
        self.traced("activate", |ctx| async move {
            send_intents(&ctx, vec![OperationIntent::Activate(params)], None).await
        })
        .await
    }

    /// Reveal the signer's public key on its own
    ///
    /// Fails with [`OperationError::AlreadyRevealed`] when the key is already
    /// on chain.
    pub async fn reveal(&self, params: RevealParams) -> OpResult<Operation> {
        self.traced("reveal", |ctx| async move {
            let mut limits = params.limits;
            if !limits.is_complete() {
                let reveal = unrevealed_reveal(&ctx, ESTIMATION_LIMITS).await?;
                let estimate = estimate_contents(&ctx, vec![reveal], None)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        OperationError::Internal("simulation returned no contents".to_string())
                    })?;
                limits = limits.with_estimate(&estimate);
            }
            let content = unrevealed_reveal(&ctx, limits).await?;
            submit(&ctx, vec![content], None).await
        })
        .await
    }

    /// Empty batch bound to this provider's context
    pub fn batch(&self) -> OperationBatch {
        OperationBatch::new(self.context.clone())
    }

    async fn traced<F, Fut>(&self, step: &'static str, call: F) -> OpResult<Operation>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = OpResult<Operation>>,
    {
        let ctx = self.context.snapshot();
        let span = LifecycleTrace::new(step, ctx.rpc().url()).span();
        call(ctx)
            .instrument(span.clone())
            .await
            .inspect(|op| LifecycleTrace::record_hash(&span, op.hash()))
            .inspect_err(|e| metrics().record_error(e.category()))
    }
}

/// Fill unset limits from one simulation of all `intents`, then submit
/// them as a single group
pub(crate) async fn send_intents(
    ctx: &Context,
    mut intents: Vec<OperationIntent>,
    source: Option<&str>,
) -> OpResult<Operation> {
    let incomplete = intents
        .iter()
        .any(|i| i.limits().is_some_and(|l| !l.is_complete()));
    if incomplete {
        let estimates = estimate_intents(ctx, &intents, source).await?;
        if estimates.len() != intents.len() {
            return Err(OperationError::Internal(format!(
                "simulation returned {} results for {} contents",
                estimates.len(),
                intents.len()
            )));
        }
        for (intent, estimate) in intents.iter_mut().zip(&estimates) {
            if let Some(limits) = intent.limits() {
                let filled: Limits = limits.with_estimate(estimate);
                intent.set_limits(filled);
            }
        }
        debug!(contents = intents.len(), "Limits filled from simulation");
    }

    let contents = intents
        .iter()
        .map(OperationIntent::to_content)
        .collect::<OpResult<Vec<_>>>()?;
    submit(ctx, contents, source).await
}

async fn submit(
    ctx: &Context,
    contents: Vec<OperationContent>,
    source: Option<&str>,
) -> OpResult<Operation> {
    let prepared = prepare_operation(ctx, contents, source).await?;
    let forged = forge(ctx, prepared).await?;
    let injected = sign_and_inject(ctx, forged).await?;
    Ok(Operation::new(injected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::content::OperationKind;
    use crate::test_utils::{
        MockRpc, MockSigner, MOCK_BAKER, MOCK_DESTINATION, MOCK_PK, MOCK_PKH,
    };
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn provider(rpc: &MockRpc) -> OperationProvider {
        let ctx = Context::new(Arc::new(rpc.clone())).with_signer(Arc::new(MockSigner::new()));
        OperationProvider::new(ContextHandle::new(ctx))
    }

    fn revealed_rpc() -> MockRpc {
        let rpc = MockRpc::new();
        rpc.set_counter(MOCK_PKH, 41);
        rpc.set_manager_key(MOCK_PKH, Some(MOCK_PK));
        rpc
    }

    fn preapplied_manager(rpc: &MockRpc, index: usize) -> crate::operations::content::ManagerFields {
        rpc.preapplied_groups()[0][0].contents[index]
            .manager()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_transfer_fills_limits_from_estimate() {
        let rpc = revealed_rpc();
        rpc.set_simulated_usage(10_207, 0);
        rpc.set_injected_hash("ooTransfer");

        let op = provider(&rpc)
            .transfer(TransferParams::new(MOCK_DESTINATION, Decimal::TWO))
            .await
            .unwrap();

        assert_eq!(op.hash(), "ooTransfer");
        assert_eq!(op.kind(), Some(OperationKind::Transaction));
        // 8 forged bytes: ceil(10307 * 0.1 + 8 + 200)
        let manager = preapplied_manager(&rpc, 0);
        assert_eq!(manager.fee, "1239");
        assert_eq!(manager.gas_limit, "10307");
        assert_eq!(manager.storage_limit, "0");
        assert_eq!(manager.counter, "42");
        assert_eq!(rpc.calls("run_operation"), 1);
    }

    #[tokio::test]
    async fn test_explicit_limits_skip_simulation() {
        let rpc = revealed_rpc();
        provider(&rpc)
            .transfer(
                TransferParams::new(MOCK_DESTINATION, Decimal::ONE)
                    .with_limits(Limits::new(2_000, 12_000, 10)),
            )
            .await
            .unwrap();

        assert_eq!(rpc.calls("run_operation"), 0);
        let manager = preapplied_manager(&rpc, 0);
        assert_eq!(manager.fee, "2000");
        assert_eq!(manager.gas_limit, "12000");
        assert_eq!(manager.storage_limit, "10");
    }

    #[tokio::test]
    async fn test_partial_limits_keep_caller_values() {
        let rpc = revealed_rpc();
        rpc.set_simulated_usage(5_000, 0);
        provider(&rpc)
            .transfer(TransferParams::new(MOCK_DESTINATION, Decimal::ONE).with_limits(Limits {
                fee: Some(9_999),
                gas_limit: None,
                storage_limit: None,
            }))
            .await
            .unwrap();

        let manager = preapplied_manager(&rpc, 0);
        assert_eq!(manager.fee, "9999");
        assert_eq!(manager.gas_limit, "5100");
    }

    #[tokio::test]
    async fn test_register_delegate_uses_signer_account() {
        let rpc = revealed_rpc();
        let op = provider(&rpc)
            .register_delegate(RegisterDelegateParams::default())
            .await
            .unwrap();

        match op.view() {
            crate::operations::operation::OperationView::Delegation(view) => {
                assert!(view.is_registration())
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_delegate_for_unrevealed_account_prepends_reveal() {
        let rpc = MockRpc::new();
        provider(&rpc)
            .set_delegate(DelegateParams::new(MOCK_PKH, Some(MOCK_BAKER.to_string())))
            .await
            .unwrap();

        let group = &rpc.preapplied_groups()[0][0];
        assert_eq!(group.contents.len(), 2);
        assert!(matches!(group.contents[0], OperationContent::Reveal(_)));
        assert_eq!(preapplied_manager(&rpc, 1).counter, "2");
    }

    #[tokio::test]
    async fn test_activation_is_not_estimated() {
        let rpc = MockRpc::new();
        provider(&rpc)
            .activate(ActivationParams::new(MOCK_DESTINATION, "41f98b15efc63fa893d61d7d6eee4a2ce9427ac4"))
            .await
            .unwrap();

        assert_eq!(rpc.calls("run_operation"), 0);
        assert_eq!(rpc.calls("get_contract"), 0);
        assert_eq!(rpc.injected_bytes().len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_reveal() {
        let rpc = MockRpc::new();
        rpc.set_counter(MOCK_PKH, 5);
        let op = provider(&rpc).reveal(RevealParams::default()).await.unwrap();

        assert_eq!(op.kind(), Some(OperationKind::Reveal));
        let group = &rpc.preapplied_groups()[0][0];
        assert_eq!(group.contents.len(), 1);
        assert_eq!(preapplied_manager(&rpc, 0).counter, "6");

        rpc.set_manager_key(MOCK_PKH, Some(MOCK_PK));
        let err = provider(&rpc).reveal(RevealParams::default()).await.unwrap_err();
        assert!(matches!(err, OperationError::AlreadyRevealed { .. }));
        assert_eq!(rpc.injected_bytes().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_counted_by_category() {
        let rpc = revealed_rpc();
        rpc.set_preapply_response(serde_json::json!({ "unexpected": true }));

        let err = provider(&rpc)
            .transfer(
                TransferParams::new(MOCK_DESTINATION, Decimal::ONE)
                    .with_limits(Limits::new(1_000, 10_000, 0)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::UnexpectedPreapplyResponse(_)));
        assert!(metrics().gather_text().contains("operation_errors_total"));
    }
}
