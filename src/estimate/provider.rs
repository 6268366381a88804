//! Dry-run estimation
//!
//! Contents are built with the protocol maxima as placeholders, prepared,
//! forged and simulated; nothing is signed or broadcast.

use super::estimate::Estimate;
use crate::context::{Context, ContextHandle};
use crate::operations::content::OperationContent;
use crate::operations::errors::{OpResult, OperationError};
use crate::operations::params::{
    reveal_content, DelegateParams, OperationIntent, OriginateParams, RegisterDelegateParams,
    TransferParams, ESTIMATION_LIMITS,
};
use crate::operations::pipeline::{forge, simulate};
use crate::operations::preparer::prepare_operation;
use crate::observability::LifecycleTrace;
use tracing::{debug, Instrument};

#[derive(Clone)]
pub struct EstimationProvider {
    context: ContextHandle,
}

impl EstimationProvider {
    pub fn new(context: ContextHandle) -> Self {
        Self { context }
    }

    pub async fn transfer(&self, params: &TransferParams) -> OpResult<Estimate> {
        let ctx = self.context.snapshot();
        let content = params.clone().with_limits(ESTIMATION_LIMITS).to_content()?;
        single(&ctx, content, params.source.as_deref(), "estimate_transfer").await
    }

    pub async fn originate(&self, params: &OriginateParams) -> OpResult<Estimate> {
        let ctx = self.context.snapshot();
        let content = params.clone().with_limits(ESTIMATION_LIMITS).to_content()?;
        single(&ctx, content, params.source.as_deref(), "estimate_originate").await
    }

    pub async fn set_delegate(&self, params: &DelegateParams) -> OpResult<Estimate> {
        let ctx = self.context.snapshot();
        let content = params.clone().with_limits(ESTIMATION_LIMITS).to_content()?;
        single(&ctx, content, Some(&params.source), "estimate_set_delegate").await
    }

    pub async fn register_delegate(&self, _params: &RegisterDelegateParams) -> OpResult<Estimate> {
        let ctx = self.context.snapshot();
        let pkh = ctx.signer().public_key_hash().await?;
        let content = RegisterDelegateParams {
            limits: ESTIMATION_LIMITS,
        }
        .to_content(&pkh)?;
        single(&ctx, content, Some(&pkh), "estimate_register_delegate").await
    }

    /// Estimate for an explicit reveal; fails if the key is already revealed
    pub async fn reveal(&self) -> OpResult<Estimate> {
        let ctx = self.context.snapshot();
        let content = unrevealed_reveal(&ctx, ESTIMATION_LIMITS).await?;
        single(&ctx, content, None, "estimate_reveal").await
    }

    /// One estimate per intent, from a single simulation of the whole batch
    pub async fn batch(&self, intents: &[OperationIntent]) -> OpResult<Vec<Estimate>> {
        let ctx = self.context.snapshot();
        estimate_intents(&ctx, intents, None).await
    }
}

async fn single(
    ctx: &Context,
    content: OperationContent,
    source: Option<&str>,
    step: &'static str,
) -> OpResult<Estimate> {
    let trace = LifecycleTrace::new(step, ctx.rpc().url());
    let estimates = estimate_contents(ctx, vec![content], source)
        .instrument(trace.span())
        .await?;
    estimates
        .into_iter()
        .next()
        .ok_or_else(|| OperationError::Internal("simulation returned no contents".to_string()))
}

pub(crate) async fn estimate_intents(
    ctx: &Context,
    intents: &[OperationIntent],
    source: Option<&str>,
) -> OpResult<Vec<Estimate>> {
    let contents = intents
        .iter()
        .map(|intent| {
            let mut intent = intent.clone();
            if intent.limits().is_some() {
                intent.set_limits(ESTIMATION_LIMITS);
            }
            intent.to_content()
        })
        .collect::<OpResult<Vec<_>>>()?;
    let trace = LifecycleTrace::new("estimate_batch", ctx.rpc().url());
    estimate_contents(ctx, contents, source)
        .instrument(trace.span())
        .await
}

/// Prepare, forge and simulate `contents`, returning one estimate per
/// content in submission order (a prepended reveal is not reported)
pub(crate) async fn estimate_contents(
    ctx: &Context,
    contents: Vec<OperationContent>,
    source: Option<&str>,
) -> OpResult<Vec<Estimate>> {
    let explicit_reveal = contents
        .iter()
        .any(|c| matches!(c, OperationContent::Reveal(_)));
    let prepared = prepare_operation(ctx, contents, source).await?;
    let forged = forge(ctx, prepared).await?;
    let response = simulate(ctx, &forged).await?;

    let simulated: Vec<&OperationContent> = response
        .contents
        .iter()
        .filter(|c| explicit_reveal || !matches!(c, OperationContent::Reveal(_)))
        .collect();
    let count = simulated.len().max(1) as u64;
    let op_size = forged.byte_len().div_ceil(count);
    debug!(contents = count, bytes = forged.byte_len(), "Simulation complete");

    Ok(simulated
        .into_iter()
        .map(|content| Estimate::from_simulated(content, op_size))
        .collect())
}

/// Reveal content for the signer, or `AlreadyRevealed`
pub(crate) async fn unrevealed_reveal(
    ctx: &Context,
    limits: crate::operations::params::Limits,
) -> OpResult<OperationContent> {
    let pkh = ctx.signer().public_key_hash().await?;
    if ctx.rpc().get_manager_key(&pkh).await?.is_some() {
        return Err(OperationError::AlreadyRevealed { address: pkh });
    }
    let public_key = ctx.signer().public_key().await?;
    Ok(reveal_content(&pkh, &public_key, limits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::{DELEGATION_GAS_MINIMUM, GAS_BUFFER, ORIGINATION_STORAGE_BASELINE};
    use crate::test_utils::{
        MockRpc, MockSigner, MOCK_BAKER, MOCK_DESTINATION, MOCK_PK, MOCK_PKH,
    };
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::sync::Arc;

    fn provider(rpc: &MockRpc) -> EstimationProvider {
        let ctx = Context::new(Arc::new(rpc.clone())).with_signer(Arc::new(MockSigner::new()));
        EstimationProvider::new(ContextHandle::new(ctx))
    }

    fn revealed_rpc() -> MockRpc {
        let rpc = MockRpc::new();
        rpc.set_counter(MOCK_PKH, 10);
        rpc.set_manager_key(MOCK_PKH, Some(MOCK_PK));
        rpc
    }

    #[tokio::test]
    async fn test_transfer_estimate_from_simulation() {
        let rpc = revealed_rpc();
        rpc.set_simulated_usage(10_207, 0);
        // 8 hex chars = 4 bytes
        rpc.set_forged_bytes("aabbccdd");

        let estimate = provider(&rpc)
            .transfer(&TransferParams::new(MOCK_DESTINATION, Decimal::ONE))
            .await
            .unwrap();

        assert_eq!(estimate.gas_limit(), 10_207 + GAS_BUFFER);
        assert_eq!(estimate.storage_limit(), 0);
        assert_eq!(estimate.op_size(), 4);

        let simulated = &rpc.simulated_requests()[0].operation.contents[0];
        let manager = simulated.manager().unwrap();
        assert_eq!(manager.gas_limit, "800000");
        assert_eq!(manager.storage_limit, "60000");
        assert_eq!(manager.counter, "11");
        assert_eq!(rpc.calls("inject_operation"), 0);
    }

    #[tokio::test]
    async fn test_repeated_transfer_estimates_are_identical() {
        let rpc = revealed_rpc();
        rpc.set_simulated_usage(10_207, 0);
        rpc.set_forged_bytes("aabbccdd");
        let provider = provider(&rpc);
        let params = TransferParams::new(MOCK_DESTINATION, Decimal::ONE);

        let first = provider.transfer(&params).await.unwrap();
        let second = provider.transfer(&params).await.unwrap();

        assert_eq!(first, second);
        let requests = rpc.simulated_requests();
        assert_eq!(requests.len(), 2);
        let counters: Vec<&str> = requests
            .iter()
            .map(|r| r.operation.contents[0].manager().unwrap().counter.as_str())
            .collect();
        assert_eq!(counters, vec!["11", "11"]);
        assert_eq!(rpc.calls("inject_operation"), 0);
    }

    #[tokio::test]
    async fn test_reveal_is_not_reported_for_unrevealed_account() {
        let rpc = MockRpc::new();
        rpc.set_simulated_usage(1_000, 0);

        let estimate = provider(&rpc)
            .transfer(&TransferParams::new(MOCK_DESTINATION, Decimal::ONE))
            .await
            .unwrap();

        let contents = &rpc.simulated_requests()[0].operation.contents;
        assert_eq!(contents.len(), 2);
        assert_eq!(estimate.gas_limit(), 1_100);
    }

    #[tokio::test]
    async fn test_delegation_gas_floor() {
        let rpc = revealed_rpc();
        let estimate = provider(&rpc)
            .set_delegate(&DelegateParams::new(MOCK_PKH, Some(MOCK_BAKER.to_string())))
            .await
            .unwrap();
        assert_eq!(estimate.gas_limit(), DELEGATION_GAS_MINIMUM + GAS_BUFFER);
    }

    #[tokio::test]
    async fn test_origination_storage_baseline() {
        let rpc = revealed_rpc();
        rpc.set_simulated_usage(15_000, 80);
        let estimate = provider(&rpc)
            .originate(&OriginateParams::new(json!([]), json!({ "int": "0" })))
            .await
            .unwrap();
        assert_eq!(estimate.storage_limit(), 80 + ORIGINATION_STORAGE_BASELINE);
        assert_eq!(
            estimate.burn_fee_mutez(),
            (80 + ORIGINATION_STORAGE_BASELINE) * 1000
        );
    }

    #[tokio::test]
    async fn test_failed_simulation_is_reported() {
        let rpc = revealed_rpc();
        rpc.set_run_operation_response(
            serde_json::from_value(json!({
                "contents": [{
                    "kind": "transaction", "source": MOCK_PKH, "destination": MOCK_DESTINATION,
                    "metadata": { "operation_result": {
                        "status": "failed",
                        "errors": [{ "id": "proto.006-PsCARTHA.contract.balance_too_low" }]
                    } }
                }]
            }))
            .unwrap(),
        );

        let err = provider(&rpc)
            .transfer(&TransferParams::new(MOCK_DESTINATION, Decimal::ONE))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Simulation { ref errors } if errors.len() == 1));
    }

    #[tokio::test]
    async fn test_reveal_estimate_requires_unrevealed_key() {
        let rpc = revealed_rpc();
        let err = provider(&rpc).reveal().await.unwrap_err();
        assert!(matches!(err, OperationError::AlreadyRevealed { .. }));

        rpc.set_manager_key(MOCK_PKH, None);
        rpc.set_simulated_usage(1_000, 0);
        let estimate = provider(&rpc).reveal().await.unwrap();
        assert_eq!(estimate.gas_limit(), 1_100);
    }

    #[tokio::test]
    async fn test_batch_shares_bytes_across_contents() {
        let rpc = revealed_rpc();
        rpc.set_forged_bytes(&"ab".repeat(300));
        let intents = vec![
            OperationIntent::Transfer(TransferParams::new(MOCK_DESTINATION, Decimal::ONE)),
            OperationIntent::Delegate(DelegateParams::new(MOCK_PKH, Some(MOCK_BAKER.into()))),
        ];

        let estimates = provider(&rpc).batch(&intents).await.unwrap();
        assert_eq!(estimates.len(), 2);
        assert_eq!(estimates[0].op_size(), 150);
        assert_eq!(estimates[1].gas_limit(), DELEGATION_GAS_MINIMUM + GAS_BUFFER);

        let counters: Vec<String> = rpc.simulated_requests()[0]
            .operation
            .contents
            .iter()
            .map(|c| c.manager().unwrap().counter.clone())
            .collect();
        assert_eq!(counters, vec!["11", "12"]);
    }
}
