//! Forge, sign, preapply, inject and simulate
//!
//! Preapply always runs before injection: a group the node already rejects
//! is never broadcast.

use super::content::{OperationContent, OperationGroup, OperationStatus};
use super::errors::{OpResult, OperationError};
use super::preparer::PreparedOperation;
use crate::context::Context;
use crate::metrics::{metrics, Timer};
use crate::protocol::Protocol;
use crate::rpc::{ForgeParams, PreapplyResponse, RunOperationOperation, RunOperationRequest};
use crate::signer::Watermark;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// Well-formed signature that never verifies, used for dry runs
pub const SIMULATION_SIGNATURE: &str =
    "edsigtkpiSSschcaCt9pUVrpNPf7TTcgvgDEDD6NCEHMy8NNQJCGnMfLZzYoQj74yLjo9wx6MPVV29CvVzgi7qEcEUok3k7AuMg";

/// Forged bytes together with the group they encode
#[derive(Debug, Clone, PartialEq)]
pub struct ForgedBytes {
    /// Hex; signed bytes once the group carries a signature
    pub opbytes: String,
    pub group: OperationGroup,
    pub counter: u64,
}

impl ForgedBytes {
    /// Forged size in bytes
    pub fn byte_len(&self) -> u64 {
        (self.opbytes.len() / 2) as u64
    }
}

/// Result of a successful injection
#[derive(Debug, Clone)]
pub struct InjectedOperation {
    pub hash: String,
    pub forged: ForgedBytes,
    /// Contents as returned by preapply, with their metadata
    pub results: Vec<OperationContent>,
    pub context: Context,
}

#[instrument(skip_all, fields(branch = %prepared.group.branch))]
pub async fn forge(ctx: &Context, prepared: PreparedOperation) -> OpResult<ForgedBytes> {
    let params = ForgeParams {
        branch: prepared.group.branch.clone(),
        contents: prepared.group.contents.clone(),
    };
    let opbytes = ctx.forger().forge(&params).await?;
    debug!(bytes = opbytes.len() / 2, "Operation forged");
    Ok(ForgedBytes {
        opbytes,
        group: prepared.group,
        counter: prepared.counter,
    })
}

/// Sign under the generic-operation watermark, then [`inject`]
pub async fn sign_and_inject(ctx: &Context, forged: ForgedBytes) -> OpResult<InjectedOperation> {
    let signed = ctx
        .signer()
        .sign(&forged.opbytes, Watermark::GenericOperation)
        .await?;
    let mut group = forged.group;
    group.signature = Some(signed.prefix_sig);
    inject(
        ctx,
        ForgedBytes {
            opbytes: signed.sbytes,
            group,
            counter: forged.counter,
        },
    )
    .await
}

/// Preapply the signed group and broadcast it if every content applies
#[instrument(skip_all, fields(contents = signed.group.contents.len()))]
pub async fn inject(ctx: &Context, signed: ForgedBytes) -> OpResult<InjectedOperation> {
    let timer = Timer::new();
    let raw = ctx
        .rpc()
        .preapply_operations(std::slice::from_ref(&signed.group))
        .await?;
    let responses = decode_preapply(raw)?;

    let errors: Vec<Value> = responses
        .iter()
        .flat_map(|r| r.contents.iter())
        .flat_map(failed_errors)
        .collect();
    if !errors.is_empty() {
        metrics().preapply_failures.inc();
        warn!(errors = errors.len(), "Preapply rejected operation");
        return Err(OperationError::Preapply { errors });
    }

    let hash = ctx
        .injector()
        .inject(&signed.opbytes)
        .await
        .map_err(|e| OperationError::Injection(e.to_string()))?;

    metrics().operations_injected.inc();
    timer.observe_duration(&metrics().inject_latency);
    info!(hash = %hash, "Operation injected");

    Ok(InjectedOperation {
        hash,
        results: responses.into_iter().flat_map(|r| r.contents).collect(),
        forged: signed,
        context: ctx.clone(),
    })
}

/// Dry-run the forged group with a stub signature
#[instrument(skip_all, fields(contents = forged.group.contents.len()))]
pub async fn simulate(ctx: &Context, forged: &ForgedBytes) -> OpResult<PreapplyResponse> {
    let protocol = ctx
        .protocol()
        .cloned()
        .unwrap_or_else(|| Protocol::from_hash(&forged.group.protocol));
    let chain_id = if protocol.simulation_requires_chain_id() {
        Some(ctx.rpc().get_chain_id().await?)
    } else {
        None
    };

    let request = RunOperationRequest {
        operation: RunOperationOperation {
            branch: forged.group.branch.clone(),
            contents: forged.group.contents.clone(),
            signature: SIMULATION_SIGNATURE.to_string(),
        },
        chain_id,
    };
    let response = ctx.rpc().run_operation(&request).await?;
    metrics().simulations.inc();

    let errors: Vec<Value> = response.contents.iter().flat_map(failed_errors).collect();
    if !errors.is_empty() {
        warn!(errors = errors.len(), "Simulation reported failures");
        return Err(OperationError::Simulation { errors });
    }
    Ok(response)
}

fn decode_preapply(raw: Value) -> OpResult<Vec<PreapplyResponse>> {
    if !raw.is_array() {
        return Err(OperationError::UnexpectedPreapplyResponse(format!(
            "expected an array of groups, got {}",
            truncate(&raw.to_string())
        )));
    }
    serde_json::from_value(raw)
        .map_err(|e| OperationError::UnexpectedPreapplyResponse(e.to_string()))
}

/// `errors` of the content's result and of its internal results, for every
/// one that failed
fn failed_errors(content: &OperationContent) -> Vec<Value> {
    let Some(metadata) = content.metadata() else {
        return Vec::new();
    };
    metadata
        .operation_result
        .iter()
        .chain(metadata.internal_operation_results.iter().map(|i| &i.result))
        .filter(|r| r.status == OperationStatus::Failed)
        .flat_map(|r| r.errors.iter().cloned())
        .collect()
}

fn truncate(s: &str) -> String {
    const MAX: usize = 200;
    if s.len() <= MAX {
        s.to_string()
    } else {
        let cut = (0..=MAX).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &s[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::preparer::prepare_operation;
    use crate::operations::params::{Limits, TransferParams};
    use crate::test_utils::{
        MockForger, MockRpc, MockSigner, MOCK_DESTINATION, MOCK_PK, MOCK_PKH,
        MOCK_SIGNATURE_HEX,
    };
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (MockRpc, MockSigner, Context) {
        let rpc = MockRpc::new();
        rpc.set_counter(MOCK_PKH, 1);
        rpc.set_manager_key(MOCK_PKH, Some(MOCK_PK));
        let signer = MockSigner::new();
        let ctx = Context::new(Arc::new(rpc.clone())).with_signer(Arc::new(signer.clone()));
        (rpc, signer, ctx)
    }

    async fn forged(ctx: &Context) -> ForgedBytes {
        let content = TransferParams::new(MOCK_DESTINATION, Decimal::ONE)
            .with_limits(Limits::new(1_420, 10_300, 0))
            .to_content()
            .unwrap();
        let prepared = prepare_operation(ctx, vec![content], None).await.unwrap();
        forge(ctx, prepared).await.unwrap()
    }

    #[tokio::test]
    async fn test_sign_and_inject_happy_path() {
        let (rpc, signer, ctx) = setup();
        rpc.set_injected_hash("ooHappy");

        let forged = forged(&ctx).await;
        let injected = sign_and_inject(&ctx, forged.clone()).await.unwrap();

        assert_eq!(injected.hash, "ooHappy");
        assert_eq!(
            injected.forged.opbytes,
            format!("{}{}", forged.opbytes, MOCK_SIGNATURE_HEX)
        );
        assert_eq!(
            injected.forged.group.signature.as_deref(),
            Some("edsigMockSignature")
        );
        assert_eq!(signer.watermarks(), vec![Watermark::GenericOperation]);
        assert_eq!(rpc.injected_bytes(), vec![injected.forged.opbytes.clone()]);
        assert_eq!(injected.results.len(), 1);

        let preapplied = rpc.preapplied_groups();
        assert_eq!(preapplied.len(), 1);
        assert_eq!(
            preapplied[0][0].signature.as_deref(),
            Some("edsigMockSignature")
        );
    }

    #[tokio::test]
    async fn test_failed_preapply_aggregates_and_never_injects() {
        let (rpc, _signer, ctx) = setup();
        rpc.set_preapply_response(json!([{
            "contents": [
                {
                    "kind": "transaction", "source": MOCK_PKH, "destination": MOCK_DESTINATION,
                    "amount": "1000000",
                    "metadata": { "operation_result": {
                        "status": "failed",
                        "errors": [{ "id": "proto.006-PsCARTHA.contract.balance_too_low" }]
                    } }
                },
                {
                    "kind": "transaction", "source": MOCK_PKH, "destination": MOCK_DESTINATION,
                    "amount": "1",
                    "metadata": { "operation_result": {
                        "status": "backtracked"
                    }, "internal_operation_results": [{
                        "kind": "transaction", "source": MOCK_DESTINATION,
                        "result": { "status": "failed", "errors": [{ "id": "script_rejected" }, { "id": "trace" }] }
                    }] }
                }
            ]
        }]));

        let err = sign_and_inject(&ctx, forged(&ctx).await).await.unwrap_err();
        match err {
            OperationError::Preapply { errors } => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(rpc.injected_bytes().is_empty());
        assert_eq!(rpc.calls("inject_operation"), 0);
    }

    #[tokio::test]
    async fn test_non_array_preapply_is_fatal() {
        let (rpc, _signer, ctx) = setup();
        rpc.set_preapply_response(json!({ "kind": "temporary", "id": "failure" }));

        let err = sign_and_inject(&ctx, forged(&ctx).await).await.unwrap_err();
        assert!(matches!(err, OperationError::UnexpectedPreapplyResponse(_)));
        assert_eq!(rpc.calls("inject_operation"), 0);
    }

    #[tokio::test]
    async fn test_custom_forger_is_used() {
        let (rpc, _signer, ctx) = setup();
        let ctx = ctx.with_forger(Arc::new(MockForger));

        let forged = forged(&ctx).await;
        assert_eq!(rpc.calls("forge_operations"), 0);
        let decoded = hex::decode(&forged.opbytes).unwrap();
        let params: ForgeParams = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(params.branch, forged.group.branch);
    }

    #[tokio::test]
    async fn test_simulation_attaches_chain_id_from_carthage() {
        let (rpc, _signer, ctx) = setup();
        let forged = forged(&ctx).await;

        simulate(&ctx, &forged).await.unwrap();
        let request = &rpc.simulated_requests()[0];
        assert_eq!(request.chain_id.as_deref(), Some(crate::test_utils::MOCK_CHAIN_ID));
        assert_eq!(request.operation.signature, SIMULATION_SIGNATURE);

        let babylon = ctx.clone().with_protocol(Some(Protocol::PsBabyM1));
        simulate(&babylon, &forged).await.unwrap();
        assert_eq!(rpc.simulated_requests()[1].chain_id, None);
    }

    #[test]
    fn test_truncate_long_bodies() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long).len(), 203);
        assert_eq!(truncate("short"), "short");
    }
}
