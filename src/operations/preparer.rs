//! Operation group preparation
//!
//! Turns a list of contents into a group ready for forging:
//! - head header, head metadata, counter and manager key fetched concurrently
//! - source resolved from the signer when the caller gave none
//! - reveal prepended for unrevealed accounts
//! - counters assigned left to right from the on-chain baseline
//! - numeric fields normalized to decimal strings
//! - protocol-generation policy applied (contract sources, legacy fields)

use super::content::{OperationContent, OperationGroup};
use super::errors::{OpResult, OperationError};
use super::params::{reveal_content, DEFAULT_REVEAL_LIMITS};
use crate::address;
use crate::context::Context;
use crate::metrics::{metrics, Timer};
use crate::protocol::Protocol;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Unsigned group plus the last counter assigned to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedOperation {
    pub group: OperationGroup,
    /// Last counter handed out; equals the baseline when no content is
    /// fee-bearing
    pub counter: u64,
    /// Resolved source account, if any content needed one
    pub source: Option<String>,
}

#[instrument(skip_all, fields(contents = contents.len(), source = ?source))]
pub async fn prepare_operation(
    ctx: &Context,
    contents: Vec<OperationContent>,
    source: Option<&str>,
) -> OpResult<PreparedOperation> {
    let timer = Timer::new();
    let needs_counter = contents.iter().any(OperationContent::is_fee_bearing);
    let needs_reveal_check = contents.iter().any(OperationContent::is_source_bearing);
    let missing_source = contents
        .iter()
        .any(|c| c.manager().is_some_and(|m| m.source.is_empty()));

    let source = match source {
        Some(source) => Some(source.to_string()),
        None if needs_reveal_check || missing_source => {
            Some(ctx.signer().public_key_hash().await?)
        }
        None => first_explicit_source(&contents),
    };

    let rpc = ctx.rpc();
    let counter_fetch = async {
        match source.as_deref() {
            Some(s) if needs_counter => rpc.get_contract(s).await.map(|c| c.counter),
            _ => Ok(None),
        }
    };
    let manager_key_fetch = async {
        match source.as_deref() {
            Some(s) if needs_reveal_check => rpc.get_manager_key(s).await.map(Some),
            _ => Ok(None),
        }
    };
    let (header, metadata, counter, manager_key) = tokio::try_join!(
        rpc.get_block_header(),
        rpc.get_block_metadata(),
        counter_fetch,
        manager_key_fetch,
    )?;

    let baseline = match counter {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            OperationError::Internal(format!("node returned non-numeric counter {raw:?}"))
        })?,
        None => 0,
    };

    let mut contents = contents;
    let already_revealing = contents
        .iter()
        .any(|c| matches!(c, OperationContent::Reveal(_)));
    if let (Some(pkh), Some(None)) = (source.as_deref(), &manager_key) {
        if !already_revealing {
            let public_key = ctx.signer().public_key().await?;
            debug!(source = %pkh, "Prepending reveal");
            contents.insert(0, reveal_content(pkh, &public_key, DEFAULT_REVEAL_LIMITS));
        }
    }

    let mut counter = baseline;
    for content in contents.iter_mut() {
        let Some(manager) = content.manager_mut() else {
            continue;
        };
        counter += 1;
        manager.counter = counter.to_string();
        if manager.source.is_empty() {
            if let Some(pkh) = source.as_deref() {
                manager.source = pkh.to_string();
            }
        }
        for field in [
            &mut manager.fee,
            &mut manager.gas_limit,
            &mut manager.storage_limit,
        ] {
            if field.is_empty() {
                *field = "0".to_string();
            }
        }
        normalize_amounts(content);
    }

    let protocol = ctx
        .protocol()
        .cloned()
        .unwrap_or_else(|| Protocol::from_hash(&metadata.next_protocol));
    apply_protocol_policy(&protocol, &mut contents)?;

    metrics().operations_prepared.inc();
    timer.observe_duration(&metrics().prepare_latency);
    debug!(
        branch = %header.hash,
        protocol = %metadata.next_protocol,
        baseline,
        counter,
        "Operation prepared"
    );

    Ok(PreparedOperation {
        group: OperationGroup {
            branch: header.hash,
            contents,
            protocol: metadata.next_protocol,
            signature: None,
        },
        counter,
        source,
    })
}

fn first_explicit_source(contents: &[OperationContent]) -> Option<String> {
    contents
        .iter()
        .filter_map(|c| c.manager())
        .map(|m| m.source.clone())
        .find(|s| !s.is_empty())
}

fn normalize_amounts(content: &mut OperationContent) {
    match content {
        OperationContent::Transaction(tx) if tx.amount.is_empty() => tx.amount = "0".to_string(),
        OperationContent::Origination(orig) if orig.balance.is_empty() => {
            orig.balance = "0".to_string()
        }
        _ => {}
    }
}

/// Reject contract sources and strip legacy origination fields from
/// Babylon on
pub(crate) fn apply_protocol_policy(
    protocol: &Protocol,
    contents: &mut [OperationContent],
) -> OpResult<()> {
    if !protocol.is_babylon_or_later() {
        return Ok(());
    }
    for content in contents.iter_mut() {
        match content {
            OperationContent::Transaction(tx) if address::is_contract(&tx.manager.source) => {
                return Err(OperationError::ContractSourceForbidden {
                    contract: tx.manager.source.clone(),
                    protocol: protocol.hash().to_string(),
                });
            }
            OperationContent::Origination(orig) => {
                orig.manager_pubkey = None;
                orig.spendable = None;
                orig.delegatable = None;
            }
            _ => {}
        }
    }
    Ok(())
}
