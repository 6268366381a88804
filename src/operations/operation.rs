//! Handle over an injected operation
//!
//! One struct for every kind; [`Operation::view`] gives kind-specific
//! accessors over the preapply results of the dominant content.

use super::confirmation::ConfirmationTracker;
use super::content::{
    Delegation, OperationContent, OperationKind, OperationResult, OperationStatus, Origination,
    Transaction,
};
use super::errors::OpResult;
use super::pipeline::{ForgedBytes, InjectedOperation};
use crate::context::Context;
use crate::estimate::consumed;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Operation {
    hash: String,
    raw: Option<ForgedBytes>,
    results: Vec<OperationContent>,
    context: Context,
    found_at: Arc<OnceCell<u64>>,
}

impl Operation {
    pub fn new(injected: InjectedOperation) -> Self {
        Self {
            hash: injected.hash,
            raw: Some(injected.forged),
            results: injected.results,
            context: injected.context,
            found_at: Arc::new(OnceCell::new()),
        }
    }

    /// Handle for an operation injected elsewhere; only confirmation
    /// tracking is meaningful
    pub fn from_hash(hash: impl Into<String>, context: Context) -> Self {
        Self {
            hash: hash.into(),
            raw: None,
            results: Vec::new(),
            context,
            found_at: Arc::new(OnceCell::new()),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Signed bytes and the group they encode
    pub fn raw(&self) -> Option<&ForgedBytes> {
        self.raw.as_ref()
    }

    /// Every content as returned by preapply, reveal included
    pub fn results(&self) -> &[OperationContent] {
        &self.results
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Level of the block that included the operation, once observed
    pub fn included_in_level(&self) -> Option<u64> {
        self.found_at.get().copied()
    }

    /// First non-reveal content
    fn dominant(&self) -> Option<&OperationContent> {
        self.results
            .iter()
            .find(|c| !matches!(c, OperationContent::Reveal(_)))
            .or_else(|| self.results.first())
    }

    pub fn kind(&self) -> Option<OperationKind> {
        self.dominant().and_then(OperationContent::kind)
    }

    pub fn view(&self) -> OperationView<'_> {
        match self.dominant() {
            Some(OperationContent::Transaction(tx)) => OperationView::Transaction(TransactionView(tx)),
            Some(OperationContent::Origination(o)) => OperationView::Origination(OriginationView(o)),
            Some(OperationContent::Delegation(d)) => OperationView::Delegation(DelegationView(d)),
            other => OperationView::Other(other),
        }
    }

    pub fn status(&self) -> Option<OperationStatus> {
        self.dominant()
            .and_then(OperationContent::operation_result)
            .map(|r| r.status)
    }

    /// Gas and paid storage summed over every content and internal result
    pub fn consumed(&self) -> (u64, u64) {
        self.results
            .iter()
            .map(consumed)
            .fold((0, 0), |(g, s), (cg, cs)| (g + cg, s + cs))
    }

    /// Wait for `confirmations` blocks on top of the including block
    ///
    /// Unset arguments fall back to the context's polling configuration.
    /// Resolves with the head level at which the depth was reached.
    pub async fn confirmation(
        &self,
        confirmations: Option<u32>,
        interval: Option<Duration>,
        timeout: Option<Duration>,
    ) -> OpResult<u64> {
        let config = self.context.config();
        ConfirmationTracker::new(
            self.hash.clone(),
            Arc::clone(&self.found_at),
            Arc::clone(self.context.head_cache()),
            confirmations.unwrap_or(config.default_confirmations),
            interval.unwrap_or(config.confirmation_polling_interval),
            timeout.unwrap_or(config.confirmation_polling_timeout),
        )
        .run()
        .await
    }
}

/// Kind-specific view over the dominant content
#[derive(Debug, Clone, Copy)]
pub enum OperationView<'a> {
    Transaction(TransactionView<'a>),
    Origination(OriginationView<'a>),
    Delegation(DelegationView<'a>),
    Other(Option<&'a OperationContent>),
}

fn result_of(metadata: Option<&super::content::OperationMetadata>) -> Option<&OperationResult> {
    metadata.and_then(|m| m.operation_result.as_ref())
}

#[derive(Debug, Clone, Copy)]
pub struct TransactionView<'a>(&'a Transaction);

impl<'a> TransactionView<'a> {
    pub fn destination(&self) -> &'a str {
        &self.0.destination
    }

    /// Mutez
    pub fn amount(&self) -> &'a str {
        &self.0.amount
    }

    pub fn status(&self) -> Option<OperationStatus> {
        result_of(self.0.metadata.as_ref()).map(|r| r.status)
    }

    pub fn consumed_gas(&self) -> u64 {
        result_of(self.0.metadata.as_ref()).map_or(0, OperationResult::consumed_gas)
    }

    pub fn storage_diff(&self) -> u64 {
        result_of(self.0.metadata.as_ref()).map_or(0, OperationResult::paid_storage_size_diff)
    }

    pub fn storage_size(&self) -> Option<&'a str> {
        result_of(self.0.metadata.as_ref()).and_then(|r| r.storage_size.as_deref())
    }

    pub fn errors(&self) -> &'a [Value] {
        result_of(self.0.metadata.as_ref())
            .map(|r| r.errors.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OriginationView<'a>(&'a Origination);

impl<'a> OriginationView<'a> {
    /// Address of the newly originated contract
    pub fn contract_address(&self) -> Option<&'a str> {
        result_of(self.0.metadata.as_ref())
            .and_then(|r| r.originated_contracts.first())
            .map(String::as_str)
    }

    pub fn status(&self) -> Option<OperationStatus> {
        result_of(self.0.metadata.as_ref()).map(|r| r.status)
    }

    pub fn consumed_gas(&self) -> u64 {
        result_of(self.0.metadata.as_ref()).map_or(0, OperationResult::consumed_gas)
    }

    pub fn storage_diff(&self) -> u64 {
        result_of(self.0.metadata.as_ref()).map_or(0, OperationResult::paid_storage_size_diff)
    }

    pub fn storage_size(&self) -> Option<&'a str> {
        result_of(self.0.metadata.as_ref()).and_then(|r| r.storage_size.as_deref())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DelegationView<'a>(&'a Delegation);

impl<'a> DelegationView<'a> {
    pub fn delegate(&self) -> Option<&'a str> {
        self.0.delegate.as_deref()
    }

    /// Self-delegation registers the source as a baker
    pub fn is_registration(&self) -> bool {
        self.0.delegate.as_deref() == Some(self.0.manager.source.as_str())
    }

    pub fn status(&self) -> Option<OperationStatus> {
        result_of(self.0.metadata.as_ref()).map(|r| r.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::content::OperationGroup;
    use crate::test_utils::{block_at, MockRpc, MOCK_BRANCH, MOCK_CONTRACT, MOCK_PKH};
    use serde_json::json;

    fn injected(results: Value, rpc: &MockRpc) -> InjectedOperation {
        InjectedOperation {
            hash: "ooHandle".into(),
            forged: ForgedBytes {
                opbytes: "00".into(),
                group: OperationGroup {
                    branch: MOCK_BRANCH.into(),
                    contents: Vec::new(),
                    protocol: String::new(),
                    signature: None,
                },
                counter: 1,
            },
            results: serde_json::from_value(results).unwrap(),
            context: Context::new(Arc::new(rpc.clone())),
        }
    }

    #[test]
    fn test_origination_view_skips_reveal() {
        let rpc = MockRpc::new();
        let op = Operation::new(injected(
            json!([
                { "kind": "reveal", "source": MOCK_PKH, "public_key": "edpk",
                  "metadata": { "operation_result": { "status": "applied", "consumed_gas": "1000" } } },
                { "kind": "origination", "source": MOCK_PKH, "balance": "0",
                  "metadata": { "operation_result": {
                      "status": "applied", "consumed_gas": "12000",
                      "paid_storage_size_diff": "70", "storage_size": "70",
                      "originated_contracts": [MOCK_CONTRACT]
                  } } }
            ]),
            &rpc,
        ));

        assert_eq!(op.kind(), Some(OperationKind::Origination));
        assert_eq!(op.status(), Some(OperationStatus::Applied));
        assert_eq!(op.consumed(), (13_000, 70));
        match op.view() {
            OperationView::Origination(view) => {
                assert_eq!(view.contract_address(), Some(MOCK_CONTRACT));
                assert_eq!(view.consumed_gas(), 12_000);
                assert_eq!(view.storage_diff(), 70);
                assert_eq!(view.storage_size(), Some("70"));
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[test]
    fn test_delegation_view_detects_registration() {
        let rpc = MockRpc::new();
        let op = Operation::new(injected(
            json!([{ "kind": "delegation", "source": MOCK_PKH, "delegate": MOCK_PKH,
                     "metadata": { "operation_result": { "status": "applied" } } }]),
            &rpc,
        ));
        match op.view() {
            OperationView::Delegation(view) => {
                assert!(view.is_registration());
                assert_eq!(view.delegate(), Some(MOCK_PKH));
            }
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_confirmations_share_inclusion_level() {
        let rpc = MockRpc::new();
        rpc.push_block(block_at(10, &["ooHandle"]));
        rpc.push_block(block_at(11, &[]));
        rpc.push_block(block_at(12, &[]));
        let op = Operation::new(injected(json!([]), &rpc));

        let (shallow, deep) = tokio::join!(
            op.confirmation(Some(1), None, None),
            op.confirmation(Some(2), None, None)
        );
        assert_eq!(shallow.unwrap(), 11);
        assert_eq!(deep.unwrap(), 12);
        assert_eq!(op.included_in_level(), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_from_hash_tracks_external_operation() {
        let rpc = MockRpc::new();
        rpc.push_block(block_at(3, &["ooExternal"]));
        let op = Operation::from_hash("ooExternal", Context::new(Arc::new(rpc.clone())));

        assert_eq!(op.confirmation(Some(0), None, None).await.unwrap(), 3);
        assert!(op.raw().is_none());
        assert!(matches!(op.view(), OperationView::Other(None)));
    }
}
