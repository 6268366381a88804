//! Operation filters
//!
//! Filters are plain data, so they can be written as JSON:
//! `{"and": [{"kind": "transaction"}, {"destination": "KT1..."}]}`.

use crate::operations::content::{BlockOperation, OperationContent, OperationKind};
use crate::rpc::Block;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Hash(String),
    Kind(OperationKind),
    Source(String),
    Destination(String),
    /// Every sub-filter holds (vacuously true when empty)
    And(Vec<Filter>),
    /// At least one sub-filter holds (false when empty)
    Or(Vec<Filter>),
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    /// Whether `content`, part of the operation `hash`, is selected
    pub fn matches(&self, hash: &str, content: &OperationContent) -> bool {
        match self {
            Filter::Hash(expected) => hash == expected,
            Filter::Kind(kind) => content.kind() == Some(*kind),
            Filter::Source(source) => source_of(content) == Some(source.as_str()),
            Filter::Destination(destination) => has_destination(content, destination),
            Filter::And(filters) => filters.iter().all(|f| f.matches(hash, content)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(hash, content)),
        }
    }
}

fn source_of(content: &OperationContent) -> Option<&str> {
    match content {
        OperationContent::Endorsement(op) => op.metadata.as_ref()?.delegate.as_deref(),
        OperationContent::ActivateAccount(op) => Some(&op.pkh),
        _ => content.source(),
    }
}

fn has_destination(content: &OperationContent, destination: &str) -> bool {
    match content {
        OperationContent::Transaction(tx) => tx.destination == destination,
        OperationContent::Delegation(d) => d.delegate.as_deref() == Some(destination),
        OperationContent::Origination(_) => content
            .operation_result()
            .is_some_and(|r| r.originated_contracts.iter().any(|c| c == destination)),
        _ => false,
    }
}

/// One content entry observed in a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEvent {
    /// Hash of the operation the content belongs to
    pub hash: String,
    pub block_hash: String,
    pub level: u64,
    pub content: OperationContent,
}

/// Every content of `block` selected by `filter`, in pass order
pub fn matching_events(block: &Block, filter: &Filter) -> Vec<OperationEvent> {
    block
        .operations
        .iter()
        .flatten()
        .flat_map(|op: &BlockOperation| {
            op.contents
                .iter()
                .filter(|content| filter.matches(&op.hash, content))
                .map(|content| OperationEvent {
                    hash: op.hash.clone(),
                    block_hash: block.hash.clone(),
                    level: block.level(),
                    content: content.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{block_with_operations, MOCK_BAKER, MOCK_CONTRACT, MOCK_CONTRACT_2, MOCK_PKH};
    use serde_json::json;

    fn content(value: serde_json::Value) -> OperationContent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_kind_and_destination_conjunction() {
        let filter: Filter = serde_json::from_value(json!({
            "and": [{ "kind": "transaction" }, { "destination": MOCK_CONTRACT }]
        }))
        .unwrap();

        let hit = content(json!({ "kind": "transaction", "source": MOCK_PKH, "destination": MOCK_CONTRACT, "amount": "1" }));
        let other_destination = content(json!({ "kind": "transaction", "source": MOCK_PKH, "destination": MOCK_CONTRACT_2, "amount": "1" }));
        let delegation = content(json!({ "kind": "delegation", "source": MOCK_PKH, "delegate": MOCK_CONTRACT }));

        assert!(filter.matches("oo1", &hit));
        assert!(!filter.matches("oo1", &other_destination));
        assert!(!filter.matches("oo1", &delegation));
    }

    #[test]
    fn test_source_is_kind_specific() {
        let endorsement = content(json!({
            "kind": "endorsement", "level": 10,
            "metadata": { "delegate": MOCK_BAKER }
        }));
        let activation = content(json!({ "kind": "activate_account", "pkh": MOCK_PKH, "secret": "00" }));

        assert!(Filter::Source(MOCK_BAKER.into()).matches("oo", &endorsement));
        assert!(Filter::Source(MOCK_PKH.into()).matches("oo", &activation));
        assert!(!Filter::Source(MOCK_PKH.into()).matches("oo", &endorsement));
    }

    #[test]
    fn test_destination_is_kind_specific() {
        let delegation = content(json!({ "kind": "delegation", "source": MOCK_PKH, "delegate": MOCK_BAKER }));
        let origination = content(json!({
            "kind": "origination", "source": MOCK_PKH, "balance": "0",
            "metadata": { "operation_result": { "status": "applied", "originated_contracts": [MOCK_CONTRACT] } }
        }));
        let reveal = content(json!({ "kind": "reveal", "source": MOCK_PKH, "public_key": "edpk" }));

        assert!(Filter::Destination(MOCK_BAKER.into()).matches("oo", &delegation));
        assert!(Filter::Destination(MOCK_CONTRACT.into()).matches("oo", &origination));
        assert!(!Filter::Destination(MOCK_PKH.into()).matches("oo", &reveal));
    }

    #[test]
    fn test_empty_compositions() {
        let reveal = content(json!({ "kind": "reveal", "source": MOCK_PKH, "public_key": "edpk" }));
        assert!(Filter::and([]).matches("oo", &reveal));
        assert!(!Filter::or([]).matches("oo", &reveal));
        assert!(Filter::or([Filter::Hash("oo".into()), Filter::Kind(OperationKind::Ballot)])
            .matches("oo", &reveal));
    }

    #[test]
    fn test_matching_events_carry_block_position() {
        let block = block_with_operations(
            7,
            vec![BlockOperation {
                hash: "ooBatch".into(),
                branch: String::new(),
                protocol: String::new(),
                chain_id: String::new(),
                contents: vec![
                    content(json!({ "kind": "reveal", "source": MOCK_PKH, "public_key": "edpk" })),
                    content(json!({ "kind": "transaction", "source": MOCK_PKH, "destination": MOCK_CONTRACT, "amount": "5" })),
                ],
                signature: None,
            }],
        );

        let events = matching_events(&block, &Filter::Kind(OperationKind::Transaction));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].hash, "ooBatch");
        assert_eq!(events[0].level, 7);
        assert_eq!(events[0].block_hash, block.hash);
    }
}
