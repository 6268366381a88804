//! Wire models for the node endpoints the lifecycle depends on

use crate::operations::content::{BlockOperation, OperationContent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `GET /chains/{chain}/blocks/{block}/header`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: String,
    pub level: u64,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub chain_id: String,
    #[serde(default)]
    pub predecessor: String,
    #[serde(default)]
    pub timestamp: String,
}

/// `GET /chains/{chain}/blocks/{block}/metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub protocol: String,
    pub next_protocol: String,
}

/// Header embedded in a full block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockShellHeader {
    pub level: u64,
    #[serde(default)]
    pub predecessor: String,
    #[serde(default)]
    pub timestamp: String,
}

/// `GET /chains/{chain}/blocks/{block}`
///
/// `operations` holds the four validation passes (consensus, voting,
/// anonymous, manager) in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub chain_id: String,
    pub header: BlockShellHeader,
    #[serde(default)]
    pub operations: Vec<Vec<BlockOperation>>,
}

impl Block {
    pub fn level(&self) -> u64 {
        self.header.level
    }

    /// Whether any validation pass contains `hash`, scanning the manager
    /// pass first
    pub fn contains_operation(&self, hash: &str) -> bool {
        self.operations
            .iter()
            .take(4)
            .rev()
            .any(|pass| pass.iter().any(|op| op.hash == hash))
    }
}

/// `GET .../context/contracts/{address}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractResponse {
    #[serde(default)]
    pub balance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Value>,
}

/// `GET .../context/contracts/{address}/entrypoints`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntrypointsResponse {
    #[serde(default)]
    pub entrypoints: BTreeMap<String, Value>,
}

/// Body of `POST .../helpers/forge/operations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeParams {
    pub branch: String,
    pub contents: Vec<OperationContent>,
}

/// Operation as sent to `run_operation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOperationOperation {
    pub branch: String,
    pub contents: Vec<OperationContent>,
    pub signature: String,
}

/// Body of `POST .../helpers/scripts/run_operation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOperationRequest {
    pub operation: RunOperationOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

/// One group of results from preapply / run_operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreapplyResponse {
    pub contents: Vec<OperationContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_contains_operation_in_any_pass() {
        let block: Block = serde_json::from_value(json!({
            "hash": "BLhead",
            "header": { "level": 120 },
            "operations": [
                [],
                [],
                [],
                [{ "hash": "opManager", "contents": [] }]
            ]
        }))
        .unwrap();

        assert_eq!(block.level(), 120);
        assert!(block.contains_operation("opManager"));
        assert!(!block.contains_operation("opMissing"));
    }
}
