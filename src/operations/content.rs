//! Operation content model
//!
//! One tagged enum covers both what we send (forge / preapply / run) and what
//! the node returns inside blocks and preapply results. Numeric manager
//! fields are decimal strings on the wire; an empty string means "unset" and
//! is normalized by the preparer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind tag shared by contents, filters and operation handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Endorsement,
    SeedNonceRevelation,
    DoubleEndorsementEvidence,
    DoubleBakingEvidence,
    ActivateAccount,
    Proposals,
    Ballot,
    Reveal,
    Transaction,
    Origination,
    Delegation,
}

impl OperationKind {
    /// Carries fee / counter / gas_limit / storage_limit
    pub fn is_fee_bearing(self) -> bool {
        matches!(
            self,
            OperationKind::Reveal
                | OperationKind::Transaction
                | OperationKind::Origination
                | OperationKind::Delegation
        )
    }

    /// Requires a funded, revealed source account
    pub fn is_source_bearing(self) -> bool {
        matches!(
            self,
            OperationKind::Transaction | OperationKind::Origination | OperationKind::Delegation
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Endorsement => "endorsement",
            OperationKind::SeedNonceRevelation => "seed_nonce_revelation",
            OperationKind::DoubleEndorsementEvidence => "double_endorsement_evidence",
            OperationKind::DoubleBakingEvidence => "double_baking_evidence",
            OperationKind::ActivateAccount => "activate_account",
            OperationKind::Proposals => "proposals",
            OperationKind::Ballot => "ballot",
            OperationKind::Reveal => "reveal",
            OperationKind::Transaction => "transaction",
            OperationKind::Origination => "origination",
            OperationKind::Delegation => "delegation",
        }
    }
}

/// Fields common to every manager operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerFields {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub fee: String,
    #[serde(default)]
    pub counter: String,
    #[serde(default)]
    pub gas_limit: String,
    #[serde(default)]
    pub storage_limit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Applied,
    Failed,
    Skipped,
    Backtracked,
}

/// `operation_result` / internal `result` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_storage_size_diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub originated_contracts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub big_map_diff: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
}

impl OperationResult {
    pub fn consumed_gas(&self) -> u64 {
        parse_u64(self.consumed_gas.as_deref())
    }

    pub fn paid_storage_size_diff(&self) -> u64 {
        parse_u64(self.paid_storage_size_diff.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalOperationResult {
    pub kind: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub result: OperationResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_result: Option<OperationResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal_operation_results: Vec<InternalOperationResult>,
    /// Endorsement metadata names the endorsing baker here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub balance_updates: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endorsement {
    pub level: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedNonceRevelation {
    pub level: u64,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleEndorsementEvidence {
    pub op1: Value,
    pub op2: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleBakingEvidence {
    pub bh1: Value,
    pub bh2: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivateAccount {
    pub pkh: String,
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposals {
    pub source: String,
    pub period: i64,
    pub proposals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub source: String,
    pub period: i64,
    pub proposal: String,
    pub ballot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reveal {
    #[serde(flatten)]
    pub manager: ManagerFields,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionParameters {
    pub entrypoint: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(flatten)]
    pub manager: ManagerFields,
    #[serde(default)]
    pub amount: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<TransactionParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub code: Value,
    pub storage: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Origination {
    #[serde(flatten)]
    pub manager: ManagerFields,
    #[serde(default)]
    pub balance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
    /// Pre-Babylon only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_pubkey: Option<String>,
    /// Pre-Babylon only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spendable: Option<bool>,
    /// Pre-Babylon only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegatable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    #[serde(flatten)]
    pub manager: ManagerFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationContent {
    Endorsement(Endorsement),
    SeedNonceRevelation(SeedNonceRevelation),
    DoubleEndorsementEvidence(DoubleEndorsementEvidence),
    DoubleBakingEvidence(DoubleBakingEvidence),
    ActivateAccount(ActivateAccount),
    Proposals(Proposals),
    Ballot(Ballot),
    Reveal(Reveal),
    Transaction(Transaction),
    Origination(Origination),
    Delegation(Delegation),
    /// Kinds introduced by protocols this crate does not model
    #[serde(other)]
    Unknown,
}

impl OperationContent {
    pub fn kind(&self) -> Option<OperationKind> {
        let kind = match self {
            OperationContent::Endorsement(_) => OperationKind::Endorsement,
            OperationContent::SeedNonceRevelation(_) => OperationKind::SeedNonceRevelation,
            OperationContent::DoubleEndorsementEvidence(_) => {
                OperationKind::DoubleEndorsementEvidence
            }
            OperationContent::DoubleBakingEvidence(_) => OperationKind::DoubleBakingEvidence,
            OperationContent::ActivateAccount(_) => OperationKind::ActivateAccount,
            OperationContent::Proposals(_) => OperationKind::Proposals,
            OperationContent::Ballot(_) => OperationKind::Ballot,
            OperationContent::Reveal(_) => OperationKind::Reveal,
            OperationContent::Transaction(_) => OperationKind::Transaction,
            OperationContent::Origination(_) => OperationKind::Origination,
            OperationContent::Delegation(_) => OperationKind::Delegation,
            OperationContent::Unknown => return None,
        };
        Some(kind)
    }

    pub fn is_fee_bearing(&self) -> bool {
        self.kind().is_some_and(OperationKind::is_fee_bearing)
    }

    pub fn is_source_bearing(&self) -> bool {
        self.kind().is_some_and(OperationKind::is_source_bearing)
    }

    pub fn manager(&self) -> Option<&ManagerFields> {
        match self {
            OperationContent::Reveal(op) => Some(&op.manager),
            OperationContent::Transaction(op) => Some(&op.manager),
            OperationContent::Origination(op) => Some(&op.manager),
            OperationContent::Delegation(op) => Some(&op.manager),
            _ => None,
        }
    }

    pub fn manager_mut(&mut self) -> Option<&mut ManagerFields> {
        match self {
            OperationContent::Reveal(op) => Some(&mut op.manager),
            OperationContent::Transaction(op) => Some(&mut op.manager),
            OperationContent::Origination(op) => Some(&mut op.manager),
            OperationContent::Delegation(op) => Some(&mut op.manager),
            _ => None,
        }
    }

    /// Account the content is attributed to, if the kind has one
    pub fn source(&self) -> Option<&str> {
        match self {
            OperationContent::Proposals(op) => Some(&op.source),
            OperationContent::Ballot(op) => Some(&op.source),
            _ => self
                .manager()
                .map(|m| m.source.as_str())
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn metadata(&self) -> Option<&OperationMetadata> {
        match self {
            OperationContent::Endorsement(op) => op.metadata.as_ref(),
            OperationContent::ActivateAccount(op) => op.metadata.as_ref(),
            OperationContent::Reveal(op) => op.metadata.as_ref(),
            OperationContent::Transaction(op) => op.metadata.as_ref(),
            OperationContent::Origination(op) => op.metadata.as_ref(),
            OperationContent::Delegation(op) => op.metadata.as_ref(),
            _ => None,
        }
    }

    pub fn operation_result(&self) -> Option<&OperationResult> {
        self.metadata().and_then(|m| m.operation_result.as_ref())
    }
}

pub(crate) fn parse_u64(value: Option<&str>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Unsigned operation group as assembled by the preparer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationGroup {
    pub branch: String,
    pub contents: Vec<OperationContent>,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Operation as it appears in a block's validation passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockOperation {
    pub hash: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub chain_id: String,
    pub contents: Vec<OperationContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}
