//! Test Utilities Module
//!
//! Scriptable stand-ins for the node, the signer and the forger so the
//! lifecycle can be exercised deterministically without a network.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::forger::{ForgeError, Forger};
use crate::operations::content::{
    BlockOperation, OperationContent, OperationGroup, OperationMetadata, OperationResult,
    OperationStatus,
};
use crate::protocol::Protocol;
use crate::rpc::{
    Block, BlockHeader, BlockMetadata, BlockShellHeader, ContractResponse, EntrypointsResponse,
    ForgeParams, PreapplyResponse, RpcError, RpcResult, RunOperationRequest, TezosRpc,
};
use crate::signer::{SignResult, Signer, SignerError, Watermark};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Default account used by [`MockSigner`]
pub const MOCK_PKH: &str = "tz1KqTpEZ7Yob7QbPE4Hy4Wo8fHG8LhKxZSx";
pub const MOCK_PK: &str = "edpkvGfYw3LyB1UcCahKQk4rF2tvbMUk8GFiTuMjL75uGXrpvKXhjn";
/// Implicit account used as a transfer target
pub const MOCK_DESTINATION: &str = "tz1LHBqjkR1QoJ1k2uukvSVaXGrpkBLZhG48";
/// Baker used for delegations
pub const MOCK_BAKER: &str = "tz28bAJAz2DJGU6hqDAB6a4R5495awDqS4ww";
pub const MOCK_CONTRACT: &str = "KT18g5SiBpZEhMtyW11tE35UN9EJy2vSb8rC";
pub const MOCK_CONTRACT_2: &str = "KT18mPKf2ZcMZWHT7yDVMARps6DztKHJ2ZVA";
pub const MOCK_BRANCH: &str = "BLockGenesisGenesisGenesisGenesisGenesisf79b5d1CoW2";
pub const MOCK_CHAIN_ID: &str = "NetXdQprcVkpaWU";

struct MockState {
    header: BlockHeader,
    metadata: BlockMetadata,
    header_error: Option<RpcError>,
    blocks: VecDeque<Block>,
    contracts: HashMap<String, ContractResponse>,
    manager_keys: HashMap<String, String>,
    entrypoints: HashMap<String, EntrypointsResponse>,
    chain_id: String,
    preapply_response: Option<Value>,
    run_operation_response: Option<PreapplyResponse>,
    simulated_gas: u64,
    simulated_storage: u64,
    forged_bytes: String,
    injected_hash: String,
    calls: HashMap<&'static str, usize>,
    injected: Vec<String>,
    preapplied: Vec<Vec<OperationGroup>>,
    simulated: Vec<RunOperationRequest>,
}

/// In-memory node
///
/// Clones share state, so a test can keep one handle for scripting and
/// assertions while the code under test owns another.
#[derive(Clone)]
pub struct MockRpc {
    url: Arc<str>,
    state: Arc<Mutex<MockState>>,
}

impl MockRpc {
    pub fn new() -> Self {
        Self::with_url("mock://node")
    }

    pub fn with_url(url: &str) -> Self {
        let protocol = Protocol::PsCARTHA.hash().to_string();
        Self {
            url: Arc::from(url),
            state: Arc::new(Mutex::new(MockState {
                header: BlockHeader {
                    hash: MOCK_BRANCH.to_string(),
                    level: 100,
                    protocol: protocol.clone(),
                    chain_id: MOCK_CHAIN_ID.to_string(),
                    predecessor: String::new(),
                    timestamp: String::new(),
                },
                metadata: BlockMetadata {
                    protocol: protocol.clone(),
                    next_protocol: protocol,
                },
                header_error: None,
                blocks: VecDeque::new(),
                contracts: HashMap::new(),
                manager_keys: HashMap::new(),
                entrypoints: HashMap::new(),
                chain_id: MOCK_CHAIN_ID.to_string(),
                preapply_response: None,
                run_operation_response: None,
                simulated_gas: 0,
                simulated_storage: 0,
                forged_bytes: "0123456789abcdef".to_string(),
                injected_hash: "ooMockOperationHash".to_string(),
                calls: HashMap::new(),
                injected: Vec::new(),
                preapplied: Vec::new(),
                simulated: Vec::new(),
            })),
        }
    }

    /// Set both the live and the next protocol
    pub fn set_protocol(&self, protocol: &Protocol) {
        let mut state = self.state.lock();
        state.header.protocol = protocol.hash().to_string();
        state.metadata.protocol = protocol.hash().to_string();
        state.metadata.next_protocol = protocol.hash().to_string();
    }

    pub fn set_header_error(&self, error: Option<RpcError>) {
        self.state.lock().header_error = error;
    }

    /// Queue a block for `get_block`; the last queued block keeps being
    /// returned once the queue drains to it
    pub fn push_block(&self, block: Block) {
        self.state.lock().blocks.push_back(block);
    }

    pub fn set_counter(&self, address: &str, counter: u64) {
        self.state.lock().contracts.insert(
            address.to_string(),
            ContractResponse {
                balance: "0".to_string(),
                counter: Some(counter.to_string()),
                delegate: None,
                script: None,
            },
        );
    }

    /// Attach a script to `address`, keeping any counter already set
    pub fn set_script(&self, address: &str, script: Value) {
        self.state
            .lock()
            .contracts
            .entry(address.to_string())
            .or_insert_with(|| ContractResponse {
                balance: "0".to_string(),
                counter: None,
                delegate: None,
                script: None,
            })
            .script = Some(script);
    }

    pub fn set_manager_key(&self, address: &str, key: Option<&str>) {
        let mut state = self.state.lock();
        match key {
            Some(key) => {
                state
                    .manager_keys
                    .insert(address.to_string(), key.to_string());
            }
            None => {
                state.manager_keys.remove(address);
            }
        }
    }

    pub fn set_entrypoints(&self, address: &str, entrypoints: EntrypointsResponse) {
        self.state
            .lock()
            .entrypoints
            .insert(address.to_string(), entrypoints);
    }

    /// Raw preapply body; defaults to echoing every content as applied
    pub fn set_preapply_response(&self, response: Value) {
        self.state.lock().preapply_response = Some(response);
    }

    /// Raw simulation result; defaults to echoing every content as applied
    /// with the usage set by [`MockRpc::set_simulated_usage`]
    pub fn set_run_operation_response(&self, response: PreapplyResponse) {
        self.state.lock().run_operation_response = Some(response);
    }

    pub fn set_simulated_usage(&self, gas: u64, storage: u64) {
        let mut state = self.state.lock();
        state.simulated_gas = gas;
        state.simulated_storage = storage;
    }

    pub fn set_forged_bytes(&self, bytes: &str) {
        self.state.lock().forged_bytes = bytes.to_string();
    }

    pub fn set_injected_hash(&self, hash: &str) {
        self.state.lock().injected_hash = hash.to_string();
    }

    /// Number of times `method` was called
    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn injected_bytes(&self) -> Vec<String> {
        self.state.lock().injected.clone()
    }

    pub fn preapplied_groups(&self) -> Vec<Vec<OperationGroup>> {
        self.state.lock().preapplied.clone()
    }

    pub fn simulated_requests(&self) -> Vec<RunOperationRequest> {
        self.state.lock().simulated.clone()
    }

    fn record(&self, method: &'static str) {
        *self.state.lock().calls.entry(method).or_insert(0) += 1;
    }
}

impl Default for MockRpc {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of `contents` with an applied result attached to each entry
fn with_results(contents: &[OperationContent], gas: u64, storage: u64) -> Vec<OperationContent> {
    contents
        .iter()
        .cloned()
        .map(|mut content| {
            let metadata = OperationMetadata {
                operation_result: Some(applied_result(gas, storage)),
                ..OperationMetadata::default()
            };
            attach_metadata(&mut content, metadata);
            content
        })
        .collect()
}

/// Replace the metadata of a content entry (no-op for kinds without one)
pub fn attach_metadata(content: &mut OperationContent, metadata: OperationMetadata) {
    match content {
        OperationContent::Endorsement(op) => op.metadata = Some(metadata),
        OperationContent::ActivateAccount(op) => op.metadata = Some(metadata),
        OperationContent::Reveal(op) => op.metadata = Some(metadata),
        OperationContent::Transaction(op) => op.metadata = Some(metadata),
        OperationContent::Origination(op) => op.metadata = Some(metadata),
        OperationContent::Delegation(op) => op.metadata = Some(metadata),
        _ => {}
    }
}

pub fn applied_result(gas: u64, storage: u64) -> OperationResult {
    OperationResult {
        status: OperationStatus::Applied,
        consumed_gas: Some(gas.to_string()),
        paid_storage_size_diff: (storage > 0).then(|| storage.to_string()),
        storage_size: None,
        originated_contracts: Vec::new(),
        storage: None,
        big_map_diff: None,
        errors: Vec::new(),
    }
}

pub fn failed_result(errors: Vec<Value>) -> OperationResult {
    OperationResult {
        status: OperationStatus::Failed,
        consumed_gas: None,
        paid_storage_size_diff: None,
        storage_size: None,
        originated_contracts: Vec::new(),
        storage: None,
        big_map_diff: None,
        errors,
    }
}

#[async_trait]
impl TezosRpc for MockRpc {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_block_header(&self) -> RpcResult<BlockHeader> {
        self.record("get_block_header");
        let state = self.state.lock();
        match &state.header_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.header.clone()),
        }
    }

    async fn get_block_metadata(&self) -> RpcResult<BlockMetadata> {
        self.record("get_block_metadata");
        Ok(self.state.lock().metadata.clone())
    }

    async fn get_block(&self) -> RpcResult<Block> {
        self.record("get_block");
        let mut state = self.state.lock();
        if state.blocks.len() > 1 {
            if let Some(block) = state.blocks.pop_front() {
                return Ok(block);
            }
        }
        state.blocks.front().cloned().ok_or(RpcError::NotFound {
            resource: "head".to_string(),
        })
    }

    async fn get_contract(&self, address: &str) -> RpcResult<ContractResponse> {
        self.record("get_contract");
        Ok(self
            .state
            .lock()
            .contracts
            .get(address)
            .cloned()
            .unwrap_or(ContractResponse {
                balance: "0".to_string(),
                counter: Some("0".to_string()),
                delegate: None,
                script: None,
            }))
    }

    async fn get_manager_key(&self, address: &str) -> RpcResult<Option<String>> {
        self.record("get_manager_key");
        Ok(self.state.lock().manager_keys.get(address).cloned())
    }

    async fn get_entrypoints(&self, address: &str) -> RpcResult<EntrypointsResponse> {
        self.record("get_entrypoints");
        self.state
            .lock()
            .entrypoints
            .get(address)
            .cloned()
            .ok_or(RpcError::NotFound {
                resource: address.to_string(),
            })
    }

    async fn get_chain_id(&self) -> RpcResult<String> {
        self.record("get_chain_id");
        Ok(self.state.lock().chain_id.clone())
    }

    async fn run_operation(&self, request: &RunOperationRequest) -> RpcResult<PreapplyResponse> {
        self.record("run_operation");
        let mut state = self.state.lock();
        state.simulated.push(request.clone());
        if let Some(response) = &state.run_operation_response {
            return Ok(response.clone());
        }
        Ok(PreapplyResponse {
            contents: with_results(
                &request.operation.contents,
                state.simulated_gas,
                state.simulated_storage,
            ),
            signature: Some(request.operation.signature.clone()),
        })
    }

    async fn preapply_operations(&self, groups: &[OperationGroup]) -> RpcResult<Value> {
        self.record("preapply_operations");
        let mut state = self.state.lock();
        state.preapplied.push(groups.to_vec());
        if let Some(response) = &state.preapply_response {
            return Ok(response.clone());
        }
        let echoed: Vec<PreapplyResponse> = groups
            .iter()
            .map(|group| PreapplyResponse {
                contents: with_results(&group.contents, 0, 0),
                signature: group.signature.clone(),
            })
            .collect();
        serde_json::to_value(echoed).map_err(|e| RpcError::Decode {
            endpoint: "preapply".to_string(),
            message: e.to_string(),
        })
    }

    async fn forge_operations(&self, _params: &ForgeParams) -> RpcResult<String> {
        self.record("forge_operations");
        Ok(self.state.lock().forged_bytes.clone())
    }

    async fn inject_operation(&self, signed_bytes: &str) -> RpcResult<String> {
        self.record("inject_operation");
        let mut state = self.state.lock();
        state.injected.push(signed_bytes.to_string());
        Ok(state.injected_hash.clone())
    }
}

/// Signer with a fixed key that "signs" by appending a constant signature
#[derive(Clone)]
pub struct MockSigner {
    pkh: String,
    public_key: String,
    watermarks: Arc<Mutex<Vec<Watermark>>>,
}

/// Raw signature appended by [`MockSigner`]: 64 bytes of `0x11`
pub const MOCK_SIGNATURE_HEX: &str = "11111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111111";

impl MockSigner {
    pub fn new() -> Self {
        Self::with_keys(MOCK_PKH, MOCK_PK)
    }

    pub fn with_keys(pkh: &str, public_key: &str) -> Self {
        Self {
            pkh: pkh.to_string(),
            public_key: public_key.to_string(),
            watermarks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Watermarks seen by `sign`, in call order
    pub fn watermarks(&self) -> Vec<Watermark> {
        self.watermarks.lock().clone()
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Signer for MockSigner {
    async fn public_key_hash(&self) -> Result<String, SignerError> {
        Ok(self.pkh.clone())
    }

    async fn public_key(&self) -> Result<String, SignerError> {
        Ok(self.public_key.clone())
    }

    async fn sign(&self, bytes: &str, watermark: Watermark) -> Result<SignResult, SignerError> {
        self.watermarks.lock().push(watermark);
        Ok(SignResult {
            bytes: bytes.to_string(),
            sig: MOCK_SIGNATURE_HEX.to_string(),
            prefix_sig: "edsigMockSignature".to_string(),
            sbytes: format!("{}{}", bytes, MOCK_SIGNATURE_HEX),
        })
    }
}

/// Local forger: hex of the canonical JSON encoding of the input
///
/// Deterministic and injective over `{branch, contents}`, which is all the
/// pipeline relies on.
#[derive(Debug, Clone, Default)]
pub struct MockForger;

#[async_trait]
impl Forger for MockForger {
    async fn forge(&self, params: &ForgeParams) -> Result<String, ForgeError> {
        serde_json::to_vec(params)
            .map(hex::encode)
            .map_err(|e| ForgeError::Failed(e.to_string()))
    }
}

/// Block at `level` whose manager pass contains the given operation hashes
pub fn block_at(level: u64, operation_hashes: &[&str]) -> Block {
    let operations = operation_hashes
        .iter()
        .map(|hash| BlockOperation {
            hash: hash.to_string(),
            branch: String::new(),
            protocol: String::new(),
            chain_id: String::new(),
            contents: Vec::new(),
            signature: None,
        })
        .collect();
    block_with_operations(level, operations)
}

/// Block at `level` whose manager pass holds `operations`
pub fn block_with_operations(level: u64, operations: Vec<BlockOperation>) -> Block {
    Block {
        hash: format!("BLmock{level}"),
        protocol: Protocol::PsCARTHA.hash().to_string(),
        chain_id: MOCK_CHAIN_ID.to_string(),
        header: BlockShellHeader {
            level,
            predecessor: format!("BLmock{}", level.saturating_sub(1)),
            timestamp: String::new(),
        },
        operations: vec![Vec::new(), Vec::new(), Vec::new(), operations],
    }
}
