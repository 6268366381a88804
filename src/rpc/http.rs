//! reqwest-backed implementation of [`TezosRpc`]

use super::errors::{RpcError, RpcResult};
use super::types::{
    Block, BlockHeader, BlockMetadata, ContractResponse, EntrypointsResponse, ForgeParams,
    PreapplyResponse, RunOperationRequest,
};
use super::TezosRpc;
use crate::operations::content::OperationGroup;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// JSON client for a single node
#[derive(Debug, Clone)]
pub struct HttpRpcClient {
    client: reqwest::Client,
    url: String,
    chain: String,
    block: String,
    timeout: Duration,
}

impl HttpRpcClient {
    /// Client targeting `chain = main`, `block = head`
    pub fn new(url: impl Into<String>, timeout: Duration) -> RpcResult<Self> {
        Self::with_chain(url, "main", "head", timeout)
    }

    pub fn with_chain(
        url: impl Into<String>,
        chain: impl Into<String>,
        block: impl Into<String>,
        timeout: Duration,
    ) -> RpcResult<Self> {
        let url = url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                endpoint: url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url,
            chain: chain.into(),
            block: block.into(),
            timeout,
        })
    }

    fn chain_path(&self, suffix: &str) -> String {
        format!("{}/chains/{}{}", self.url, self.chain, suffix)
    }

    fn block_path(&self, suffix: &str) -> String {
        format!(
            "{}/chains/{}/blocks/{}{}",
            self.url, self.chain, self.block, suffix
        )
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: String) -> RpcResult<T> {
        let started = Instant::now();
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| RpcError::from_reqwest(e, &endpoint, self.timeout_ms()))?;
        let result = self.decode(endpoint.clone(), response).await;
        crate::metrics::metrics()
            .rpc_latency
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: String,
        body: &B,
    ) -> RpcResult<T> {
        let started = Instant::now();
        let response = self
            .client
            .post(&endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| RpcError::from_reqwest(e, &endpoint, self.timeout_ms()))?;
        let result = self.decode(endpoint.clone(), response).await;
        crate::metrics::metrics()
            .rpc_latency
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        endpoint: String,
        response: reqwest::Response,
    ) -> RpcResult<T> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RpcError::NotFound { resource: endpoint });
        }
        let body = response
            .text()
            .await
            .map_err(|e| RpcError::from_reqwest(e, &endpoint, self.timeout_ms()))?;
        if !status.is_success() {
            return Err(RpcError::Response {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }
        debug!(endpoint = %endpoint, bytes = body.len(), "RPC response received");
        serde_json::from_str(&body).map_err(|e| RpcError::Decode {
            endpoint,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl TezosRpc for HttpRpcClient {
    fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn get_block_header(&self) -> RpcResult<BlockHeader> {
        self.get(self.block_path("/header")).await
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn get_block_metadata(&self) -> RpcResult<BlockMetadata> {
        self.get(self.block_path("/metadata")).await
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn get_block(&self) -> RpcResult<Block> {
        self.get(self.block_path("")).await
    }

    async fn get_contract(&self, address: &str) -> RpcResult<ContractResponse> {
        self.get(self.block_path(&format!("/context/contracts/{}", address)))
            .await
    }

    async fn get_manager_key(&self, address: &str) -> RpcResult<Option<String>> {
        // Babylon onwards returns a bare string (or null); older nodes wrap it
        // in `{ "key": ... }`.
        let value: Value = self
            .get(self.block_path(&format!("/context/contracts/{}/manager_key", address)))
            .await?;
        Ok(match value {
            Value::String(key) => Some(key),
            Value::Object(map) => map.get("key").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
    }

    async fn get_entrypoints(&self, address: &str) -> RpcResult<EntrypointsResponse> {
        self.get(self.block_path(&format!("/context/contracts/{}/entrypoints", address)))
            .await
    }

    async fn get_chain_id(&self) -> RpcResult<String> {
        self.get(self.chain_path("/chain_id")).await
    }

    async fn run_operation(&self, request: &RunOperationRequest) -> RpcResult<PreapplyResponse> {
        self.post(self.block_path("/helpers/scripts/run_operation"), request)
            .await
    }

    async fn preapply_operations(&self, groups: &[OperationGroup]) -> RpcResult<Value> {
        self.post(self.block_path("/helpers/preapply/operations"), groups)
            .await
    }

    async fn forge_operations(&self, params: &ForgeParams) -> RpcResult<String> {
        self.post(self.block_path("/helpers/forge/operations"), params)
            .await
    }

    async fn inject_operation(&self, signed_bytes: &str) -> RpcResult<String> {
        self.post(format!("{}/injection/operation", self.url), signed_bytes)
            .await
    }
}
