//! Smart-contract calls through a typed entrypoint table
//!
//! Entrypoints are resolved once when the contract is loaded. A call is a
//! lookup in [`EntrypointTable`] plus an arity check; the arguments are
//! folded into the `Pair` shape of the parameter type and sent as a
//! transfer parameter.

use crate::address;
use crate::context::ContextHandle;
use crate::estimate::{Estimate, EstimationProvider};
use crate::operations::content::TransactionParameters;
use crate::operations::errors::{OpResult, OperationError};
use crate::operations::operation::Operation;
use crate::operations::params::{Limits, TransferParams};
use crate::operations::provider::OperationProvider;
use crate::units::Unit;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the root entrypoint
pub const DEFAULT_ENTRYPOINT: &str = "default";

/// Parameter type of one entrypoint and the number of arguments it takes
#[derive(Debug, Clone, PartialEq)]
pub struct EntrypointDescriptor {
    pub parameter_type: Value,
    pub arity: usize,
}

impl EntrypointDescriptor {
    pub fn new(parameter_type: Value) -> Self {
        let arity = arity(&parameter_type);
        Self {
            parameter_type,
            arity,
        }
    }

    /// Fold `args` into the value this entrypoint expects
    pub fn encode(&self, entrypoint: &str, args: Vec<Value>) -> OpResult<Value> {
        if args.len() != self.arity {
            return Err(OperationError::InvalidArgumentCount {
                entrypoint: entrypoint.to_string(),
                got: args.len(),
                expected: vec![self.arity],
            });
        }
        if self.arity == 0 {
            return Ok(right_comb(args));
        }
        Ok(fill(&self.parameter_type, &mut args.into_iter()))
    }
}

/// Number of flat arguments for a Micheline type: pairs are flattened on
/// both sides, a bare `unit` takes none, everything else takes one
pub fn arity(ty: &Value) -> usize {
    match prim(ty) {
        Some("unit") => 0,
        _ => match pair_args(ty) {
            Some(children) => children.iter().map(|c| arity(c).max(1)).sum(),
            None => 1,
        },
    }
}

fn prim(ty: &Value) -> Option<&str> {
    ty.get("prim").and_then(Value::as_str)
}

fn pair_args(ty: &Value) -> Option<&[Value]> {
    if prim(ty) != Some("pair") {
        return None;
    }
    ty.get("args")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .filter(|args| !args.is_empty())
}

/// Build a value of type `ty` from `args` taken in leaf order
fn fill<I: Iterator<Item = Value>>(ty: &Value, args: &mut I) -> Value {
    match pair_args(ty) {
        Some(children) => right_comb(children.iter().map(|c| fill(c, args)).collect()),
        None => args.next().unwrap_or_else(|| json!({ "prim": "Unit" })),
    }
}

/// `[]` → `Unit`, `[a]` → `a`, `[a, b, c]` → `Pair a (Pair b c)`
pub fn right_comb(mut args: Vec<Value>) -> Value {
    match args.len() {
        0 => json!({ "prim": "Unit" }),
        1 => args.remove(0),
        _ => {
            let head = args.remove(0);
            json!({ "prim": "Pair", "args": [head, right_comb(args)] })
        }
    }
}

/// Entrypoint name → descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntrypointTable {
    entries: BTreeMap<String, EntrypointDescriptor>,
}

impl EntrypointTable {
    pub fn from_types(types: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: types
                .into_iter()
                .map(|(name, ty)| (name, EntrypointDescriptor::new(ty)))
                .collect(),
        }
    }

    /// Table with only the root entrypoint, taken from the script's
    /// `parameter` section
    pub fn from_script(script: &Value) -> Option<Self> {
        let parameter = script
            .get("code")?
            .as_array()?
            .iter()
            .find(|section| prim(section) == Some("parameter"))?
            .get("args")?
            .get(0)?
            .clone();
        Some(Self::from_types([(DEFAULT_ENTRYPOINT.to_string(), parameter)]))
    }

    pub fn get(&self, name: &str) -> Option<&EntrypointDescriptor> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entrypoint for an unnamed call: `default` when its arity fits,
    /// otherwise the first entrypoint (by name) taking `argc` arguments
    pub fn resolve(&self, argc: usize) -> OpResult<(&str, &EntrypointDescriptor)> {
        if let Some(default) = self.entries.get(DEFAULT_ENTRYPOINT) {
            if default.arity == argc {
                return Ok((DEFAULT_ENTRYPOINT, default));
            }
        }
        if let Some((name, descriptor)) = self.entries.iter().find(|(_, d)| d.arity == argc) {
            return Ok((name.as_str(), descriptor));
        }
        let mut expected: Vec<usize> = self.entries.values().map(|d| d.arity).collect();
        expected.sort_unstable();
        expected.dedup();
        Err(OperationError::InvalidArgumentCount {
            entrypoint: DEFAULT_ENTRYPOINT.to_string(),
            got: argc,
            expected,
        })
    }
}

/// A deployed contract with its entrypoints loaded
#[derive(Clone)]
pub struct ContractAbstraction {
    address: String,
    entrypoints: EntrypointTable,
    context: ContextHandle,
}

impl std::fmt::Debug for ContractAbstraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractAbstraction")
            .field("address", &self.address)
            .field("entrypoints", &self.entrypoints)
            .finish_non_exhaustive()
    }
}

impl ContractAbstraction {
    /// Load the entrypoints of `address`
    ///
    /// Contracts without named entrypoints expose only their root
    /// parameter, read from the script.
    pub async fn at(context: ContextHandle, address: &str) -> OpResult<Self> {
        address::validate(address)?;
        let ctx = context.snapshot();
        let response = ctx.rpc().get_entrypoints(address).await?;
        let mut entrypoints = EntrypointTable::from_types(response.entrypoints);
        if entrypoints.is_empty() {
            let contract = ctx.rpc().get_contract(address).await?;
            entrypoints = contract
                .script
                .as_ref()
                .and_then(EntrypointTable::from_script)
                .unwrap_or_default();
        }
        debug!(address, entrypoints = entrypoints.len(), "Contract loaded");
        Ok(Self {
            address: address.to_string(),
            entrypoints,
            context,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn entrypoints(&self) -> &EntrypointTable {
        &self.entrypoints
    }

    /// Build a call to `entrypoint`, or to whichever entrypoint takes
    /// `args.len()` arguments when no name is given
    pub fn method(&self, entrypoint: Option<&str>, args: Vec<Value>) -> OpResult<ContractMethod> {
        let (name, value) = match entrypoint {
            Some(name) => {
                let descriptor =
                    self.entrypoints
                        .get(name)
                        .ok_or_else(|| OperationError::UnknownEntrypoint {
                            contract: self.address.clone(),
                            entrypoint: name.to_string(),
                        })?;
                (name.to_string(), descriptor.encode(name, args)?)
            }
            None => {
                let (name, descriptor) = self.entrypoints.resolve(args.len())?;
                (name.to_string(), descriptor.encode(name, args)?)
            }
        };
        let params = TransferParams::new(&self.address, Decimal::ZERO).with_parameter(
            TransactionParameters {
                entrypoint: name,
                value,
            },
        );
        Ok(ContractMethod {
            params,
            context: self.context.clone(),
        })
    }
}

/// A built contract call, ready to estimate or send
#[derive(Clone)]
pub struct ContractMethod {
    params: TransferParams,
    context: ContextHandle,
}

impl std::fmt::Debug for ContractMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractMethod")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ContractMethod {
    /// Tez sent along with the call
    pub fn with_amount(mut self, amount: Decimal, unit: Unit) -> Self {
        self.params.amount = amount;
        self.params.unit = unit;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.params.source = Some(source.into());
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.params.limits = limits;
        self
    }

    pub fn params(&self) -> &TransferParams {
        &self.params
    }

    pub fn into_params(self) -> TransferParams {
        self.params
    }

    pub async fn estimate(&self) -> OpResult<Estimate> {
        EstimationProvider::new(self.context.clone())
            .transfer(&self.params)
            .await
    }

    pub async fn send(self) -> OpResult<Operation> {
        OperationProvider::new(self.context).transfer(self.params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::rpc::EntrypointsResponse;
    use crate::test_utils::{MockRpc, MockSigner, MOCK_CONTRACT, MOCK_CONTRACT_2, MOCK_PK, MOCK_PKH};
    use std::sync::Arc;

    fn handle(rpc: &MockRpc) -> ContextHandle {
        ContextHandle::new(
            Context::new(Arc::new(rpc.clone())).with_signer(Arc::new(MockSigner::new())),
        )
    }

    fn token_rpc() -> MockRpc {
        let rpc = MockRpc::new();
        rpc.set_entrypoints(
            MOCK_CONTRACT,
            EntrypointsResponse {
                entrypoints: [
                    (
                        "transfer".to_string(),
                        json!({ "prim": "pair", "args": [
                            { "prim": "address", "annots": [":from"] },
                            { "prim": "pair", "args": [
                                { "prim": "address", "annots": [":to"] },
                                { "prim": "nat", "annots": [":value"] }
                            ] }
                        ] }),
                    ),
                    ("pause".to_string(), json!({ "prim": "unit" })),
                    ("mint".to_string(), json!({ "prim": "nat" })),
                ]
                .into_iter()
                .collect(),
            },
        );
        rpc
    }

    #[test]
    fn test_arity() {
        assert_eq!(arity(&json!({ "prim": "unit" })), 0);
        assert_eq!(arity(&json!({ "prim": "nat" })), 1);
        assert_eq!(
            arity(&json!({ "prim": "pair", "args": [{ "prim": "nat" }, { "prim": "string" }] })),
            2
        );
        // comb pairs written n-ary
        assert_eq!(
            arity(&json!({ "prim": "pair", "args": [
                { "prim": "nat" }, { "prim": "nat" }, { "prim": "nat" }
            ] })),
            3
        );
        assert_eq!(arity(&json!({ "prim": "or", "args": [{ "prim": "nat" }, { "prim": "unit" }] })), 1);
    }

    #[test]
    fn test_left_nested_pair_is_flattened() {
        let ty = json!({ "prim": "pair", "args": [
            { "prim": "pair", "args": [{ "prim": "address" }, { "prim": "nat" }] },
            { "prim": "string" }
        ] });
        let descriptor = EntrypointDescriptor::new(ty);
        assert_eq!(descriptor.arity, 3);

        let value = descriptor
            .encode(
                DEFAULT_ENTRYPOINT,
                vec![json!({ "string": MOCK_PKH }), json!({ "int": "4" }), json!({ "string": "memo" })],
            )
            .unwrap();
        assert_eq!(
            value,
            json!({ "prim": "Pair", "args": [
                { "prim": "Pair", "args": [{ "string": MOCK_PKH }, { "int": "4" }] },
                { "string": "memo" }
            ] })
        );

        let err = descriptor
            .encode(DEFAULT_ENTRYPOINT, vec![json!({ "int": "1" }); 2])
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidArgumentCount { got: 2, .. }));
    }

    #[test]
    fn test_right_nested_pair_keeps_comb_shape() {
        let ty = json!({ "prim": "pair", "args": [
            { "prim": "nat" },
            { "prim": "pair", "args": [{ "prim": "nat" }, { "prim": "unit" }] }
        ] });
        let descriptor = EntrypointDescriptor::new(ty);
        let args = vec![json!({ "int": "1" }), json!({ "int": "2" }), json!({ "prim": "Unit" })];
        assert_eq!(descriptor.arity, 3);
        assert_eq!(
            descriptor.encode(DEFAULT_ENTRYPOINT, args.clone()).unwrap(),
            right_comb(args)
        );
    }

    #[test]
    fn test_right_comb() {
        assert_eq!(right_comb(vec![]), json!({ "prim": "Unit" }));
        assert_eq!(right_comb(vec![json!({ "int": "1" })]), json!({ "int": "1" }));
        assert_eq!(
            right_comb(vec![json!({ "int": "1" }), json!({ "int": "2" }), json!({ "int": "3" })]),
            json!({ "prim": "Pair", "args": [
                { "int": "1" },
                { "prim": "Pair", "args": [{ "int": "2" }, { "int": "3" }] }
            ] })
        );
    }

    #[tokio::test]
    async fn test_named_entrypoint_builds_transfer() {
        let rpc = token_rpc();
        let contract = ContractAbstraction::at(handle(&rpc), MOCK_CONTRACT).await.unwrap();
        assert_eq!(contract.entrypoints().len(), 3);

        let method = contract
            .method(
                Some("transfer"),
                vec![
                    json!({ "string": MOCK_PKH }),
                    json!({ "string": MOCK_CONTRACT_2 }),
                    json!({ "int": "10" }),
                ],
            )
            .unwrap();
        let parameter = method.params().parameter.clone().unwrap();
        assert_eq!(parameter.entrypoint, "transfer");
        assert_eq!(parameter.value["prim"], "Pair");
        assert_eq!(parameter.value["args"][1]["args"][1], json!({ "int": "10" }));
        assert_eq!(method.params().to, MOCK_CONTRACT);
    }

    #[tokio::test]
    async fn test_argument_count_checked_before_building() {
        let rpc = token_rpc();
        let contract = ContractAbstraction::at(handle(&rpc), MOCK_CONTRACT).await.unwrap();

        let err = contract
            .method(Some("transfer"), vec![json!({ "int": "1" })])
            .unwrap_err();
        assert_eq!(
            err,
            OperationError::InvalidArgumentCount {
                entrypoint: "transfer".into(),
                got: 1,
                expected: vec![3],
            }
        );

        let err = contract.method(None, vec![json!({}); 2]).unwrap_err();
        assert!(matches!(
            err,
            OperationError::InvalidArgumentCount { ref expected, .. } if expected == &vec![0, 1, 3]
        ));

        let err = contract.method(Some("burn"), vec![]).unwrap_err();
        assert!(matches!(err, OperationError::UnknownEntrypoint { .. }));
    }

    #[tokio::test]
    async fn test_unnamed_call_matches_by_arity() {
        let rpc = token_rpc();
        let contract = ContractAbstraction::at(handle(&rpc), MOCK_CONTRACT).await.unwrap();
        let method = contract.method(None, vec![]).unwrap();
        assert_eq!(method.params().parameter.as_ref().unwrap().entrypoint, "pause");
    }

    #[tokio::test]
    async fn test_root_parameter_from_script() {
        let rpc = MockRpc::new();
        rpc.set_entrypoints(MOCK_CONTRACT_2, EntrypointsResponse::default());
        rpc.set_script(
            MOCK_CONTRACT_2,
            json!({
                "code": [
                    { "prim": "parameter", "args": [{ "prim": "int" }] },
                    { "prim": "storage", "args": [{ "prim": "int" }] },
                    { "prim": "code", "args": [[]] }
                ],
                "storage": { "int": "0" }
            }),
        );
        let contract = ContractAbstraction::at(handle(&rpc), MOCK_CONTRACT_2).await.unwrap();
        let method = contract.method(None, vec![json!({ "int": "5" })]).unwrap();
        assert_eq!(method.params().parameter.as_ref().unwrap().entrypoint, "default");
    }

    #[tokio::test]
    async fn test_send_contract_call() {
        let rpc = token_rpc();
        rpc.set_counter(MOCK_PKH, 1);
        rpc.set_manager_key(MOCK_PKH, Some(MOCK_PK));
        let contract = ContractAbstraction::at(handle(&rpc), MOCK_CONTRACT).await.unwrap();

        let op = contract
            .method(Some("mint"), vec![json!({ "int": "7" })])
            .unwrap()
            .with_limits(Limits::new(1_000, 20_000, 100))
            .send()
            .await
            .unwrap();
        assert_eq!(rpc.injected_bytes().len(), 1);
        match op.view() {
            crate::operations::operation::OperationView::Transaction(view) => {
                assert_eq!(view.destination(), MOCK_CONTRACT);
                assert_eq!(view.amount(), "0");
            }
            other => panic!("unexpected view {:?}", other),
        }
    }
}
