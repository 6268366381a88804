use crate::operations::content::{OperationContent, OperationKind};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// Mutez charged for every operation
pub const MINIMAL_FEE_MUTEZ: u64 = 100;
/// Mutez per forged byte
pub const MINIMAL_FEE_PER_BYTE_MUTEZ: u64 = 1;
/// Mutez burned per byte of storage
pub const MINIMAL_FEE_PER_STORAGE_BYTE_MUTEZ: u64 = 1000;
/// Nanotez per gas unit (0.1 mutez)
pub const MINIMAL_FEE_PER_GAS_NANOTEZ: u64 = 100;
/// Added on top of the simulated gas
pub const GAS_BUFFER: u64 = 100;

/// Storage paid by every origination on top of the simulated diff
pub const ORIGINATION_STORAGE_BASELINE: u64 = 257;
/// Gas floor for delegations, which report no consumption
pub const DELEGATION_GAS_MINIMUM: u64 = 10_600;

/// Fee / gas / storage figures derived from a dry run
///
/// Only produced from simulation results; every fee is a pure function of
/// the four stored fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Estimate {
    gas: u64,
    storage: u64,
    op_size: u64,
    base_fee_mutez: u64,
}

impl Estimate {
    pub(crate) fn new(gas: u64, storage: u64, op_size: u64) -> Self {
        Self {
            gas,
            storage,
            op_size,
            base_fee_mutez: MINIMAL_FEE_MUTEZ,
        }
    }

    /// Build from one simulated content, summing its own and internal usage
    pub(crate) fn from_simulated(content: &OperationContent, op_size: u64) -> Self {
        let (gas, storage) = consumed(content);
        let kind = content.kind();
        let gas = match kind {
            Some(OperationKind::Delegation) => gas.max(DELEGATION_GAS_MINIMUM),
            _ => gas,
        };
        let storage = match kind {
            Some(OperationKind::Origination) => storage + ORIGINATION_STORAGE_BASELINE,
            _ => storage,
        };
        Self::new(gas, storage, op_size)
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas + GAS_BUFFER
    }

    pub fn storage_limit(&self) -> u64 {
        self.storage
    }

    /// Forged size in bytes
    pub fn op_size(&self) -> u64 {
        self.op_size
    }

    pub fn base_fee_mutez(&self) -> u64 {
        self.base_fee_mutez
    }

    pub fn burn_fee_mutez(&self) -> u64 {
        self.storage_limit() * MINIMAL_FEE_PER_STORAGE_BYTE_MUTEZ
    }

    /// Gas and size component, in mutez (may be fractional)
    pub fn operation_fee_mutez(&self) -> Decimal {
        let per_gas = Decimal::new(MINIMAL_FEE_PER_GAS_NANOTEZ as i64, 3);
        Decimal::from(self.gas_limit()) * per_gas
            + Decimal::from(self.op_size * MINIMAL_FEE_PER_BYTE_MUTEZ)
    }

    pub fn minimal_fee_mutez(&self) -> u64 {
        ceil_mutez(Decimal::from(self.base_fee_mutez) + self.operation_fee_mutez())
    }

    /// Minimal fee plus one extra base fee
    pub fn suggested_fee_mutez(&self) -> u64 {
        ceil_mutez(self.operation_fee_mutez() + Decimal::from(2 * self.base_fee_mutez))
    }

    pub fn total_cost_mutez(&self) -> u64 {
        self.minimal_fee_mutez() + self.burn_fee_mutez()
    }

    /// Alias for [`Estimate::total_cost_mutez`]
    pub fn using_base_fee_mutez(&self) -> u64 {
        self.total_cost_mutez()
    }
}

fn ceil_mutez(amount: Decimal) -> u64 {
    amount.ceil().to_u64().unwrap_or(u64::MAX)
}

/// Gas and paid storage reported for `content` and its internal operations
pub(crate) fn consumed(content: &OperationContent) -> (u64, u64) {
    let Some(metadata) = content.metadata() else {
        return (0, 0);
    };
    let primary = metadata
        .operation_result
        .as_ref()
        .map(|r| (r.consumed_gas(), r.paid_storage_size_diff()))
        .unwrap_or((0, 0));
    metadata
        .internal_operation_results
        .iter()
        .fold(primary, |(gas, storage), internal| {
            (
                gas + internal.result.consumed_gas(),
                storage + internal.result.paid_storage_size_diff(),
            )
        })
}
