//! Caller-facing intents
//!
//! Amounts are exact decimals in a chosen unit; fee, gas and storage are
//! optional and left empty on the wire content when unset so the preparer
//! can apply its defaults.

use super::content::{
    ActivateAccount, Delegation, ManagerFields, OperationContent, OperationKind, Origination,
    Reveal, Script, Transaction, TransactionParameters,
};
use super::errors::OpResult;
use crate::address;
use crate::estimate::Estimate;
use crate::units::{self, Unit};
use rust_decimal::Decimal;
use serde_json::Value;

/// Fee and resource limits; `None` means "estimate it"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Mutez
    pub fee: Option<u64>,
    pub gas_limit: Option<u64>,
    pub storage_limit: Option<u64>,
}

impl Limits {
    pub fn new(fee: u64, gas_limit: u64, storage_limit: u64) -> Self {
        Self {
            fee: Some(fee),
            gas_limit: Some(gas_limit),
            storage_limit: Some(storage_limit),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fee.is_some() && self.gas_limit.is_some() && self.storage_limit.is_some()
    }

    /// Fill only the unset values from `estimate`
    pub fn with_estimate(self, estimate: &Estimate) -> Self {
        Self {
            fee: self.fee.or(Some(estimate.suggested_fee_mutez())),
            gas_limit: self.gas_limit.or(Some(estimate.gas_limit())),
            storage_limit: self.storage_limit.or(Some(estimate.storage_limit())),
        }
    }

    fn manager_fields(&self, source: Option<&str>) -> ManagerFields {
        let field = |value: Option<u64>| value.map(|v| v.to_string()).unwrap_or_default();
        ManagerFields {
            source: source.unwrap_or_default().to_string(),
            fee: field(self.fee),
            counter: String::new(),
            gas_limit: field(self.gas_limit),
            storage_limit: field(self.storage_limit),
        }
    }
}

/// Upper bounds used while simulating
pub const ESTIMATION_LIMITS: Limits = Limits {
    fee: Some(10_000),
    gas_limit: Some(800_000),
    storage_limit: Some(60_000),
};

#[derive(Debug, Clone, PartialEq)]
pub struct TransferParams {
    pub to: String,
    pub amount: Decimal,
    pub unit: Unit,
    pub source: Option<String>,
    pub parameter: Option<TransactionParameters>,
    pub limits: Limits,
}

impl TransferParams {
    /// Transfer of `amount` tez
    pub fn new(to: impl Into<String>, amount: Decimal) -> Self {
        Self {
            to: to.into(),
            amount,
            unit: Unit::Tz,
            source: None,
            parameter: None,
            limits: Limits::default(),
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_parameter(mut self, parameter: TransactionParameters) -> Self {
        self.parameter = Some(parameter);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn to_content(&self) -> OpResult<OperationContent> {
        address::validate(&self.to)?;
        Ok(OperationContent::Transaction(Transaction {
            manager: self.limits.manager_fields(self.source.as_deref()),
            amount: units::to_mutez_string(self.amount, self.unit)?,
            destination: self.to.clone(),
            parameters: self.parameter.clone(),
            metadata: None,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OriginateParams {
    pub code: Value,
    pub storage: Value,
    /// Tez
    pub balance: Decimal,
    pub delegate: Option<String>,
    pub source: Option<String>,
    /// Legacy fields, dropped by the preparer from Babylon on
    pub manager_pubkey: Option<String>,
    pub spendable: Option<bool>,
    pub delegatable: Option<bool>,
    pub limits: Limits,
}

impl OriginateParams {
    pub fn new(code: Value, storage: Value) -> Self {
        Self {
            code,
            storage,
            balance: Decimal::ZERO,
            delegate: None,
            source: None,
            manager_pubkey: None,
            spendable: None,
            delegatable: None,
            limits: Limits::default(),
        }
    }

    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_delegate(mut self, delegate: impl Into<String>) -> Self {
        self.delegate = Some(delegate.into());
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn to_content(&self) -> OpResult<OperationContent> {
        if let Some(delegate) = &self.delegate {
            address::validate(delegate)?;
        }
        Ok(OperationContent::Origination(Origination {
            manager: self.limits.manager_fields(self.source.as_deref()),
            balance: units::to_mutez_string(self.balance, Unit::Tz)?,
            delegate: self.delegate.clone(),
            script: Some(Script {
                code: self.code.clone(),
                storage: self.storage.clone(),
            }),
            manager_pubkey: self.manager_pubkey.clone(),
            spendable: self.spendable,
            delegatable: self.delegatable,
            metadata: None,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelegateParams {
    pub source: String,
    /// `None` withdraws the delegation
    pub delegate: Option<String>,
    pub limits: Limits,
}

impl DelegateParams {
    pub fn new(source: impl Into<String>, delegate: Option<String>) -> Self {
        Self {
            source: source.into(),
            delegate,
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn to_content(&self) -> OpResult<OperationContent> {
        address::validate(&self.source)?;
        if let Some(delegate) = &self.delegate {
            address::validate(delegate)?;
        }
        Ok(OperationContent::Delegation(Delegation {
            manager: self.limits.manager_fields(Some(&self.source)),
            delegate: self.delegate.clone(),
            metadata: None,
        }))
    }
}

/// Delegation of the signer's account to itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterDelegateParams {
    pub limits: Limits,
}

impl RegisterDelegateParams {
    pub fn to_content(&self, pkh: &str) -> OpResult<OperationContent> {
        DelegateParams::new(pkh, Some(pkh.to_string()))
            .with_limits(self.limits)
            .to_content()
    }
}

/// Fundraiser account activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationParams {
    pub pkh: String,
    pub secret: String,
}

impl ActivationParams {
    pub fn new(pkh: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            pkh: pkh.into(),
            secret: secret.into(),
        }
    }

    pub fn to_content(&self) -> OpResult<OperationContent> {
        address::validate(&self.pkh)?;
        Ok(OperationContent::ActivateAccount(ActivateAccount {
            pkh: self.pkh.clone(),
            secret: self.secret.clone(),
            metadata: None,
        }))
    }
}

/// Explicit reveal of the signer's public key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevealParams {
    pub limits: Limits,
}

/// Limits applied to reveals the preparer inserts on its own
pub const DEFAULT_REVEAL_LIMITS: Limits = Limits {
    fee: Some(1_420),
    gas_limit: Some(10_600),
    storage_limit: Some(0),
};

impl RevealParams {
    pub fn to_content(&self, pkh: &str, public_key: &str) -> OperationContent {
        reveal_content(pkh, public_key, self.limits)
    }
}

pub(crate) fn reveal_content(pkh: &str, public_key: &str, limits: Limits) -> OperationContent {
    OperationContent::Reveal(Reveal {
        manager: limits.manager_fields(Some(pkh)),
        public_key: public_key.to_string(),
        metadata: None,
    })
}

/// One entry of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum OperationIntent {
    Transfer(TransferParams),
    Originate(OriginateParams),
    Delegate(DelegateParams),
    Activate(ActivationParams),
}

impl OperationIntent {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationIntent::Transfer(_) => OperationKind::Transaction,
            OperationIntent::Originate(_) => OperationKind::Origination,
            OperationIntent::Delegate(_) => OperationKind::Delegation,
            OperationIntent::Activate(_) => OperationKind::ActivateAccount,
        }
    }

    pub fn limits(&self) -> Option<Limits> {
        match self {
            OperationIntent::Transfer(p) => Some(p.limits),
            OperationIntent::Originate(p) => Some(p.limits),
            OperationIntent::Delegate(p) => Some(p.limits),
            OperationIntent::Activate(_) => None,
        }
    }

    /// No-op for activations, which carry no limits
    pub fn set_limits(&mut self, limits: Limits) {
        match self {
            OperationIntent::Transfer(p) => p.limits = limits,
            OperationIntent::Originate(p) => p.limits = limits,
            OperationIntent::Delegate(p) => p.limits = limits,
            OperationIntent::Activate(_) => {}
        }
    }

    pub fn to_content(&self) -> OpResult<OperationContent> {
        match self {
            OperationIntent::Transfer(p) => p.to_content(),
            OperationIntent::Originate(p) => p.to_content(),
            OperationIntent::Delegate(p) => p.to_content(),
            OperationIntent::Activate(p) => p.to_content(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::errors::OperationError;
    use crate::test_utils::MOCK_PKH;

    #[test]
    fn test_transfer_amount_is_mutez_string() {
        let content = TransferParams::new(MOCK_PKH, Decimal::new(15, 1)).to_content().unwrap();
        match content {
            OperationContent::Transaction(tx) => {
                assert_eq!(tx.amount, "1500000");
                assert_eq!(tx.destination, MOCK_PKH);
                assert_eq!(tx.manager.fee, "");
                assert_eq!(tx.manager.source, "");
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_transfer_rejects_bad_destination() {
        let err = TransferParams::new("tz1notanaddress", Decimal::ONE)
            .to_content()
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidAddress(_)));
    }

    #[test]
    fn test_explicit_limits_are_written() {
        let content = TransferParams::new(MOCK_PKH, Decimal::ONE)
            .with_limits(Limits::new(1_500, 10_300, 257))
            .to_content()
            .unwrap();
        let manager = content.manager().unwrap();
        assert_eq!(manager.fee, "1500");
        assert_eq!(manager.gas_limit, "10300");
        assert_eq!(manager.storage_limit, "257");
    }

    #[test]
    fn test_register_delegate_targets_self() {
        match RegisterDelegateParams::default().to_content(MOCK_PKH).unwrap() {
            OperationContent::Delegation(d) => {
                assert_eq!(d.manager.source, MOCK_PKH);
                assert_eq!(d.delegate.as_deref(), Some(MOCK_PKH));
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_partial_limits_keep_explicit_values() {
        let limits = Limits {
            fee: Some(5_000),
            gas_limit: None,
            storage_limit: None,
        };
        assert!(!limits.is_complete());
        assert!(ESTIMATION_LIMITS.is_complete());
    }
}
