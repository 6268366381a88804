use crate::address::AddressError;
use crate::forger::ForgeError;
use crate::rpc::RpcError;
use crate::signer::SignerError;
use crate::units::UnitError;
use serde_json::Value;
use thiserror::Error;

/// Failures of the operation lifecycle
///
/// Every variant is terminal for the call that raised it: nothing here is
/// retried internally and no variant is produced after bytes were broadcast,
/// except `ConfirmationTimeout`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OperationError {
    /// Invalid polling parameters or missing collaborator
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Node query failed
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Preapply reported failed contents; nothing was injected
    #[error("Preapply rejected the operation ({} error(s))", errors.len())]
    Preapply { errors: Vec<Value> },

    /// Dry-run reported failed contents during estimation
    #[error("Simulation failed ({} error(s))", errors.len())]
    Simulation { errors: Vec<Value> },

    /// Preapply answered with something other than an array of groups
    #[error("Unexpected preapply response: {0}")]
    UnexpectedPreapplyResponse(String),

    /// Babylon and later forbid KT1 sources for transactions
    #[error("Contract {contract} cannot be the source of a transaction under {protocol}")]
    ContractSourceForbidden { contract: String, protocol: String },

    #[error("Invalid argument count {got} for entrypoint {entrypoint}, expected {expected:?}")]
    InvalidArgumentCount {
        entrypoint: String,
        got: usize,
        expected: Vec<usize>,
    },

    #[error("Unknown entrypoint {entrypoint} on {contract}")]
    UnknownEntrypoint { contract: String, entrypoint: String },

    /// Explicit reveal requested for an account whose key is on chain
    #[error("Public key of {address} is already revealed")]
    AlreadyRevealed { address: String },

    /// Operation not confirmed within the tick budget
    #[error("Confirmation of {hash} timed out after {ticks} polls")]
    ConfirmationTimeout { hash: String, ticks: u64 },

    #[error(transparent)]
    InvalidAmount(#[from] UnitError),

    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error("Forging failed: {0}")]
    Forge(String),

    #[error("Injection failed: {0}")]
    Injection(String),

    #[error("Signer error: {0}")]
    Signing(#[from] SignerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type OpResult<T> = Result<T, OperationError>;

impl OperationError {
    /// Advisory: whether the same call might succeed if repeated later
    pub fn is_retryable(&self) -> bool {
        match self {
            OperationError::Rpc(e) => e.is_retryable(),
            OperationError::ConfirmationTimeout { .. } => true,
            OperationError::Injection(_) => true,

            OperationError::Configuration(_) => false,
            OperationError::Preapply { .. } => false,
            OperationError::Simulation { .. } => false,
            OperationError::UnexpectedPreapplyResponse(_) => false,
            OperationError::ContractSourceForbidden { .. } => false,
            OperationError::InvalidArgumentCount { .. } => false,
            OperationError::UnknownEntrypoint { .. } => false,
            OperationError::AlreadyRevealed { .. } => false,
            OperationError::InvalidAmount(_) => false,
            OperationError::InvalidAddress(_) => false,
            OperationError::Forge(_) => false,
            OperationError::Signing(_) => false,
            OperationError::Internal(_) => false,
        }
    }

    /// Metrics label
    pub fn category(&self) -> &'static str {
        match self {
            OperationError::Configuration(_) => "configuration",
            OperationError::Rpc(_) | OperationError::UnexpectedPreapplyResponse(_) => "network",
            OperationError::Preapply { .. } | OperationError::Simulation { .. } => "validation",
            OperationError::ContractSourceForbidden { .. } => "protocol",
            OperationError::InvalidArgumentCount { .. }
            | OperationError::UnknownEntrypoint { .. }
            | OperationError::AlreadyRevealed { .. }
            | OperationError::InvalidAmount(_)
            | OperationError::InvalidAddress(_) => "argument",
            OperationError::ConfirmationTimeout { .. } => "timeout",
            OperationError::Forge(_) => "forge",
            OperationError::Injection(_) => "injection",
            OperationError::Signing(_) => "signing",
            OperationError::Internal(_) => "internal",
        }
    }

    /// Payloads reported by the node, if any
    pub fn node_errors(&self) -> &[Value] {
        match self {
            OperationError::Preapply { errors } | OperationError::Simulation { errors } => errors,
            _ => &[],
        }
    }
}

impl From<ForgeError> for OperationError {
    fn from(err: ForgeError) -> Self {
        match err {
            ForgeError::Rpc(e) => OperationError::Rpc(e),
            ForgeError::Failed(msg) => OperationError::Forge(msg),
        }
    }
}
