//! Operation lifecycle: content model, preparation, forging, injection,
//! confirmation and the providers built on top of them

pub mod batch;
pub mod confirmation;
pub mod content;
pub mod errors;
pub mod head_cache;
pub mod operation;
pub mod params;
pub mod pipeline;
pub mod preparer;
pub mod provider;

pub use batch::OperationBatch;
pub use confirmation::{tick_budget, ConfirmationState, ConfirmationTracker};
pub use content::{
    BlockOperation, ManagerFields, OperationContent, OperationGroup, OperationKind,
    OperationStatus,
};
pub use errors::{OpResult, OperationError};
pub use head_cache::{Clock, HeadCache, ManualClock, TokioClock, HEAD_CACHE_TTL};
pub use operation::{DelegationView, Operation, OperationView, OriginationView, TransactionView};
pub use params::{
    ActivationParams, DelegateParams, Limits, OperationIntent, OriginateParams,
    RegisterDelegateParams, RevealParams, TransferParams, DEFAULT_REVEAL_LIMITS,
    ESTIMATION_LIMITS,
};
pub use pipeline::{
    forge, inject, sign_and_inject, simulate, ForgedBytes, InjectedOperation,
    SIMULATION_SIGNATURE,
};
pub use preparer::{prepare_operation, PreparedOperation};
pub use provider::OperationProvider;
