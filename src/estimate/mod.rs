//! Fee, gas and storage estimation

#[allow(clippy::module_inception)]
mod estimate;
pub mod provider;

pub use estimate::{
    Estimate, DELEGATION_GAS_MINIMUM, GAS_BUFFER, MINIMAL_FEE_MUTEZ, MINIMAL_FEE_PER_BYTE_MUTEZ,
    MINIMAL_FEE_PER_GAS_NANOTEZ, MINIMAL_FEE_PER_STORAGE_BYTE_MUTEZ, ORIGINATION_STORAGE_BASELINE,
};
pub(crate) use estimate::consumed;
pub use provider::EstimationProvider;
