//! Block and operation subscriptions

pub mod filter;
pub mod provider;
pub mod subscription;

pub use filter::{matching_events, Filter, OperationEvent};
pub use provider::SubscribeProvider;
pub use subscription::{BlockEvent, HandlerId, Subscription};
