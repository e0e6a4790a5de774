//! Streaming consumer: drives resource iterators, accumulates records
//! and publishes throttled snapshots to observers.

mod consumer;
mod state;
mod subscription;

pub use state::{Phase, ResourceState};
pub use subscription::{ResourceSubscription, SubscriptionKey};
