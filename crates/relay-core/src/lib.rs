//! Core synchronizer for the Bitcoin header relay.
//!
//! This crate ties the header source, the relay state on the ledger and the
//! transaction submitter together: the [`planner`] decides what to submit
//! next, the [`engine`] runs the sync loop, [`coins`] provisions payment
//! coins, and the [`builder`] wires implementations up from configuration.

pub mod builder;
pub mod coins;
pub mod engine;
pub mod planner;

#[cfg(test)]
mod test_support;

pub use builder::{BuilderError, RelayBuilder, RelayFactories};
pub use coins::{CoinProvisioner, ProvisionError};
pub use engine::scheduler::{BackoffScheduler, Scheduler};
pub use engine::state::{RelayStateReader, StateError};
pub use engine::{CycleOutcome, EngineError, RelayTarget, SyncEngine};
pub use planner::plan_next;
