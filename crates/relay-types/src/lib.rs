//! Common types module for the relay synchronizer.
//!
//! This module defines the data model shared by every relay crate: Bitcoin
//! headers and submission plans, ledger objects and coins, transaction
//! results, and network configuration.

/// Operator identity types (addresses and signatures).
pub mod account;
/// Coin objects and gas provisioning results.
pub mod coin;
/// Ledger transaction call shapes and results.
pub mod delivery;
/// Bitcoin block headers and header batches.
pub mod header;
/// Network configuration types.
pub mod networks;
/// Base trait for self-registering implementations.
pub mod registry;
/// Relay watermark and submission plans.
pub mod relay;
/// Zeroizing string wrapper for key material.
pub mod secret_string;
/// Utility functions for formatting identifiers and amounts.
pub mod utils;
/// Schema checks for implementation configuration.
pub mod validation;

pub use account::*;
pub use coin::*;
pub use delivery::*;
pub use header::*;
pub use networks::{default_networks, NetworkConfig, NetworksConfig};
pub use registry::ImplementationRegistry;
pub use relay::*;
pub use secret_string::SecretString;
pub use utils::{format_coin_amount, truncate_id, with_0x_prefix, without_0x_prefix};
pub use validation::{ConfigSchema, Field, FieldType, Schema, ValidationError};
