//! Utility functions for log formatting.

pub mod formatting;

pub use formatting::{format_coin_amount, truncate_id, with_0x_prefix, without_0x_prefix};
