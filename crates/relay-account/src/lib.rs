//! Account management module for the relay synchronizer.
//!
//! This module provides the operator identity used to sign ledger
//! transactions. It defines the [`AccountInterface`] implemented by key
//! backends and the [`AccountService`] wrapper used by the rest of the system.

use async_trait::async_trait;
use relay_types::{Address, ConfigSchema, ImplementationRegistry, Signature};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Signing failed.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Key material is malformed or uses an unsupported scheme.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Keystore could not be read or holds no matching entry.
	#[error("Keystore error: {0}")]
	Keystore(String),
	/// Implementation configuration is invalid.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Trait defining the interface for account implementations.
///
/// An account owns one signing key. It reports the ledger address derived
/// from that key and signs transaction bytes produced by the ledger's
/// transaction builder.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Ledger address of the operator.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs serialized transaction data, returning the signature in the
	/// ledger's wire format.
	async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<Signature, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Every account backend compiled in, as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Operator account used by the delivery service.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the address associated with the managed account.
	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs serialized transaction data with the managed account.
	pub async fn sign(&self, tx_bytes: &[u8]) -> Result<Signature, AccountError> {
		self.implementation.sign_transaction(tx_bytes).await
	}
}
