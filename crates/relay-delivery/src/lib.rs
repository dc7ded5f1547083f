//! Transaction delivery module for the relay synchronizer.
//!
//! This module owns every interaction with the ledger: reading objects and
//! coins through a [`LedgerInterface`] implementation, and building, signing
//! and executing transactions through the [`DeliveryService`].

use async_trait::async_trait;
use relay_account::AccountService;
use relay_types::{
	truncate_id, Address, CallSpec, CoinRecord, ConfigSchema, GasPayment, GasPlan,
	ImplementationRegistry, NetworkConfig, ObjectId, ObjectKind, ObjectRef, Signature,
	TransactionDigest, TxResult, UnsignedTransaction,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod sui {
		pub mod rpc;
		mod types;
	}
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Transport failure talking to the node.
	#[error("Network error: {0}")]
	Network(String),
	/// The node answered with a JSON-RPC error.
	#[error("RPC error {code}: {message}")]
	Rpc { code: i64, message: String },
	/// The requested object does not exist.
	#[error("Object not found: {0}")]
	NotFound(String),
	/// The node response could not be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The transaction executed and aborted.
	#[error("Transaction {digest} failed: {reason}")]
	TransactionFailed { digest: String, reason: String },
	/// Effects did not become available in time.
	#[error("Timed out after {seconds}s waiting for transaction {digest}")]
	Timeout { digest: String, seconds: u64 },
	/// The operator account could not sign.
	#[error("Signing error: {0}")]
	Signing(String),
	/// Implementation configuration is invalid.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

/// An object as read from the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerObject {
	pub object_ref: ObjectRef,
	pub kind: ObjectKind,
	/// Move struct fields, as returned by the node.
	pub fields: serde_json::Value,
}

/// Trait defining the interface for ledger clients.
///
/// Implementations translate raw node responses into the typed model:
/// object type tags become [`ObjectKind`] here and nowhere else.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Returns the configuration schema for this ledger implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Reads an object with its type and fields.
	async fn get_object(&self, id: &ObjectId) -> Result<LedgerObject, DeliveryError>;

	/// Lists every coin of `coin_type` owned by `owner`.
	async fn get_owned_coins(
		&self,
		owner: &Address,
		coin_type: &str,
	) -> Result<Vec<CoinRecord>, DeliveryError>;

	/// Builds unsigned transaction data for `call`, sent by `sender`.
	async fn build_transaction(
		&self,
		sender: &Address,
		call: &CallSpec,
		gas: &GasPayment,
	) -> Result<UnsignedTransaction, DeliveryError>;

	/// Executes signed transaction data and reports its effects.
	async fn execute_transaction(
		&self,
		tx: &UnsignedTransaction,
		signature: &Signature,
	) -> Result<TxResult, DeliveryError>;

	/// Looks up an executed transaction. `None` while the node has not
	/// indexed it yet.
	async fn get_transaction(
		&self,
		digest: &TransactionDigest,
	) -> Result<Option<TxResult>, DeliveryError>;
}

/// Type alias for ledger factory functions.
///
/// The selected network is passed explicitly; implementations hold no
/// process-wide network state.
pub type DeliveryFactory =
	fn(&toml::Value, &NetworkConfig) -> Result<Box<dyn LedgerInterface>, DeliveryError>;

/// Registry trait for ledger implementations.
pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// Get all registered ledger implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::sui::rpc;

	vec![(rpc::Registry::NAME, rpc::Registry::factory())]
}

/// Turns an executed-but-aborted result into [`DeliveryError::TransactionFailed`].
pub fn ensure_success(result: TxResult) -> Result<TxResult, DeliveryError> {
	if result.success {
		return Ok(result);
	}
	Err(DeliveryError::TransactionFailed {
		digest: result.digest.0.clone(),
		reason: result
			.failure_reason()
			.unwrap_or("unknown failure")
			.to_string(),
	})
}

/// Submits operator transactions and waits for their effects.
///
/// Every transaction is built by the ledger, signed by the operator
/// account, and executed; nothing is submitted concurrently.
pub struct DeliveryService {
	ledger: Box<dyn LedgerInterface>,
	account: Arc<AccountService>,
	poll_interval: Duration,
	finality_timeout: Duration,
}

impl DeliveryService {
	pub fn new(
		ledger: Box<dyn LedgerInterface>,
		account: Arc<AccountService>,
		poll_interval: Duration,
		finality_timeout: Duration,
	) -> Self {
		Self {
			ledger,
			account,
			poll_interval,
			finality_timeout,
		}
	}

	/// Address transactions are sent from.
	pub async fn sender(&self) -> Result<Address, DeliveryError> {
		self.account
			.get_address()
			.await
			.map_err(|e| DeliveryError::Signing(e.to_string()))
	}

	pub async fn get_object(&self, id: &ObjectId) -> Result<LedgerObject, DeliveryError> {
		self.ledger.get_object(id).await
	}

	/// Coins of `coin_type` owned by the operator.
	pub async fn get_owned_coins(&self, coin_type: &str) -> Result<Vec<CoinRecord>, DeliveryError> {
		let owner = self.sender().await?;
		self.ledger.get_owned_coins(&owner, coin_type).await
	}

	/// Builds, signs and executes `call`.
	///
	/// Gas is paid from the plan's dedicated coin when it has one; otherwise
	/// the ledger picks a coin. An aborted transaction is returned as a
	/// result with `success == false`, not as an error.
	pub async fn submit(
		&self,
		call: &CallSpec,
		plan: &GasPlan,
		gas_budget: u64,
	) -> Result<TxResult, DeliveryError> {
		let sender = self.sender().await?;
		let gas = GasPayment {
			budget: gas_budget,
			coin: plan.dedicated_gas_coin_id.clone(),
		};

		let tx = self.ledger.build_transaction(&sender, call, &gas).await?;
		let signature = self.sign(&tx).await?;
		let result = self.ledger.execute_transaction(&tx, &signature).await?;

		if result.success {
			tracing::info!(
				call = %call.label(),
				digest = %truncate_id(&result.digest.0),
				gas_used = ?result.effects.gas_used,
				"Transaction executed"
			);
		} else {
			tracing::warn!(
				call = %call.label(),
				digest = %truncate_id(&result.digest.0),
				reason = result.failure_reason().unwrap_or_default(),
				"Transaction aborted"
			);
		}
		Ok(result)
	}

	/// Like [`submit`](Self::submit), then polls until the node has
	/// indexed the effects so follow-up reads observe them.
	pub async fn submit_and_wait(
		&self,
		call: &CallSpec,
		plan: &GasPlan,
		gas_budget: u64,
	) -> Result<TxResult, DeliveryError> {
		let result = self.submit(call, plan, gas_budget).await?;
		self.wait_for_finality(&result.digest).await
	}

	/// Polls for the effects of `digest` until they are available or the
	/// finality timeout passes.
	pub async fn wait_for_finality(
		&self,
		digest: &TransactionDigest,
	) -> Result<TxResult, DeliveryError> {
		let start = tokio::time::Instant::now();

		loop {
			if let Some(result) = self.ledger.get_transaction(digest).await? {
				return Ok(result);
			}
			if start.elapsed() >= self.finality_timeout {
				return Err(DeliveryError::Timeout {
					digest: digest.0.clone(),
					seconds: self.finality_timeout.as_secs(),
				});
			}
			tracing::debug!(digest = %truncate_id(&digest.0), "Waiting for effects");
			tokio::time::sleep(self.poll_interval).await;
		}
	}

	async fn sign(&self, tx: &UnsignedTransaction) -> Result<Signature, DeliveryError> {
		// The signature covers the decoded BCS bytes, not their base64 text.
		let bytes = implementations::sui::rpc::decode_tx_bytes(&tx.tx_bytes)?;
		self.account
			.sign(&bytes)
			.await
			.map_err(|e| DeliveryError::Signing(e.to_string()))
	}
}
