//! Sui full-node JSON-RPC ledger client.
//!
//! Transactions are built by the node through the `unsafe_*` builder
//! methods, signed locally by the operator account, and executed with
//! `WaitForLocalExecution` so that the returned effects are final.

use super::types::{CoinPage, ObjectResponse, TransactionBytes, TransactionResponse};
use crate::{DeliveryError, LedgerInterface, LedgerObject};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use relay_types::{
	Address, CallArg, CallSpec, CoinRecord, ConfigSchema, Field, FieldType, GasPayment,
	NetworkConfig, ObjectId, ObjectKind, Schema, Signature, TransactionDigest, TxResult,
	UnsignedTransaction, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Page size for `suix_getCoins`.
const COIN_PAGE_LIMIT: u64 = 50;

/// Decodes base64 transaction bytes as returned by the builder methods.
pub fn decode_tx_bytes(tx_bytes: &str) -> Result<Vec<u8>, DeliveryError> {
	BASE64
		.decode(tx_bytes)
		.map_err(|e| DeliveryError::InvalidResponse(format!("Transaction bytes are not base64: {}", e)))
}

#[derive(Debug, Deserialize)]
struct RpcError {
	code: i64,
	message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
	result: Option<Value>,
	error: Option<RpcError>,
}

/// Ledger client for a single Sui network.
pub struct SuiRpcLedger {
	client: reqwest::Client,
	rpc_url: String,
	next_id: AtomicU64,
}

impl SuiRpcLedger {
	pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| DeliveryError::Network(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			rpc_url: rpc_url.to_string(),
			next_id: AtomicU64::new(1),
		})
	}

	async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, DeliveryError> {
		let request = json!({
			"jsonrpc": "2.0",
			"id": self.next_id.fetch_add(1, Ordering::Relaxed),
			"method": method,
			"params": params,
		});

		let response = self
			.client
			.post(&self.rpc_url)
			.json(&request)
			.send()
			.await
			.map_err(|e| DeliveryError::Network(format!("{} failed: {}", method, e)))?;

		if !response.status().is_success() {
			return Err(DeliveryError::Network(format!(
				"{} returned HTTP {}",
				method,
				response.status()
			)));
		}

		let body: RpcResponse = response
			.json()
			.await
			.map_err(|e| DeliveryError::InvalidResponse(format!("{}: {}", method, e)))?;

		if let Some(error) = body.error {
			return Err(DeliveryError::Rpc {
				code: error.code,
				message: error.message,
			});
		}

		let result = body
			.result
			.ok_or_else(|| DeliveryError::InvalidResponse(format!("{}: empty result", method)))?;
		serde_json::from_value(result)
			.map_err(|e| DeliveryError::InvalidResponse(format!("{}: {}", method, e)))
	}
}

/// Builder method and parameters for a call shape.
fn builder_request(sender: &Address, call: &CallSpec, gas: &GasPayment) -> (&'static str, Value) {
	let gas_coin = gas.coin.as_ref().map(|id| id.0.clone());
	let budget = gas.budget.to_string();

	match call {
		CallSpec::MoveCall {
			package,
			module,
			function,
			type_arguments,
			arguments,
		} => {
			let arguments: Vec<Value> = arguments
				.iter()
				.map(|arg| match arg {
					CallArg::Object(id) => Value::String(id.0.clone()),
					CallArg::Pure(value) => value.clone(),
				})
				.collect();
			(
				"unsafe_moveCall",
				json!([
					sender.0,
					package.0,
					module,
					function,
					type_arguments,
					arguments,
					gas_coin,
					budget,
					Value::Null
				]),
			)
		},
		CallSpec::SplitCoin { coin, amounts } => {
			let amounts: Vec<String> = amounts.iter().map(u64::to_string).collect();
			(
				"unsafe_splitCoin",
				json!([sender.0, coin.0, amounts, gas_coin, budget]),
			)
		},
		CallSpec::MergeCoins {
			primary,
			coin_to_merge,
		} => (
			"unsafe_mergeCoins",
			json!([sender.0, primary.0, coin_to_merge.0, gas_coin, budget]),
		),
		// paySui takes gas from its first input and sends the split amounts
		// back to the sender.
		CallSpec::SplitGasCoin { coin, amounts } => {
			let recipients = vec![sender.0.clone(); amounts.len()];
			let amounts: Vec<String> = amounts.iter().map(u64::to_string).collect();
			(
				"unsafe_paySui",
				json!([sender.0, [coin.0], recipients, amounts, budget]),
			)
		},
		// payAllSui folds every input into the first and returns it.
		CallSpec::MergeGasCoins { coins } => {
			let coins: Vec<&str> = coins.iter().map(|id| id.as_str()).collect();
			("unsafe_payAllSui", json!([sender.0, coins, sender.0, budget]))
		},
	}
}

/// Transaction lookups fail with this message until the node indexes the
/// digest.
fn is_unknown_transaction(error: &DeliveryError) -> bool {
	match error {
		DeliveryError::Rpc { message, .. } => {
			let message = message.to_lowercase();
			message.contains("could not find") || message.contains("not found")
		},
		_ => false,
	}
}

fn response_options() -> Value {
	json!({ "showEffects": true, "showObjectChanges": true })
}

/// Configuration schema for the Sui JSON-RPC ledger.
pub struct SuiRpcSchema;

impl ConfigSchema for SuiRpcSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("rpc_url must be an http(s) URL".to_string()),
					}
				}),
				Field::new(
					"request_timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(600),
					},
				),
			],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl LedgerInterface for SuiRpcLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SuiRpcSchema)
	}

	async fn get_object(&self, id: &ObjectId) -> Result<LedgerObject, DeliveryError> {
		let response: ObjectResponse = self
			.call(
				"sui_getObject",
				json!([id.0, { "showType": true, "showContent": true }]),
			)
			.await?;

		let data = match (response.data, response.error) {
			(Some(data), _) => data,
			(None, error) => {
				return Err(DeliveryError::NotFound(format!(
					"{} ({})",
					id,
					error.map(|e| e.to_string()).unwrap_or_default()
				)))
			},
		};

		let kind = match data.type_tag.as_deref() {
			Some("package") => ObjectKind::Package,
			Some(tag) => super::types::parse_object_kind(tag),
			None => ObjectKind::Other {
				type_tag: String::new(),
			},
		};
		let object_ref = data.object_ref();
		let fields = data.content.map(|c| c.fields).unwrap_or(Value::Null);

		Ok(LedgerObject {
			object_ref,
			kind,
			fields,
		})
	}

	async fn get_owned_coins(
		&self,
		owner: &Address,
		coin_type: &str,
	) -> Result<Vec<CoinRecord>, DeliveryError> {
		let mut coins = Vec::new();
		let mut cursor: Option<String> = None;

		loop {
			let page: CoinPage = self
				.call(
					"suix_getCoins",
					json!([owner.0, coin_type, cursor, COIN_PAGE_LIMIT]),
				)
				.await?;

			coins.extend(page.data.into_iter().map(CoinRecord::from));
			match page.next_cursor {
				Some(next) if page.has_next_page => cursor = Some(next),
				_ => break,
			}
		}

		Ok(coins)
	}

	async fn build_transaction(
		&self,
		sender: &Address,
		call: &CallSpec,
		gas: &GasPayment,
	) -> Result<UnsignedTransaction, DeliveryError> {
		let (method, params) = builder_request(sender, call, gas);
		let built: TransactionBytes = self.call(method, params).await?;

		Ok(UnsignedTransaction {
			tx_bytes: built.tx_bytes,
			gas: built.gas.into_iter().next().map(Into::into),
		})
	}

	async fn execute_transaction(
		&self,
		tx: &UnsignedTransaction,
		signature: &Signature,
	) -> Result<TxResult, DeliveryError> {
		let response: TransactionResponse = self
			.call(
				"sui_executeTransactionBlock",
				json!([
					tx.tx_bytes,
					[signature.0],
					response_options(),
					"WaitForLocalExecution"
				]),
			)
			.await?;
		response.into_result()
	}

	async fn get_transaction(
		&self,
		digest: &TransactionDigest,
	) -> Result<Option<TxResult>, DeliveryError> {
		let response: Result<TransactionResponse, _> = self
			.call(
				"sui_getTransactionBlock",
				json!([digest.0, response_options()]),
			)
			.await;

		match response {
			Ok(response) => response.into_result().map(Some),
			Err(e) if is_unknown_transaction(&e) => Ok(None),
			Err(e) => Err(e),
		}
	}
}

/// Factory function to create a Sui JSON-RPC ledger client.
///
/// Configuration parameters:
/// - `rpc_url`: overrides the selected network's endpoint
/// - `request_timeout_seconds`: per-request timeout (default 30)
pub fn create_ledger(
	config: &toml::Value,
	network: &NetworkConfig,
) -> Result<Box<dyn LedgerInterface>, DeliveryError> {
	SuiRpcSchema
		.validate(config)
		.map_err(|e| DeliveryError::InvalidConfig(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.unwrap_or(&network.rpc_url);
	let timeout = config
		.get("request_timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS);

	Ok(Box::new(SuiRpcLedger::new(
		rpc_url,
		Duration::from_secs(timeout),
	)?))
}

/// Registry for the Sui JSON-RPC ledger.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "sui_rpc";
	type Factory = crate::DeliveryFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl crate::DeliveryRegistry for Registry {}
