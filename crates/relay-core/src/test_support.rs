//! In-memory ledger and header source used by the engine tests.

use async_trait::async_trait;
use relay_account::implementations::local::LocalAccount;
use relay_account::AccountService;
use relay_delivery::{DeliveryError, DeliveryService, LedgerInterface, LedgerObject};
use relay_headers::{HeaderError, HeaderService, HeaderSourceInterface};
use relay_types::{
	Address, CallArg, CallSpec, CoinRecord, ConfigSchema, CreatedObject, EffectsSummary,
	ExecutionStatus, GasPayment, ObjectId, ObjectKind, ObjectRef, Schema, SecretString,
	Signature, TransactionDigest, TxResult, UnsignedTransaction, ValidationError,
	BLOCK_HEADER_HEX_LEN,
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const OPERATOR_KEY: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

pub const GAS_COIN_TYPE: &str = "0x2::sui::SUI";

struct NoSchema;

impl ConfigSchema for NoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn coin(id: &str, coin_type: &str, balance: u64) -> CoinRecord {
	CoinRecord {
		id: ObjectId::new(id),
		version: 1,
		digest: format!("digest-{}", id),
		coin_type: coin_type.to_string(),
		balance,
	}
}

#[derive(Default)]
struct LedgerState {
	coins: Vec<CoinRecord>,
	relay: Option<(ObjectId, u64)>,
	pending: HashMap<String, CallSpec>,
	results: HashMap<TransactionDigest, TxResult>,
	executed: Vec<CallSpec>,
	gas_payments: Vec<GasPayment>,
	aborts: VecDeque<String>,
	counter: u64,
}

impl LedgerState {
	fn split(&mut self, coin: &ObjectId, amounts: &[u64]) -> Result<Vec<CreatedObject>, String> {
		let total: u64 = amounts.iter().sum();
		let source = self
			.coins
			.iter_mut()
			.find(|c| &c.id == coin)
			.ok_or_else(|| format!("coin {} not owned", coin))?;
		if source.balance < total {
			return Err("InsufficientCoinBalance in command 0".to_string());
		}
		source.balance -= total;
		let coin_type = source.coin_type.clone();

		let mut created = Vec::new();
		for (i, amount) in amounts.iter().enumerate() {
			let id = format!("0xsplit{}{}", self.counter, i);
			self.coins.push(self::coin(&id, &coin_type, *amount));
			created.push(CreatedObject {
				object_id: ObjectId::new(id),
				kind: ObjectKind::Coin {
					coin_type: coin_type.clone(),
				},
			});
		}
		Ok(created)
	}

	fn merge(&mut self, primary: &ObjectId, coin_to_merge: &ObjectId) -> Result<(), String> {
		let index = self
			.coins
			.iter()
			.position(|c| &c.id == coin_to_merge)
			.ok_or_else(|| format!("coin {} not owned", coin_to_merge))?;
		let merged = self.coins.remove(index);
		let target = self
			.coins
			.iter_mut()
			.find(|c| &c.id == primary)
			.ok_or_else(|| format!("coin {} not owned", primary))?;
		target.balance += merged.balance;
		Ok(())
	}

	/// Rejects coin calls the node could not find a gas coin for: one left
	/// to choose is a gas-type coin that is not itself an input.
	fn check_gas(&self, call: &CallSpec, gas: &GasPayment) -> Result<(), String> {
		let inputs: Vec<&ObjectId> = match call {
			CallSpec::SplitCoin { coin, .. } => vec![coin],
			CallSpec::MergeCoins {
				primary,
				coin_to_merge,
			} => vec![primary, coin_to_merge],
			_ => return Ok(()),
		};
		if let Some(gas_coin) = &gas.coin {
			if inputs.contains(&gas_coin) {
				return Err(format!("gas object {} is also an input", gas_coin));
			}
			return Ok(());
		}

		let splits_gas_type = self
			.coins
			.iter()
			.any(|c| c.coin_type == GAS_COIN_TYPE && inputs.contains(&&c.id));
		let spare = self
			.coins
			.iter()
			.any(|c| c.coin_type == GAS_COIN_TYPE && !inputs.contains(&&c.id));
		if splits_gas_type && !spare {
			return Err("Cannot find gas coin for signer address".to_string());
		}
		Ok(())
	}

	fn apply(&mut self, call: &CallSpec) -> Result<Vec<CreatedObject>, String> {
		match call {
			CallSpec::SplitCoin { coin, amounts } | CallSpec::SplitGasCoin { coin, amounts } => {
				self.split(coin, amounts)
			},
			CallSpec::MergeCoins {
				primary,
				coin_to_merge,
			} => {
				self.merge(primary, coin_to_merge)?;
				Ok(Vec::new())
			},
			CallSpec::MergeGasCoins { coins } => {
				let Some((primary, rest)) = coins.split_first() else {
					return Err("no coins to merge".to_string());
				};
				for coin in rest {
					self.merge(primary, coin)?;
				}
				Ok(Vec::new())
			},
			CallSpec::MoveCall { arguments, .. } => {
				let Some((relay_id, height)) = self.relay.as_mut() else {
					return Err("relay object missing".to_string());
				};
				match arguments.first() {
					Some(CallArg::Object(id)) if *id == *relay_id => {},
					_ => return Err("first argument is not the relay object".to_string()),
				}
				let headers = match arguments.last() {
					Some(CallArg::Pure(serde_json::Value::String(hex))) => hex.len(),
					_ => return Err("missing header argument".to_string()),
				};
				*height += (headers / BLOCK_HEADER_HEX_LEN) as u64;
				Ok(Vec::new())
			},
		}
	}
}

/// Ledger holding one operator's coins and a single relay object.
///
/// Split and merge calls change the coin set; relay calls advance the
/// relay height by the number of headers submitted. Like a node, it will
/// not build a split or merge of a gas-type coin without another gas coin
/// to pay with.
#[derive(Clone, Default)]
pub struct MockLedger {
	state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_coins(&self, coins: &[(&str, u64)], coin_type: &str) {
		let mut state = self.state.lock().unwrap();
		for (id, balance) in coins {
			state.coins.push(coin(id, coin_type, *balance));
		}
	}

	pub fn set_relay(&self, relay_object_id: &str, height: u64) {
		self.state.lock().unwrap().relay = Some((ObjectId::new(relay_object_id), height));
	}

	pub fn relay_height(&self) -> Option<u64> {
		self.state.lock().unwrap().relay.as_ref().map(|(_, h)| *h)
	}

	/// Makes the next executed transaction abort with `reason`.
	pub fn abort_next(&self, reason: &str) {
		self.state
			.lock()
			.unwrap()
			.aborts
			.push_back(reason.to_string());
	}

	pub fn executed(&self) -> Vec<CallSpec> {
		self.state.lock().unwrap().executed.clone()
	}

	pub fn gas_payments(&self) -> Vec<GasPayment> {
		self.state.lock().unwrap().gas_payments.clone()
	}

	pub fn balance_of(&self, id: &ObjectId) -> Option<u64> {
		let state = self.state.lock().unwrap();
		state.coins.iter().find(|c| &c.id == id).map(|c| c.balance)
	}

	pub fn sum_of(&self, ids: &[ObjectId]) -> u128 {
		ids.iter()
			.filter_map(|id| self.balance_of(id))
			.map(|b| b as u128)
			.sum()
	}

	/// Delivery service over this ledger, signing with a fixed test key.
	pub fn delivery(&self) -> Arc<DeliveryService> {
		let account = LocalAccount::from_hex(&SecretString::from(OPERATOR_KEY)).unwrap();
		Arc::new(DeliveryService::new(
			Box::new(self.clone()),
			Arc::new(AccountService::new(Box::new(account))),
			Duration::from_millis(1),
			Duration::from_secs(1),
		))
	}
}

#[async_trait]
impl LedgerInterface for MockLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}

	async fn get_object(&self, id: &ObjectId) -> Result<LedgerObject, DeliveryError> {
		let state = self.state.lock().unwrap();
		match &state.relay {
			Some((relay_id, height)) if relay_id == id => Ok(LedgerObject {
				object_ref: ObjectRef {
					object_id: id.clone(),
					version: state.counter + 1,
					digest: "relay-digest".to_string(),
				},
				kind: ObjectKind::Other {
					type_tag: "0xp1::btcrelay::BTCRelay".to_string(),
				},
				fields: json!({ "lastSubmittedHeight": height.to_string() }),
			}),
			_ => Err(DeliveryError::NotFound(id.to_string())),
		}
	}

	async fn get_owned_coins(
		&self,
		_owner: &Address,
		coin_type: &str,
	) -> Result<Vec<CoinRecord>, DeliveryError> {
		let state = self.state.lock().unwrap();
		Ok(state
			.coins
			.iter()
			.filter(|c| c.coin_type == coin_type)
			.cloned()
			.collect())
	}

	async fn build_transaction(
		&self,
		_sender: &Address,
		call: &CallSpec,
		gas: &GasPayment,
	) -> Result<UnsignedTransaction, DeliveryError> {
		let mut state = self.state.lock().unwrap();
		state
			.check_gas(call, gas)
			.map_err(|message| DeliveryError::Rpc { code: -32002, message })?;
		state.counter += 1;
		// Digits are valid base64, so the bytes decode for signing.
		let tx_bytes = format!("AAAA{:04}", state.counter);
		state.pending.insert(tx_bytes.clone(), call.clone());
		state.gas_payments.push(gas.clone());
		Ok(UnsignedTransaction {
			tx_bytes,
			gas: None,
		})
	}

	async fn execute_transaction(
		&self,
		tx: &UnsignedTransaction,
		_signature: &Signature,
	) -> Result<TxResult, DeliveryError> {
		let mut state = self.state.lock().unwrap();
		let call = state
			.pending
			.remove(&tx.tx_bytes)
			.ok_or_else(|| DeliveryError::InvalidResponse("unknown transaction".into()))?;
		state.executed.push(call.clone());

		let outcome = match state.aborts.pop_front() {
			Some(reason) => Err(reason),
			None => state.apply(&call),
		};
		let (status, created) = match outcome {
			Ok(created) => (ExecutionStatus::Success, created),
			Err(error) => (ExecutionStatus::Failure { error }, Vec::new()),
		};

		let digest = TransactionDigest(format!("Digest{}", state.counter));
		let result = TxResult::from_effects(
			digest.clone(),
			EffectsSummary {
				status,
				created,
				gas_used: Some(1_000),
			},
		);
		state.results.insert(digest, result.clone());
		Ok(result)
	}

	async fn get_transaction(
		&self,
		digest: &TransactionDigest,
	) -> Result<Option<TxResult>, DeliveryError> {
		Ok(self.state.lock().unwrap().results.get(digest).cloned())
	}
}

/// Chain whose tip can move while a test runs. The header at height `n`
/// is `n` in hex, zero-padded to 80 bytes.
#[derive(Clone)]
pub struct MockChain {
	tip: Arc<Mutex<u64>>,
	requests: Arc<Mutex<Vec<u64>>>,
}

impl MockChain {
	pub fn with_tip(tip: u64) -> Self {
		Self {
			tip: Arc::new(Mutex::new(tip)),
			requests: Arc::new(Mutex::new(Vec::new())),
		}
	}

	pub fn set_tip(&self, tip: u64) {
		*self.tip.lock().unwrap() = tip;
	}

	/// Heights whose hash was requested, in order.
	pub fn requests(&self) -> Vec<u64> {
		self.requests.lock().unwrap().clone()
	}

	pub fn raw_header(height: u64) -> String {
		format!("{:0>160}", format!("{:x}", height))
	}

	pub fn service(&self) -> Arc<HeaderService> {
		Arc::new(HeaderService::new(Box::new(self.clone())))
	}
}

#[async_trait]
impl HeaderSourceInterface for MockChain {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}

	async fn block_hash(&self, height: u64) -> Result<String, HeaderError> {
		self.requests.lock().unwrap().push(height);
		if height <= *self.tip.lock().unwrap() {
			Ok(format!("hash-{}", height))
		} else {
			Err(HeaderError::NotFound { height })
		}
	}

	async fn header_hex(&self, block_hash: &str) -> Result<String, HeaderError> {
		let height: u64 = block_hash
			.trim_start_matches("hash-")
			.parse()
			.map_err(|_| HeaderError::Network(format!("unknown hash {}", block_hash)))?;
		Ok(Self::raw_header(height))
	}
}
