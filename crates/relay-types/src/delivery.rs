//! Transaction delivery types for the relay synchronizer.
//!
//! This module defines the call shapes the submitter knows how to build, and
//! the results reported back by the ledger once a transaction executes.

use crate::{ObjectId, ObjectKind, ObjectRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Digest identifying an executed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionDigest(pub String);

impl fmt::Display for TransactionDigest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Argument passed to a Move call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallArg {
	/// An object input, referenced by id.
	Object(ObjectId),
	/// A pure value, encoded as JSON for the ledger's call builder.
	Pure(serde_json::Value),
}

/// Shape of a transaction to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallSpec {
	MoveCall {
		package: ObjectId,
		module: String,
		function: String,
		type_arguments: Vec<String>,
		arguments: Vec<CallArg>,
	},
	/// Split `amounts` off `coin`; the new coins go back to the sender.
	SplitCoin { coin: ObjectId, amounts: Vec<u64> },
	/// Merge `coin_to_merge` into `primary`.
	MergeCoins {
		primary: ObjectId,
		coin_to_merge: ObjectId,
	},
	/// Split `amounts` off a coin of the gas type, paying gas from that
	/// same coin. Needed when it is the only gas coin owned.
	SplitGasCoin { coin: ObjectId, amounts: Vec<u64> },
	/// Merge gas-type `coins` into the first of them, paying gas from it.
	MergeGasCoins { coins: Vec<ObjectId> },
}

impl CallSpec {
	/// Short label used in logs.
	pub fn label(&self) -> String {
		match self {
			CallSpec::MoveCall {
				module, function, ..
			} => format!("{}::{}", module, function),
			CallSpec::SplitCoin { .. } => "split_coin".to_string(),
			CallSpec::MergeCoins { .. } => "merge_coins".to_string(),
			CallSpec::SplitGasCoin { .. } => "split_gas_coin".to_string(),
			CallSpec::MergeGasCoins { .. } => "merge_gas_coins".to_string(),
		}
	}
}

/// Gas settings for a single transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPayment {
	/// Maximum fee the transaction may consume.
	pub budget: u64,
	/// Coin to pay with. The ledger picks one when `None`.
	pub coin: Option<ObjectId>,
}

/// Transaction bytes ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
	/// Base64 of the BCS transaction data.
	pub tx_bytes: String,
	/// Gas object chosen by the ledger, when reported.
	pub gas: Option<ObjectRef>,
}

/// Object created by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedObject {
	pub object_id: ObjectId,
	pub kind: ObjectKind,
}

/// Execution status reported in transaction effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
	Success,
	Failure { error: String },
}

/// Condensed view of transaction effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectsSummary {
	pub status: ExecutionStatus,
	pub created: Vec<CreatedObject>,
	/// Net gas charged, when reported.
	pub gas_used: Option<u64>,
}

/// Result of submitting one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
	pub success: bool,
	pub digest: TransactionDigest,
	pub effects: EffectsSummary,
}

impl TxResult {
	/// Builds a result whose `success` flag agrees with the effects status.
	pub fn from_effects(digest: TransactionDigest, effects: EffectsSummary) -> Self {
		Self {
			success: effects.status == ExecutionStatus::Success,
			digest,
			effects,
		}
	}

	/// Failure message from the effects, if the transaction failed.
	pub fn failure_reason(&self) -> Option<&str> {
		match &self.effects.status {
			ExecutionStatus::Failure { error } => Some(error),
			ExecutionStatus::Success => None,
		}
	}

	/// First created object matching `predicate`.
	pub fn find_created<F>(&self, predicate: F) -> Option<&CreatedObject>
	where
		F: Fn(&ObjectKind) -> bool,
	{
		self.effects.created.iter().find(|o| predicate(&o.kind))
	}
}
