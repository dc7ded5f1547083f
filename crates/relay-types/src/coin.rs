//! Coin object and gas plan types.
//!
//! The ledger tracks value as indivisible coin objects rather than balances,
//! so funding a transaction means picking objects and, when needed, splitting
//! one to get a separate object for the fee.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an on-chain object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl ObjectId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Versioned reference to an object, as required for gas payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
	pub object_id: ObjectId,
	pub version: u64,
	pub digest: String,
}

/// One coin object of a given asset type owned by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinRecord {
	pub id: ObjectId,
	pub version: u64,
	pub digest: String,
	pub coin_type: String,
	/// Balance in the asset's smallest unit.
	pub balance: u64,
}

impl CoinRecord {
	pub fn object_ref(&self) -> ObjectRef {
		ObjectRef {
			object_id: self.id.clone(),
			version: self.version,
			digest: self.digest.clone(),
		}
	}
}

/// Outcome of coin provisioning for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPlan {
	/// Coins funding the payload. Their balances sum to at least the payload.
	pub swap_coin_ids: Vec<ObjectId>,
	/// Coin split off exclusively for the fee, when a split was needed.
	pub dedicated_gas_coin_id: Option<ObjectId>,
}

impl GasPlan {
	/// Plan for calls with no payload coins, paying gas from any owned coin.
	pub fn gas_only() -> Self {
		Self {
			swap_coin_ids: Vec::new(),
			dedicated_gas_coin_id: None,
		}
	}
}

/// Kind of an on-chain object, classified by the ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
	Coin { coin_type: String },
	TreasuryCap { coin_type: String },
	UpgradeCap,
	Package,
	Other { type_tag: String },
}

impl ObjectKind {
	/// Returns true for a coin of exactly `coin_type`.
	pub fn is_coin_of(&self, coin_type: &str) -> bool {
		matches!(self, ObjectKind::Coin { coin_type: t } if t == coin_type)
	}
}
