//! Response shapes of the Sui JSON-RPC API and their translation into the
//! relay's typed model.

use crate::DeliveryError;
use relay_types::{
	CoinRecord, CreatedObject, EffectsSummary, ExecutionStatus, ObjectId, ObjectKind, ObjectRef,
	TransactionDigest, TxResult,
};
use serde::{Deserialize, Deserializer};

/// Accepts a `u64` sent either as a JSON number or as a decimal string.
fn de_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Number(u64),
		Text(String),
	}

	match Raw::deserialize(deserializer)? {
		Raw::Number(n) => Ok(n),
		Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
	}
}

fn de_i128<'de, D>(deserializer: D) -> Result<i128, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Number(i64),
		Text(String),
	}

	match Raw::deserialize(deserializer)? {
		Raw::Number(n) => Ok(n as i128),
		Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
	}
}

#[derive(Debug, Deserialize)]
pub(super) struct ObjectResponse {
	pub data: Option<ObjectData>,
	pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ObjectData {
	pub object_id: String,
	#[serde(deserialize_with = "de_u64")]
	pub version: u64,
	pub digest: String,
	#[serde(rename = "type")]
	pub type_tag: Option<String>,
	pub content: Option<ObjectContent>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ObjectContent {
	#[serde(default)]
	pub fields: serde_json::Value,
}

impl ObjectData {
	pub fn object_ref(&self) -> ObjectRef {
		ObjectRef {
			object_id: ObjectId::new(self.object_id.clone()),
			version: self.version,
			digest: self.digest.clone(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CoinPage {
	pub data: Vec<CoinEntry>,
	pub next_cursor: Option<String>,
	pub has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CoinEntry {
	pub coin_type: String,
	pub coin_object_id: String,
	#[serde(deserialize_with = "de_u64")]
	pub version: u64,
	pub digest: String,
	#[serde(deserialize_with = "de_u64")]
	pub balance: u64,
}

impl From<CoinEntry> for CoinRecord {
	fn from(entry: CoinEntry) -> Self {
		CoinRecord {
			id: ObjectId::new(entry.coin_object_id),
			version: entry.version,
			digest: entry.digest,
			coin_type: entry.coin_type,
			balance: entry.balance,
		}
	}
}

/// Result of the `unsafe_*` transaction builders.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TransactionBytes {
	pub tx_bytes: String,
	#[serde(default)]
	pub gas: Vec<RawObjectRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawObjectRef {
	pub object_id: String,
	#[serde(deserialize_with = "de_u64")]
	pub version: u64,
	pub digest: String,
}

impl From<RawObjectRef> for ObjectRef {
	fn from(raw: RawObjectRef) -> Self {
		ObjectRef {
			object_id: ObjectId::new(raw.object_id),
			version: raw.version,
			digest: raw.digest,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TransactionResponse {
	pub digest: String,
	pub effects: Option<Effects>,
	pub object_changes: Option<Vec<ObjectChange>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Effects {
	pub status: Status,
	pub gas_used: Option<GasCost>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Status {
	pub status: String,
	pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GasCost {
	#[serde(deserialize_with = "de_i128")]
	pub computation_cost: i128,
	#[serde(deserialize_with = "de_i128")]
	pub storage_cost: i128,
	#[serde(deserialize_with = "de_i128")]
	pub storage_rebate: i128,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(super) enum ObjectChange {
	#[serde(rename_all = "camelCase")]
	Created {
		object_id: String,
		object_type: String,
	},
	#[serde(rename_all = "camelCase")]
	Published { package_id: String },
	#[serde(other)]
	Other,
}

impl TransactionResponse {
	pub fn into_result(self) -> Result<TxResult, DeliveryError> {
		let effects = self.effects.ok_or_else(|| {
			DeliveryError::InvalidResponse(format!("Transaction {} has no effects", self.digest))
		})?;

		let status = if effects.status.status == "success" {
			ExecutionStatus::Success
		} else {
			ExecutionStatus::Failure {
				error: effects
					.status
					.error
					.unwrap_or_else(|| effects.status.status.clone()),
			}
		};

		let created = self
			.object_changes
			.unwrap_or_default()
			.into_iter()
			.filter_map(|change| match change {
				ObjectChange::Created {
					object_id,
					object_type,
				} => Some(CreatedObject {
					object_id: ObjectId::new(object_id),
					kind: parse_object_kind(&object_type),
				}),
				ObjectChange::Published { package_id } => Some(CreatedObject {
					object_id: ObjectId::new(package_id),
					kind: ObjectKind::Package,
				}),
				ObjectChange::Other => None,
			})
			.collect();

		let gas_used = effects.gas_used.map(|gas| {
			let net = gas.computation_cost + gas.storage_cost - gas.storage_rebate;
			net.clamp(0, u64::MAX as i128) as u64
		});

		Ok(TxResult::from_effects(
			TransactionDigest(self.digest),
			EffectsSummary {
				status,
				created,
				gas_used,
			},
		))
	}
}

/// Classifies a Move type tag such as `0x2::coin::Coin<0x2::sui::SUI>`.
///
/// Framework addresses may come back short (`0x2`) or zero-padded to 64
/// hex digits; both spellings are accepted.
pub(super) fn parse_object_kind(type_tag: &str) -> ObjectKind {
	let (head, type_arg) = match type_tag.split_once('<') {
		Some((head, rest)) => (head, rest.strip_suffix('>')),
		None => (type_tag, None),
	};

	let mut parts = head.splitn(3, "::");
	let (Some(address), Some(module), Some(name)) = (parts.next(), parts.next(), parts.next())
	else {
		return ObjectKind::Other {
			type_tag: type_tag.to_string(),
		};
	};

	if !is_framework_address(address) {
		return ObjectKind::Other {
			type_tag: type_tag.to_string(),
		};
	}

	match (module, name, type_arg) {
		("coin", "Coin", Some(coin_type)) => ObjectKind::Coin {
			coin_type: coin_type.to_string(),
		},
		("coin", "TreasuryCap", Some(coin_type)) => ObjectKind::TreasuryCap {
			coin_type: coin_type.to_string(),
		},
		("package", "UpgradeCap", None) => ObjectKind::UpgradeCap,
		_ => ObjectKind::Other {
			type_tag: type_tag.to_string(),
		},
	}
}

fn is_framework_address(address: &str) -> bool {
	let digits = address.strip_prefix("0x").unwrap_or(address);
	digits.trim_start_matches('0') == "2"
}
