//! Relay watermark reads.

use relay_delivery::{DeliveryError, DeliveryService};
use relay_types::{ObjectId, RelayWatermark};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Name of the watermark field on the relay object.
const WATERMARK_FIELD: &str = "lastSubmittedHeight";

#[derive(Debug, Error)]
pub enum StateError {
	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),
	#[error("Relay object has no '{0}' field")]
	MissingField(&'static str),
	#[error("Invalid '{field}' value: {value}")]
	InvalidField { field: &'static str, value: String },
}

/// Reads the relay's last accepted height from its shared object.
pub struct RelayStateReader {
	delivery: Arc<DeliveryService>,
	relay_object_id: ObjectId,
}

impl RelayStateReader {
	pub fn new(delivery: Arc<DeliveryService>, relay_object_id: ObjectId) -> Self {
		Self {
			delivery,
			relay_object_id,
		}
	}

	pub async fn read_watermark(&self) -> Result<RelayWatermark, StateError> {
		let object = self.delivery.get_object(&self.relay_object_id).await?;
		parse_watermark(&object.fields).map(RelayWatermark::new)
	}
}

/// `u64` Move fields are rendered as decimal strings; plain numbers are
/// accepted too.
fn parse_watermark(fields: &Value) -> Result<u64, StateError> {
	let value = fields
		.get(WATERMARK_FIELD)
		.ok_or(StateError::MissingField(WATERMARK_FIELD))?;

	let parsed = match value {
		Value::String(s) => s.parse().ok(),
		Value::Number(n) => n.as_u64(),
		_ => None,
	};
	parsed.ok_or_else(|| StateError::InvalidField {
		field: WATERMARK_FIELD,
		value: value.to_string(),
	})
}
