//! Esplora-compatible HTTP header source, as served by mempool.space.
//!
//! Endpoints:
//! * `GET {base_url}/api/block-height/{height}` returns the block hash
//! * `GET {base_url}/api/block/{hash}/header` returns the 80-byte header as hex

use crate::{HeaderError, HeaderSourceInterface};
use async_trait::async_trait;
use relay_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use reqwest::StatusCode;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://mempool.space";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Header source backed by the mempool.space REST API.
pub struct MempoolSource {
	client: reqwest::Client,
	base_url: String,
}

impl MempoolSource {
	pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HeaderError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| HeaderError::Network(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}

	/// GETs `path` and returns the trimmed body text.
	///
	/// `height` is reported in `NotFound` when the provider does not know
	/// the requested block.
	async fn get_text(&self, path: &str, height: Option<u64>) -> Result<String, HeaderError> {
		let url = format!("{}{}", self.base_url, path);
		let response = self
			.client
			.get(&url)
			.send()
			.await
			.map_err(|e| HeaderError::Network(format!("GET {} failed: {}", url, e)))?;

		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| HeaderError::Network(format!("Reading {} failed: {}", url, e)))?;

		if status.is_success() {
			return Ok(body.trim().to_string());
		}

		match height {
			Some(height) if is_not_found(status, &body) => Err(HeaderError::NotFound { height }),
			_ => Err(HeaderError::Network(format!(
				"GET {} returned {}: {}",
				url,
				status,
				body.trim()
			))),
		}
	}
}

/// The provider answers 404 for unknown hashes and 400 with a "Block height
/// out of range" body for heights past its tip.
fn is_not_found(status: StatusCode, body: &str) -> bool {
	status == StatusCode::NOT_FOUND || body.to_lowercase().contains("out of range")
}

/// Configuration schema for the mempool header source.
pub struct MempoolSourceSchema;

impl ConfigSchema for MempoolSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("base_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("base_url must be an http(s) URL".to_string()),
					}
				}),
				Field::new(
					"timeout_seconds",
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
impl HeaderSourceInterface for MempoolSource {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MempoolSourceSchema)
	}

	async fn block_hash(&self, height: u64) -> Result<String, HeaderError> {
		self.get_text(&format!("/api/block-height/{}", height), Some(height))
			.await
	}

	async fn header_hex(&self, block_hash: &str) -> Result<String, HeaderError> {
		self.get_text(&format!("/api/block/{}/header", block_hash), None)
			.await
	}
}

/// Factory function to create a mempool header source from configuration.
///
/// Configuration parameters:
/// - `base_url`: API root (default `https://mempool.space`)
/// - `timeout_seconds`: per-request timeout (default 30)
pub fn create_source(config: &toml::Value) -> Result<Box<dyn HeaderSourceInterface>, HeaderError> {
	MempoolSourceSchema
		.validate(config)
		.map_err(|e| HeaderError::InvalidConfig(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL);
	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(MempoolSource::new(
		base_url,
		Duration::from_secs(timeout_seconds),
	)?))
}

/// Registry for the mempool header source.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "mempool";
	type Factory = crate::HeaderSourceFactory;

	fn factory() -> Self::Factory {
		create_source
	}
}

impl crate::HeaderSourceRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_not_found_detection() {
		assert!(is_not_found(StatusCode::NOT_FOUND, ""));
		assert!(is_not_found(
			StatusCode::BAD_REQUEST,
			"Block height out of range"
		));
		assert!(!is_not_found(StatusCode::BAD_GATEWAY, "upstream error"));
	}

	#[test]
	fn test_factory_defaults_and_validation() {
		let empty = toml::Value::Table(toml::Table::new());
		assert!(create_source(&empty).is_ok());

		let config: toml::Value =
			toml::from_str("base_url = \"https://mempool.space/testnet/\"").unwrap();
		assert!(create_source(&config).is_ok());

		let config: toml::Value = toml::from_str("base_url = \"mempool.space\"").unwrap();
		assert!(matches!(
			create_source(&config),
			Err(HeaderError::InvalidConfig(_))
		));

		let config: toml::Value = toml::from_str("timeout_seconds = 0").unwrap();
		assert!(create_source(&config).is_err());
	}

	#[test]
	fn test_trailing_slash_trimmed() {
		let source =
			MempoolSource::new("https://mempool.space/", Duration::from_secs(5)).unwrap();
		assert_eq!(source.base_url, "https://mempool.space");
	}
}
