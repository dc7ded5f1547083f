//! Bitcoin header source module for the relay synchronizer.
//!
//! Headers are fetched from a block-explorer style provider in two steps:
//! height to block hash, then hash to raw header. The [`HeaderService`]
//! validates what the provider returns and assembles consecutive runs of
//! headers into [`HeaderBatch`]es.

use async_trait::async_trait;
use relay_types::{BlockHeader, ConfigSchema, HeaderBatch, ImplementationRegistry};
use std::ops::Range;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod mempool;
}

/// Errors that can occur while fetching headers.
#[derive(Debug, Error)]
pub enum HeaderError {
	/// The provider has no block at this height yet.
	#[error("No block at height {height} yet")]
	NotFound { height: u64 },
	/// Transport failure or unexpected response status.
	#[error("Network error: {0}")]
	Network(String),
	/// The provider returned something that is not an 80-byte header.
	#[error("Invalid header at height {height}: {reason}")]
	InvalidHeader { height: u64, reason: String },
	/// Implementation configuration is invalid.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

impl HeaderError {
	/// Provider lag, expected while following the chain tip.
	pub fn is_not_found(&self) -> bool {
		matches!(self, HeaderError::NotFound { .. })
	}
}

/// Trait defining the interface for header providers.
#[async_trait]
pub trait HeaderSourceInterface: Send + Sync {
	/// Returns the configuration schema for this header source.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves a height to the hash of the block at that height.
	///
	/// Fails with [`HeaderError::NotFound`] when the provider has not
	/// indexed that height.
	async fn block_hash(&self, height: u64) -> Result<String, HeaderError>;

	/// Fetches the hex-encoded header of the block with the given hash.
	async fn header_hex(&self, block_hash: &str) -> Result<String, HeaderError>;
}

/// Type alias for header source factory functions.
pub type HeaderSourceFactory =
	fn(&toml::Value) -> Result<Box<dyn HeaderSourceInterface>, HeaderError>;

/// Registry trait for header source implementations.
pub trait HeaderSourceRegistry: ImplementationRegistry<Factory = HeaderSourceFactory> {}

/// Get all registered header source implementations.
pub fn get_all_implementations() -> Vec<(&'static str, HeaderSourceFactory)> {
	use implementations::mempool;

	vec![(mempool::Registry::NAME, mempool::Registry::factory())]
}

/// Service that fetches and validates headers.
pub struct HeaderService {
	implementation: Box<dyn HeaderSourceInterface>,
}

impl HeaderService {
	pub fn new(implementation: Box<dyn HeaderSourceInterface>) -> Self {
		Self { implementation }
	}

	/// Fetches the header at `height`.
	pub async fn fetch_header(&self, height: u64) -> Result<BlockHeader, HeaderError> {
		let hash = self.implementation.block_hash(height).await?;
		let raw = self.implementation.header_hex(&hash).await?;

		BlockHeader::new(height, &raw).map_err(|e| HeaderError::InvalidHeader {
			height,
			reason: e.to_string(),
		})
	}

	/// Fetches every header in `heights`, in ascending order.
	///
	/// The first failure aborts the whole batch; no partial batch is
	/// returned.
	pub async fn fetch_header_batch(&self, heights: Range<u64>) -> Result<HeaderBatch, HeaderError> {
		let start = heights.start;
		let mut headers = Vec::with_capacity(heights.end.saturating_sub(start) as usize);
		for height in heights {
			headers.push(self.fetch_header(height).await?);
		}

		tracing::debug!(start, count = headers.len(), "Fetched header batch");
		HeaderBatch::new(start, headers).ok_or_else(|| HeaderError::InvalidHeader {
			height: start,
			reason: "empty header range".to_string(),
		})
	}
}
