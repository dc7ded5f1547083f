//! Bitcoin block header types.
//!
//! Headers are kept in their canonical hex form because that is what the
//! relay contract consumes. The height is not part of the 80 header bytes and
//! is carried alongside them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of a serialized Bitcoin block header in bytes.
pub const BLOCK_HEADER_SIZE: usize = 80;

/// Length of a block header encoded as hex.
pub const BLOCK_HEADER_HEX_LEN: usize = BLOCK_HEADER_SIZE * 2;

/// Errors raised when a header string is not a valid 80-byte header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderFormatError {
	#[error("expected {expected} hex characters, got {actual}")]
	InvalidLength { expected: usize, actual: usize },
	#[error("header is not valid hex: {0}")]
	InvalidHex(String),
}

/// A single Bitcoin block header at a known height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
	/// Position of the block in the chain.
	pub height: u64,
	/// Lowercase hex encoding of the 80 header bytes.
	pub raw_hex: String,
}

impl BlockHeader {
	/// Validates and wraps a header fetched for `height`.
	///
	/// Surrounding whitespace is trimmed and the hex is lowercased.
	pub fn new(height: u64, raw_hex: &str) -> Result<Self, HeaderFormatError> {
		let trimmed = raw_hex.trim();
		if trimmed.len() != BLOCK_HEADER_HEX_LEN {
			return Err(HeaderFormatError::InvalidLength {
				expected: BLOCK_HEADER_HEX_LEN,
				actual: trimmed.len(),
			});
		}
		hex::decode(trimmed).map_err(|e| HeaderFormatError::InvalidHex(e.to_string()))?;

		Ok(Self {
			height,
			raw_hex: trimmed.to_lowercase(),
		})
	}

	/// Returns the raw header bytes.
	pub fn to_bytes(&self) -> Vec<u8> {
		// Validated on construction.
		hex::decode(&self.raw_hex).unwrap_or_default()
	}
}

/// A run of consecutive headers, ordered by height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderBatch {
	start_height: u64,
	headers: Vec<BlockHeader>,
}

impl HeaderBatch {
	/// Builds a batch from headers that must start at `start_height` and be
	/// strictly consecutive. Returns `None` otherwise.
	pub fn new(start_height: u64, headers: Vec<BlockHeader>) -> Option<Self> {
		if headers.is_empty() {
			return None;
		}
		let consecutive = headers
			.iter()
			.enumerate()
			.all(|(i, h)| h.height == start_height + i as u64);
		consecutive.then_some(Self {
			start_height,
			headers,
		})
	}

	/// Batch holding a single header.
	pub fn single(header: BlockHeader) -> Self {
		Self {
			start_height: header.height,
			headers: vec![header],
		}
	}

	pub fn start_height(&self) -> u64 {
		self.start_height
	}

	/// Height of the last header in the batch.
	pub fn end_height(&self) -> u64 {
		self.start_height + self.headers.len() as u64 - 1
	}

	pub fn len(&self) -> usize {
		self.headers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.headers.is_empty()
	}

	pub fn headers(&self) -> &[BlockHeader] {
		&self.headers
	}

	/// Concatenated hex of all headers, in height order.
	///
	/// This is the blob passed to the relay as the new headers argument.
	pub fn concat_hex(&self) -> String {
		self.headers.iter().map(|h| h.raw_hex.as_str()).collect()
	}
}
