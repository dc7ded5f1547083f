//! Relay watermark and submission plan types.
//!
//! A [`SubmissionPlan`] names the heights a cycle needs. Once those headers
//! are fetched it becomes a [`HeaderSubmission`], which carries the actual
//! header material for the relay call.

use crate::{BlockHeader, HeaderBatch};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Number of blocks in a Bitcoin difficulty period.
pub const DIFFICULTY_PERIOD: u64 = 2016;

/// Number of headers submitted together when a full batch is allowed.
pub const HEADER_BATCH_SIZE: u64 = 20;

/// Period offset from which only single headers are submitted.
pub const BATCH_CUTOFF: u64 = DIFFICULTY_PERIOD - HEADER_BATCH_SIZE;

/// Last Bitcoin height accepted by the relay contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelayWatermark {
	pub last_submitted_height: u64,
}

impl RelayWatermark {
	pub fn new(last_submitted_height: u64) -> Self {
		Self {
			last_submitted_height,
		}
	}

	/// Height of the next header the relay expects.
	pub fn next_height(&self) -> u64 {
		self.last_submitted_height + 1
	}
}

impl fmt::Display for RelayWatermark {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.last_submitted_height)
	}
}

/// Which relay entry point a submission goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionKind {
	Regular,
	Retarget,
}

impl fmt::Display for SubmissionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SubmissionKind::Regular => f.write_str("regular"),
			SubmissionKind::Retarget => f.write_str("retarget"),
		}
	}
}

/// Heights required for the next relay submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionPlan {
	/// Append anchored on the header at `anchor_height`.
	Regular {
		anchor_height: u64,
		new_heights: Range<u64>,
	},
	/// Append that also carries the bounds of the previous difficulty period.
	Retarget {
		period_start_height: u64,
		period_end_height: u64,
		new_heights: Range<u64>,
	},
}

impl SubmissionPlan {
	pub fn kind(&self) -> SubmissionKind {
		match self {
			SubmissionPlan::Regular { .. } => SubmissionKind::Regular,
			SubmissionPlan::Retarget { .. } => SubmissionKind::Retarget,
		}
	}

	/// Heights of the headers being appended.
	pub fn new_heights(&self) -> Range<u64> {
		match self {
			SubmissionPlan::Regular { new_heights, .. }
			| SubmissionPlan::Retarget { new_heights, .. } => new_heights.clone(),
		}
	}

	/// Number of headers being appended.
	pub fn header_count(&self) -> u64 {
		let range = self.new_heights();
		range.end - range.start
	}
}

/// A submission with all of its header material fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSubmission {
	Regular {
		anchor: BlockHeader,
		headers: HeaderBatch,
	},
	Retarget {
		period_start: BlockHeader,
		period_end: BlockHeader,
		headers: HeaderBatch,
	},
}

impl HeaderSubmission {
	pub fn kind(&self) -> SubmissionKind {
		match self {
			HeaderSubmission::Regular { .. } => SubmissionKind::Regular,
			HeaderSubmission::Retarget { .. } => SubmissionKind::Retarget,
		}
	}

	pub fn headers(&self) -> &HeaderBatch {
		match self {
			HeaderSubmission::Regular { headers, .. }
			| HeaderSubmission::Retarget { headers, .. } => headers,
		}
	}
}
