//! Submission planning.
//!
//! Given the relay watermark `h`, decides which headers the next submission
//! appends and which relay entry point it goes through:
//!
//! * the next height `h + 1` is batched 20 at a time while its offset in
//!   the difficulty period is below 1996, so a batch never reaches the next
//!   period boundary;
//! * from offset 1996 up to and including the period's closing header
//!   (offset 0), headers go one at a time;
//! * once a period boundary height has been accepted (`h % 2016 == 0`), the
//!   following submission is a retarget carrying the headers at
//!   `floor(h / 2016) * 2016` and `h`.

use relay_types::{
	RelayWatermark, SubmissionPlan, BATCH_CUTOFF, DIFFICULTY_PERIOD, HEADER_BATCH_SIZE,
};

/// Number of headers to append after `last_submitted_height`.
fn batch_len(last_submitted_height: u64) -> u64 {
	let offset = (last_submitted_height + 1) % DIFFICULTY_PERIOD;
	if offset != 0 && offset < BATCH_CUTOFF {
		HEADER_BATCH_SIZE
	} else {
		1
	}
}

/// Plans the next submission for the given watermark.
///
/// A watermark on a period boundary (`h % 2016 == 0`) retargets with
/// `h` as both period heights, so the header closing a period is first
/// accepted as a regular submission (2015 -> 2016 -> retarget at 2017).
pub fn plan_next(watermark: RelayWatermark) -> SubmissionPlan {
	let h = watermark.last_submitted_height;
	let next = watermark.next_height();
	let new_heights = next..next + batch_len(h);

	if h % DIFFICULTY_PERIOD == 0 {
		SubmissionPlan::Retarget {
			period_start_height: (h / DIFFICULTY_PERIOD) * DIFFICULTY_PERIOD,
			period_end_height: h,
			new_heights,
		}
	} else {
		SubmissionPlan::Regular {
			anchor_height: h,
			new_heights,
		}
	}
}
