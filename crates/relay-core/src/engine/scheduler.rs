//! Pacing between sync cycles.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use relay_config::SyncConfig;
use std::time::Duration;

/// Decides how long the sync loop waits before its next cycle.
pub trait Scheduler: Send {
	/// Delay after a cycle that submitted successfully.
	fn on_success(&mut self) -> Duration;

	/// Delay after a failed cycle.
	fn on_failure(&mut self) -> Duration;
}

/// Jittered fixed interval after success, exponential backoff after
/// consecutive failures. A success resets the backoff.
pub struct BackoffScheduler {
	success_interval: Duration,
	success_jitter: Duration,
	max_backoff: Duration,
	backoff: ExponentialBackoff,
}

impl BackoffScheduler {
	pub fn new(config: &SyncConfig) -> Self {
		let max_backoff = Duration::from_millis(config.max_backoff_ms);
		let backoff = ExponentialBackoffBuilder::new()
			.with_initial_interval(Duration::from_millis(config.initial_backoff_ms))
			.with_multiplier(config.backoff_multiplier)
			.with_max_interval(max_backoff)
			.with_randomization_factor(0.0)
			.with_max_elapsed_time(None)
			.build();

		Self {
			success_interval: Duration::from_millis(config.success_interval_ms),
			success_jitter: Duration::from_millis(config.success_jitter_ms),
			max_backoff,
			backoff,
		}
	}
}

impl Scheduler for BackoffScheduler {
	fn on_success(&mut self) -> Duration {
		self.backoff.reset();
		let jitter_ms = self.success_jitter.as_millis() as u64;
		let jitter = match jitter_ms {
			0 => Duration::ZERO,
			_ => Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms)),
		};
		self.success_interval + jitter
	}

	fn on_failure(&mut self) -> Duration {
		// Never `None` without an elapsed-time limit.
		self.backoff.next_backoff().unwrap_or(self.max_backoff)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> SyncConfig {
		SyncConfig {
			success_interval_ms: 500,
			success_jitter_ms: 250,
			initial_backoff_ms: 1_000,
			max_backoff_ms: 8_000,
			backoff_multiplier: 2.0,
			..SyncConfig::default()
		}
	}

	#[test]
	fn test_failures_grow_and_cap() {
		let mut scheduler = BackoffScheduler::new(&config());
		let delays: Vec<u128> = (0..6).map(|_| scheduler.on_failure().as_millis()).collect();
		assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 8_000, 8_000]);
	}

	#[test]
	fn test_success_resets_backoff() {
		let mut scheduler = BackoffScheduler::new(&config());
		scheduler.on_failure();
		scheduler.on_failure();
		scheduler.on_success();
		assert_eq!(scheduler.on_failure().as_millis(), 1_000);
	}

	#[test]
	fn test_success_delay_within_jitter() {
		let mut scheduler = BackoffScheduler::new(&config());
		for _ in 0..50 {
			let delay = scheduler.on_success();
			assert!(delay >= Duration::from_millis(500));
			assert!(delay <= Duration::from_millis(750));
		}
	}

	#[test]
	fn test_zero_jitter_is_fixed() {
		let mut scheduler = BackoffScheduler::new(&SyncConfig {
			success_jitter_ms: 0,
			..config()
		});
		assert_eq!(scheduler.on_success(), Duration::from_millis(500));
	}
}
