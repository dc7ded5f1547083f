//! Sync engine for the relay synchronizer.
//!
//! One cycle reads the relay watermark, plans the next submission, fetches
//! the headers it needs and submits them through the relay module. The
//! loop repeats cycles until shutdown, pacing itself with a [`Scheduler`].

use crate::coins::{CoinProvisioner, ProvisionError};
use crate::planner::plan_next;
use relay_config::Config;
use relay_delivery::{ensure_success, DeliveryError, DeliveryService};
use relay_headers::{HeaderError, HeaderService};
use relay_types::{
	truncate_id, Address, CallArg, CallSpec, GasPlan, HeaderSubmission, NetworkConfig, ObjectId,
	RelayWatermark, SubmissionKind, SubmissionPlan, TransactionDigest,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

pub mod scheduler;
pub mod state;

use scheduler::{BackoffScheduler, Scheduler};
use state::{RelayStateReader, StateError};

/// Relay entry point for a regular batch.
const ADD_HEADERS: &str = "addHeaders";
/// Relay entry point for the first batch after a period boundary.
const ADD_HEADERS_WITH_RETARGET: &str = "addHeadersWithRetarget";

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Header error: {0}")]
	Headers(#[from] HeaderError),
	#[error("State error: {0}")]
	State(#[from] StateError),
	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),
	#[error("Provisioning error: {0}")]
	Provision(#[from] ProvisionError),
}

impl EngineError {
	/// The Bitcoin chain has not produced the requested block yet.
	pub fn is_waiting_for_blocks(&self) -> bool {
		matches!(self, EngineError::Headers(e) if e.is_not_found())
	}
}

/// Deployed relay the engine submits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
	pub package_id: ObjectId,
	pub relay_object_id: ObjectId,
	pub module: String,
}

impl RelayTarget {
	/// Reads the package and relay object ids of a network.
	pub fn from_network(network: &NetworkConfig, module: &str) -> Result<Self, EngineError> {
		let package_id = network.package_id.clone().ok_or_else(|| {
			EngineError::Config(format!("Network {} has no package_id", network.rpc_url))
		})?;
		let relay_object_id = network.relay_object_id.clone().ok_or_else(|| {
			EngineError::Config(format!("Network {} has no relay_object_id", network.rpc_url))
		})?;

		Ok(Self {
			package_id,
			relay_object_id,
			module: module.to_string(),
		})
	}
}

/// Result of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
	/// Watermark the cycle started from.
	pub watermark: RelayWatermark,
	pub kind: SubmissionKind,
	pub first_height: u64,
	pub last_height: u64,
	pub digest: TransactionDigest,
}

impl CycleOutcome {
	pub fn submitted(&self) -> u64 {
		self.last_height - self.first_height + 1
	}
}

/// Keeps the relay caught up with the Bitcoin chain.
pub struct SyncEngine {
	relay_id: String,
	target: RelayTarget,
	gas_budget: u64,
	gas_coin_type: String,
	headers: Arc<HeaderService>,
	delivery: Arc<DeliveryService>,
	state: RelayStateReader,
	coins: Arc<CoinProvisioner>,
	scheduler: Mutex<Box<dyn Scheduler>>,
}

impl SyncEngine {
	pub fn new(
		config: &Config,
		target: RelayTarget,
		headers: Arc<HeaderService>,
		delivery: Arc<DeliveryService>,
	) -> Self {
		let state = RelayStateReader::new(delivery.clone(), target.relay_object_id.clone());
		let coins = Arc::new(CoinProvisioner::new(
			delivery.clone(),
			config.coins.clone(),
			config.sync.gas_coin_type.clone(),
		));

		Self {
			relay_id: config.relay.id.clone(),
			target,
			gas_budget: config.delivery.gas_budget,
			gas_coin_type: config.sync.gas_coin_type.clone(),
			headers,
			delivery,
			state,
			coins,
			scheduler: Mutex::new(Box::new(BackoffScheduler::new(&config.sync))),
		}
	}

	/// Replaces the default backoff scheduler.
	pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
		self.scheduler = Mutex::new(scheduler);
		self
	}

	pub fn target(&self) -> &RelayTarget {
		&self.target
	}

	pub fn delivery(&self) -> &Arc<DeliveryService> {
		&self.delivery
	}

	pub fn coins(&self) -> &Arc<CoinProvisioner> {
		&self.coins
	}

	/// Checks that the operator can pay gas and the relay object is
	/// readable. Returns the operator address.
	pub async fn initialize(&self) -> Result<Address, EngineError> {
		let address = self.delivery.sender().await?;

		match self
			.coins
			.check_required(&[(self.gas_coin_type.as_str(), "gas")])
			.await
		{
			Ok(()) => {},
			Err(ProvisionError::NoCoins { coin_type }) => {
				return Err(EngineError::Config(format!(
					"Operator {} owns no {} coins to pay gas",
					address, coin_type
				)));
			},
			Err(e) => return Err(e.into()),
		}

		let watermark = self.state.read_watermark().await?;
		tracing::info!(
			relay = %self.relay_id,
			operator = %address,
			package = %truncate_id(self.target.package_id.as_str()),
			relay_object = %truncate_id(self.target.relay_object_id.as_str()),
			watermark = %watermark,
			"Relay synchronizer initialized"
		);
		Ok(address)
	}

	/// Runs one read-plan-fetch-submit cycle.
	///
	/// Nothing is submitted unless every header of the batch was fetched.
	/// An aborted transaction is reported as [`DeliveryError::TransactionFailed`].
	#[instrument(skip_all, fields(relay = %self.relay_id))]
	pub async fn run_cycle(&self) -> Result<CycleOutcome, EngineError> {
		let watermark = self.state.read_watermark().await?;
		let plan = plan_next(watermark);
		tracing::debug!(
			watermark = %watermark,
			kind = %plan.kind(),
			from = plan.new_heights().start,
			count = plan.header_count(),
			"Planned submission"
		);

		let submission = self.fetch_submission(&plan).await?;
		let call = self.build_call(&submission);
		let result = self
			.delivery
			.submit(&call, &GasPlan::gas_only(), self.gas_budget)
			.await?;
		let result = ensure_success(result)?;

		let headers = submission.headers();
		Ok(CycleOutcome {
			watermark,
			kind: submission.kind(),
			first_height: headers.start_height(),
			last_height: headers.end_height(),
			digest: result.digest,
		})
	}

	/// Fetches the new headers first, then the anchor headers the plan
	/// refers to.
	async fn fetch_submission(&self, plan: &SubmissionPlan) -> Result<HeaderSubmission, HeaderError> {
		let headers = self.headers.fetch_header_batch(plan.new_heights()).await?;

		match plan {
			SubmissionPlan::Regular { anchor_height, .. } => Ok(HeaderSubmission::Regular {
				anchor: self.headers.fetch_header(*anchor_height).await?,
				headers,
			}),
			SubmissionPlan::Retarget {
				period_start_height,
				period_end_height,
				..
			} => {
				let period_start = self.headers.fetch_header(*period_start_height).await?;
				let period_end = if period_end_height == period_start_height {
					period_start.clone()
				} else {
					self.headers.fetch_header(*period_end_height).await?
				};
				Ok(HeaderSubmission::Retarget {
					period_start,
					period_end,
					headers,
				})
			},
		}
	}

	fn build_call(&self, submission: &HeaderSubmission) -> CallSpec {
		let relay = CallArg::Object(self.target.relay_object_id.clone());
		let (function, mut arguments) = match submission {
			HeaderSubmission::Regular { anchor, .. } => {
				(ADD_HEADERS, vec![relay, CallArg::Pure(json!(anchor.raw_hex))])
			},
			HeaderSubmission::Retarget {
				period_start,
				period_end,
				..
			} => (
				ADD_HEADERS_WITH_RETARGET,
				vec![
					relay,
					CallArg::Pure(json!(period_start.raw_hex)),
					CallArg::Pure(json!(period_end.raw_hex)),
				],
			),
		};
		arguments.push(CallArg::Pure(json!(submission.headers().concat_hex())));

		CallSpec::MoveCall {
			package: self.target.package_id.clone(),
			module: self.target.module.clone(),
			function: function.to_string(),
			type_arguments: Vec::new(),
			arguments,
		}
	}

	/// Main loop: initializes, then runs cycles until Ctrl-C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
				std::future::pending::<()>().await;
			}
		})
		.await
	}

	/// Runs cycles until `shutdown` completes. Cycle failures are logged
	/// and retried after a backoff; only initialization errors end the loop.
	pub async fn run_until<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		self.initialize().await?;
		tokio::pin!(shutdown);

		loop {
			let delay = tokio::select! {
				outcome = self.run_cycle() => self.next_delay(outcome).await,
				_ = &mut shutdown => break,
			};

			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				_ = &mut shutdown => break,
			}
		}

		tracing::info!(relay = %self.relay_id, "Relay synchronizer stopped");
		Ok(())
	}

	async fn next_delay(&self, outcome: Result<CycleOutcome, EngineError>) -> Duration {
		let mut scheduler = self.scheduler.lock().await;
		match outcome {
			Ok(outcome) => {
				tracing::info!(
					kind = %outcome.kind,
					from = outcome.first_height,
					to = outcome.last_height,
					digest = %truncate_id(&outcome.digest.0),
					"Submitted headers"
				);
				scheduler.on_success()
			},
			Err(e) if e.is_waiting_for_blocks() => {
				tracing::info!(error = %e, "Waiting for new blocks");
				scheduler.on_failure()
			},
			Err(e) => {
				tracing::warn!(error = %e, "Sync cycle failed");
				scheduler.on_failure()
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{MockChain, MockLedger};
	use relay_config::builders::ConfigBuilder;

	const PACKAGE: &str = "0xp1";
	const RELAY: &str = "0xrelay";
	const SUI: &str = "0x2::sui::SUI";

	fn engine(ledger: &MockLedger, chain: &MockChain) -> SyncEngine {
		let config = ConfigBuilder::new().network("test", PACKAGE, RELAY).build();
		let network = config.network("test").unwrap();
		let target = RelayTarget::from_network(&network, &config.relay.module).unwrap();
		SyncEngine::new(&config, target, chain.service(), ledger.delivery())
	}

	fn funded_ledger(height: u64) -> MockLedger {
		let ledger = MockLedger::new();
		ledger.add_coins(&[("0xgas", 10_000_000_000)], SUI);
		ledger.set_relay(RELAY, height);
		ledger
	}

	fn concat(heights: std::ops::Range<u64>) -> String {
		heights.map(MockChain::raw_header).collect()
	}

	#[test]
	fn test_target_requires_deployment_ids() {
		let network = NetworkConfig::new("http://127.0.0.1:9000");
		assert!(matches!(
			RelayTarget::from_network(&network, "btcrelay"),
			Err(EngineError::Config(_))
		));
	}

	#[tokio::test]
	async fn test_regular_cycle_submits_batch() {
		let ledger = funded_ledger(100);
		let chain = MockChain::with_tip(200);
		let engine = engine(&ledger, &chain);

		let outcome = engine.run_cycle().await.unwrap();
		assert_eq!(outcome.watermark, RelayWatermark::new(100));
		assert_eq!(outcome.kind, SubmissionKind::Regular);
		assert_eq!((outcome.first_height, outcome.last_height), (101, 120));
		assert_eq!(outcome.submitted(), 20);
		assert_eq!(ledger.relay_height(), Some(120));

		let executed = ledger.executed();
		assert_eq!(
			executed,
			vec![CallSpec::MoveCall {
				package: ObjectId::new(PACKAGE),
				module: "btcrelay".to_string(),
				function: "addHeaders".to_string(),
				type_arguments: vec![],
				arguments: vec![
					CallArg::Object(ObjectId::new(RELAY)),
					CallArg::Pure(json!(MockChain::raw_header(100))),
					CallArg::Pure(json!(concat(101..121))),
				],
			}]
		);
		assert_eq!(ledger.gas_payments()[0].budget, 500_000_000);
		assert_eq!(ledger.gas_payments()[0].coin, None);
	}

	#[tokio::test]
	async fn test_retarget_cycle_after_boundary() {
		let ledger = funded_ledger(4032);
		let chain = MockChain::with_tip(5000);
		let engine = engine(&ledger, &chain);

		let outcome = engine.run_cycle().await.unwrap();
		assert_eq!(outcome.kind, SubmissionKind::Retarget);
		assert_eq!((outcome.first_height, outcome.last_height), (4033, 4052));

		let CallSpec::MoveCall {
			function,
			arguments,
			..
		} = &ledger.executed()[0]
		else {
			panic!("expected a move call");
		};
		assert_eq!(function, "addHeadersWithRetarget");
		assert_eq!(arguments.len(), 4);
		assert_eq!(arguments[1], CallArg::Pure(json!(MockChain::raw_header(4032))));
		assert_eq!(arguments[2], arguments[1]);

		// Start and end of the period coincide, so the header is fetched once.
		let requests = chain.requests();
		assert_eq!(requests.len(), 21);
		assert_eq!(requests.last(), Some(&4032));
	}

	#[tokio::test]
	async fn test_boundary_sequence() {
		let ledger = funded_ledger(2014);
		let chain = MockChain::with_tip(3000);
		let engine = engine(&ledger, &chain);

		let first = engine.run_cycle().await.unwrap();
		assert_eq!((first.kind, first.first_height, first.last_height), (SubmissionKind::Regular, 2015, 2015));

		let second = engine.run_cycle().await.unwrap();
		assert_eq!((second.kind, second.first_height, second.last_height), (SubmissionKind::Regular, 2016, 2016));

		let third = engine.run_cycle().await.unwrap();
		assert_eq!((third.kind, third.first_height, third.last_height), (SubmissionKind::Retarget, 2017, 2036));
		assert_eq!(ledger.relay_height(), Some(2036));
	}

	#[tokio::test]
	async fn test_incomplete_batch_submits_nothing() {
		let ledger = funded_ledger(100);
		let chain = MockChain::with_tip(110);
		let engine = engine(&ledger, &chain);

		let err = engine.run_cycle().await.unwrap_err();
		assert!(err.is_waiting_for_blocks());
		assert!(ledger.executed().is_empty());
		assert_eq!(ledger.relay_height(), Some(100));
	}

	#[tokio::test]
	async fn test_aborted_submission_is_an_error() {
		let ledger = funded_ledger(100);
		ledger.abort_next("MoveAbort(btcrelay, 12) in command 0");
		let chain = MockChain::with_tip(200);
		let engine = engine(&ledger, &chain);

		let err = engine.run_cycle().await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Delivery(DeliveryError::TransactionFailed { ref reason, .. }) if reason.contains("MoveAbort")
		));
		assert!(!err.is_waiting_for_blocks());
		assert_eq!(ledger.relay_height(), Some(100));

		// The next cycle retries from the same watermark.
		let outcome = engine.run_cycle().await.unwrap();
		assert_eq!(outcome.first_height, 101);
	}

	#[tokio::test]
	async fn test_initialize_requires_gas_coins() {
		let ledger = MockLedger::new();
		ledger.set_relay(RELAY, 100);
		let chain = MockChain::with_tip(200);
		let engine = engine(&ledger, &chain);

		assert!(matches!(
			engine.initialize().await,
			Err(EngineError::Config(_))
		));

		ledger.add_coins(&[("0xgas", 1_000_000_000)], SUI);
		let address = engine.initialize().await.unwrap();
		assert_eq!(
			address.0,
			"0x0881c07520943bbf13989b92892093c1b50672156fa5f873c22892701cb2e207"
		);
	}

	#[tokio::test]
	async fn test_initialize_requires_relay_object() {
		let ledger = MockLedger::new();
		ledger.add_coins(&[("0xgas", 1_000_000_000)], SUI);
		let chain = MockChain::with_tip(200);
		let engine = engine(&ledger, &chain);

		assert!(matches!(
			engine.initialize().await,
			Err(EngineError::State(StateError::Delivery(DeliveryError::NotFound(_))))
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_run_catches_up_and_keeps_waiting() {
		let ledger = funded_ledger(100);
		let chain = MockChain::with_tip(160);
		let engine = engine(&ledger, &chain);

		engine
			.run_until(tokio::time::sleep(Duration::from_secs(1)))
			.await
			.unwrap();

		assert_eq!(ledger.relay_height(), Some(160));
		assert_eq!(ledger.executed().len(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_run_picks_up_new_blocks() {
		let ledger = funded_ledger(100);
		let chain = MockChain::with_tip(110);
		let engine = engine(&ledger, &chain);

		let grow = {
			let chain = chain.clone();
			async move {
				tokio::time::sleep(Duration::from_millis(200)).await;
				chain.set_tip(125);
				tokio::time::sleep(Duration::from_millis(800)).await;
			}
		};
		engine.run_until(grow).await.unwrap();

		// 101..=120 as one batch once the tip passed 120; 121..=125 never
		// fill a batch.
		assert_eq!(ledger.relay_height(), Some(120));
		assert_eq!(ledger.executed().len(), 1);
	}
}
