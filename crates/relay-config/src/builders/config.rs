//! Fluent construction of [`Config`] values without a TOML file.

use crate::{
	AccountConfig, CoinsConfig, Config, DeliveryConfig, HeadersConfig, RelayConfig, SyncConfig,
};
use relay_types::{default_networks, NetworkConfig, ObjectId};
use std::collections::HashMap;

/// Builder for `Config` with defaults suited to tests.
///
/// Implementation tables are left empty; callers that go through the
/// factories supply their own mocks instead.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	relay_id: String,
	relay_module: String,
	network: Option<(String, NetworkConfig)>,
	gas_budget: u64,
	sync: SyncConfig,
	coins: CoinsConfig,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			relay_id: "test-relay".to_string(),
			relay_module: "btcrelay".to_string(),
			network: None,
			gas_budget: 500_000_000,
			sync: SyncConfig {
				success_interval_ms: 1,
				success_jitter_ms: 0,
				initial_backoff_ms: 1,
				max_backoff_ms: 10,
				..SyncConfig::default()
			},
			coins: CoinsConfig::default(),
		}
	}

	pub fn relay_id(mut self, id: impl Into<String>) -> Self {
		self.relay_id = id.into();
		self
	}

	pub fn relay_module(mut self, module: impl Into<String>) -> Self {
		self.relay_module = module.into();
		self
	}

	/// Adds a network with deployed package and relay object ids.
	pub fn network(mut self, name: impl Into<String>, package_id: &str, relay_object_id: &str) -> Self {
		let mut network = NetworkConfig::new("http://127.0.0.1:9000");
		network.package_id = Some(ObjectId::new(package_id));
		network.relay_object_id = Some(ObjectId::new(relay_object_id));
		self.network = Some((name.into(), network));
		self
	}

	pub fn gas_budget(mut self, budget: u64) -> Self {
		self.gas_budget = budget;
		self
	}

	pub fn sync(mut self, sync: SyncConfig) -> Self {
		self.sync = sync;
		self
	}

	pub fn coins(mut self, coins: CoinsConfig) -> Self {
		self.coins = coins;
		self
	}

	pub fn build(self) -> Config {
		let mut networks = default_networks();
		if let Some((name, network)) = self.network {
			networks.insert(name, network);
		}

		Config {
			relay: RelayConfig {
				id: self.relay_id,
				module: self.relay_module,
			},
			networks,
			headers: HeadersConfig {
				primary: "mempool".to_string(),
				implementations: HashMap::new(),
			},
			account: AccountConfig {
				primary: "local".to_string(),
				implementations: HashMap::new(),
			},
			delivery: DeliveryConfig {
				primary: "sui_rpc".to_string(),
				implementations: HashMap::new(),
				gas_budget: self.gas_budget,
				finality_poll_interval_ms: 10,
				finality_timeout_seconds: 1,
			},
			sync: self.sync,
			coins: self.coins,
		}
	}
}
