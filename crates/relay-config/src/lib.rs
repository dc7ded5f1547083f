//! Configuration module for the relay synchronizer.
//!
//! Configuration is TOML. Values may reference environment variables as
//! `${VAR}` or `${VAR:-default}`, which are resolved before parsing, and a
//! file may pull other files in with `include = ["a.toml", "b.toml"]`.
//! Every top-level section must be defined exactly once across all files.

mod loader;

#[cfg(any(test, feature = "testing"))]
pub mod builders;

use regex::Regex;
use relay_types::{default_networks, NetworkConfig, NetworksConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the default rendering dumps the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration of the relay synchronizer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub relay: RelayConfig,
	#[serde(default = "default_networks")]
	pub networks: NetworksConfig,
	pub headers: HeadersConfig,
	pub account: AccountConfig,
	pub delivery: DeliveryConfig,
	#[serde(default)]
	pub sync: SyncConfig,
	#[serde(default)]
	pub coins: CoinsConfig,
}

/// Identity of this synchronizer and the relay module it drives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
	/// Name used in logs.
	pub id: String,
	/// Move module exposing `addHeaders` and `addHeadersWithRetarget`.
	#[serde(default = "default_relay_module")]
	pub module: String,
}

fn default_relay_module() -> String {
	"btcrelay".to_string()
}

/// Header source implementations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeadersConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Operator account implementations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Ledger client implementations and transaction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Gas budget for header submissions.
	#[serde(default = "default_gas_budget")]
	pub gas_budget: u64,
	/// Interval between effects polls while waiting for finality.
	#[serde(default = "default_finality_poll_interval_ms")]
	pub finality_poll_interval_ms: u64,
	/// Upper bound on waiting for a transaction's effects.
	#[serde(default = "default_finality_timeout_seconds")]
	pub finality_timeout_seconds: u64,
}

fn default_gas_budget() -> u64 {
	500_000_000
}

fn default_finality_poll_interval_ms() -> u64 {
	1_000
}

fn default_finality_timeout_seconds() -> u64 {
	60
}

/// Pacing of the synchronization loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
	/// Delay after a successful submission.
	#[serde(default = "default_success_interval_ms")]
	pub success_interval_ms: u64,
	/// Random extra delay added to `success_interval_ms`, at most this much.
	#[serde(default = "default_success_jitter_ms")]
	pub success_jitter_ms: u64,
	/// Delay after the first failure in a row.
	#[serde(default = "default_initial_backoff_ms")]
	pub initial_backoff_ms: u64,
	/// Cap on the failure delay.
	#[serde(default = "default_max_backoff_ms")]
	pub max_backoff_ms: u64,
	/// Growth factor between consecutive failure delays.
	#[serde(default = "default_backoff_multiplier")]
	pub backoff_multiplier: f64,
	/// Coin type paying network fees.
	#[serde(default = "default_gas_coin_type")]
	pub gas_coin_type: String,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			success_interval_ms: default_success_interval_ms(),
			success_jitter_ms: default_success_jitter_ms(),
			initial_backoff_ms: default_initial_backoff_ms(),
			max_backoff_ms: default_max_backoff_ms(),
			backoff_multiplier: default_backoff_multiplier(),
			gas_coin_type: default_gas_coin_type(),
		}
	}
}

fn default_success_interval_ms() -> u64 {
	500
}

fn default_success_jitter_ms() -> u64 {
	250
}

fn default_initial_backoff_ms() -> u64 {
	1_000
}

fn default_max_backoff_ms() -> u64 {
	60_000
}

fn default_backoff_multiplier() -> f64 {
	2.0
}

fn default_gas_coin_type() -> String {
	"0x2::sui::SUI".to_string()
}

/// Coin provisioning settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoinsConfig {
	/// Gas reserve as a percentage of the gas budget (120 = ×1.2).
	#[serde(default = "default_gas_buffer_percent")]
	pub gas_buffer_percent: u64,
	/// Selection passes before giving up.
	#[serde(default = "default_max_passes")]
	pub max_passes: u32,
	/// Gas budget of the corrective split transaction.
	#[serde(default = "default_split_gas_budget")]
	pub split_gas_budget: u64,
}

impl Default for CoinsConfig {
	fn default() -> Self {
		Self {
			gas_buffer_percent: default_gas_buffer_percent(),
			max_passes: default_max_passes(),
			split_gas_budget: default_split_gas_budget(),
		}
	}
}

fn default_gas_buffer_percent() -> u64 {
	120
}

fn default_max_passes() -> u32 {
	2
}

fn default_split_gas_budget() -> u64 {
	100_000_000
}

/// Replaces `${VAR}` and `${VAR:-default}` with values from the environment.
///
/// Inputs over 1 MiB are rejected before the regex runs.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures<'_>| {
		let name = &caps[1];
		match (std::env::var(name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path.display())))?;

		loader::ConfigLoader::new(base_dir).load_config(file_name).await
	}

	/// Returns the configuration of the network called `name`.
	pub fn network(&self, name: &str) -> Result<NetworkConfig, ConfigError> {
		self.networks.get(name).cloned().ok_or_else(|| {
			let mut known: Vec<_> = self.networks.keys().map(String::as_str).collect();
			known.sort_unstable();
			ConfigError::Validation(format!(
				"Network '{}' not found (known networks: {})",
				name,
				known.join(", ")
			))
		})
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.relay.id.is_empty() {
			return Err(ConfigError::Validation("Relay ID cannot be empty".into()));
		}
		if self.relay.module.is_empty() {
			return Err(ConfigError::Validation("Relay module cannot be empty".into()));
		}

		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"Networks configuration cannot be empty".into(),
			));
		}
		for (name, network) in &self.networks {
			if !(network.rpc_url.starts_with("http://") || network.rpc_url.starts_with("https://"))
			{
				return Err(ConfigError::Validation(format!(
					"Network '{}' rpc_url must be an http(s) URL",
					name
				)));
			}
		}

		validate_primary("headers", &self.headers.primary, &self.headers.implementations)?;
		validate_primary("account", &self.account.primary, &self.account.implementations)?;
		validate_primary(
			"delivery",
			&self.delivery.primary,
			&self.delivery.implementations,
		)?;

		if self.delivery.gas_budget == 0 {
			return Err(ConfigError::Validation(
				"delivery.gas_budget must be greater than 0".into(),
			));
		}
		if self.delivery.finality_poll_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"delivery.finality_poll_interval_ms must be greater than 0".into(),
			));
		}

		if self.sync.initial_backoff_ms == 0 {
			return Err(ConfigError::Validation(
				"sync.initial_backoff_ms must be greater than 0".into(),
			));
		}
		if self.sync.max_backoff_ms < self.sync.initial_backoff_ms {
			return Err(ConfigError::Validation(
				"sync.max_backoff_ms cannot be lower than sync.initial_backoff_ms".into(),
			));
		}
		if self.sync.backoff_multiplier < 1.0 {
			return Err(ConfigError::Validation(
				"sync.backoff_multiplier must be at least 1.0".into(),
			));
		}

		if self.coins.gas_buffer_percent < 100 {
			return Err(ConfigError::Validation(
				"coins.gas_buffer_percent must be at least 100".into(),
			));
		}
		if self.coins.max_passes == 0 {
			return Err(ConfigError::Validation(
				"coins.max_passes must be at least 1".into(),
			));
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a configuration string, resolving environment variables and
/// validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE: &str = r#"
[relay]
id = "relay-test"

[networks.testnet]
rpc_url = "https://sui-testnet-rpc.publicnode.com"
package_id = "0xabc"
relay_object_id = "0xdef"

[headers]
primary = "mempool"
[headers.implementations.mempool]

[account]
primary = "local"
[account.implementations.local]
private_key = "0x1111111111111111111111111111111111111111111111111111111111111111"

[delivery]
primary = "sui_rpc"
[delivery.implementations.sui_rpc]
"#;

	#[test]
	fn test_defaults_applied() {
		let config: Config = BASE.parse().unwrap();
		assert_eq!(config.relay.module, "btcrelay");
		assert_eq!(config.delivery.gas_budget, 500_000_000);
		assert_eq!(config.sync.success_interval_ms, 500);
		assert_eq!(config.sync.gas_coin_type, "0x2::sui::SUI");
		assert_eq!(config.coins.gas_buffer_percent, 120);
		assert_eq!(config.coins.max_passes, 2);
	}

	#[test]
	fn test_network_selection() {
		let config: Config = BASE.parse().unwrap();
		let network = config.network("testnet").unwrap();
		assert_eq!(network.relay_object_id.unwrap().as_str(), "0xdef");

		let err = config.network("regtest").unwrap_err();
		assert!(err.to_string().contains("Network 'regtest' not found"));
		assert!(err.to_string().contains("testnet"));
	}

	#[test]
	fn test_builtin_networks_when_section_missing() {
		let without_networks = BASE.replace(
			"[networks.testnet]\nrpc_url = \"https://sui-testnet-rpc.publicnode.com\"\npackage_id = \"0xabc\"\nrelay_object_id = \"0xdef\"\n",
			"",
		);
		let config: Config = without_networks.parse().unwrap();
		assert_eq!(config.networks.len(), 4);
		assert_eq!(
			config.network("local").unwrap().rpc_url,
			"http://127.0.0.1:9000"
		);
		assert!(config.network("mainnet").unwrap().package_id.is_none());
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("RELAY_TEST_NODE_HOST", "node.internal");
		let resolved = resolve_env_vars("url = \"http://${RELAY_TEST_NODE_HOST}:9000\"").unwrap();
		assert_eq!(resolved, "url = \"http://node.internal:9000\"");
		std::env::remove_var("RELAY_TEST_NODE_HOST");
	}

	#[test]
	fn test_env_var_default_and_missing() {
		let resolved = resolve_env_vars("budget = ${RELAY_TEST_UNSET_BUDGET:-42}").unwrap();
		assert_eq!(resolved, "budget = 42");

		let err = resolve_env_vars("key = \"${RELAY_TEST_UNSET_KEY}\"").unwrap_err();
		assert!(err.to_string().contains("RELAY_TEST_UNSET_KEY"));
	}

	#[test]
	fn test_primary_must_exist() {
		let broken = BASE.replace("primary = \"mempool\"", "primary = \"esplora\"");
		let err = broken.parse::<Config>().unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary headers 'esplora' not found in implementations"));
	}

	#[test]
	fn test_rejects_non_http_rpc_url() {
		let broken = BASE.replace("https://sui-testnet-rpc.publicnode.com", "ws://node");
		let err = broken.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("rpc_url must be an http(s) URL"));
	}

	#[test]
	fn test_rejects_gas_buffer_below_budget() {
		let broken = format!("{}\n[coins]\ngas_buffer_percent = 90\n", BASE);
		let err = broken.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("gas_buffer_percent"));
	}

	#[test]
	fn test_rejects_inverted_backoff_bounds() {
		let broken = format!(
			"{}\n[sync]\ninitial_backoff_ms = 5000\nmax_backoff_ms = 1000\n",
			BASE
		);
		let err = broken.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("max_backoff_ms"));
	}
}
