//! Builder pattern for constructing sync engines.
//!
//! Composes a [`SyncEngine`] from the header source, account and ledger
//! implementations named in the configuration, using factory functions
//! keyed by implementation name.

use crate::engine::{RelayTarget, SyncEngine};
use relay_account::{AccountError, AccountInterface, AccountService};
use relay_config::Config;
use relay_delivery::{DeliveryError, DeliveryService, LedgerInterface};
use relay_headers::{HeaderError, HeaderService, HeaderSourceInterface};
use relay_types::NetworkConfig;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for each component, keyed by implementation name.
pub struct RelayFactories<HF, AF, DF> {
	pub header_factories: HashMap<String, HF>,
	pub account_factories: HashMap<String, AF>,
	pub delivery_factories: HashMap<String, DF>,
}

/// Builder for a [`SyncEngine`] bound to one network.
pub struct RelayBuilder {
	config: Config,
	network: NetworkConfig,
}

impl RelayBuilder {
	/// The network is resolved by the caller and passed in as-is.
	pub fn new(config: Config, network: NetworkConfig) -> Self {
		Self { config, network }
	}

	/// Builds the SyncEngine using factories for each component type.
	pub async fn build<HF, AF, DF>(
		self,
		factories: RelayFactories<HF, AF, DF>,
	) -> Result<SyncEngine, BuilderError>
	where
		HF: Fn(&toml::Value) -> Result<Box<dyn HeaderSourceInterface>, HeaderError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
		DF: Fn(&toml::Value, &NetworkConfig) -> Result<Box<dyn LedgerInterface>, DeliveryError>,
	{
		let target = RelayTarget::from_network(&self.network, &self.config.relay.module)
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		let source = load_primary(
			"headers",
			&self.config.headers.primary,
			&self.config.headers.implementations,
			&factories.header_factories,
			|factory, config| factory(config),
		)?;
		let headers = Arc::new(HeaderService::new(source));

		let account = load_primary(
			"account",
			&self.config.account.primary,
			&self.config.account.implementations,
			&factories.account_factories,
			|factory, config| factory(config),
		)?;
		let account = Arc::new(AccountService::new(account));

		// Fetch the operator address once so key problems surface at startup
		let address = account.get_address().await.map_err(|e| {
			tracing::error!(component = "account", error = %e, "Failed to get operator address");
			BuilderError::Config(format!("Failed to get operator address: {}", e))
		})?;
		tracing::info!(component = "account", address = %address, "Operator address");

		let network = &self.network;
		let ledger = load_primary(
			"delivery",
			&self.config.delivery.primary,
			&self.config.delivery.implementations,
			&factories.delivery_factories,
			|factory, config| factory(config, network),
		)?;
		let delivery = Arc::new(DeliveryService::new(
			ledger,
			account,
			Duration::from_millis(self.config.delivery.finality_poll_interval_ms),
			Duration::from_secs(self.config.delivery.finality_timeout_seconds),
		));

		Ok(SyncEngine::new(&self.config, target, headers, delivery))
	}
}

/// Creates every configured implementation that has a factory and returns
/// the primary one.
fn load_primary<F, T, E>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
	create: impl Fn(&F, &toml::Value) -> Result<T, E>,
) -> Result<T, BuilderError>
where
	E: Display,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};

		match create(factory, config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{MockChain, MockLedger, OPERATOR_KEY};
	use relay_account::implementations::local::create_account;
	use relay_config::builders::ConfigBuilder;

	type HeaderFactory = fn(&toml::Value) -> Result<Box<dyn HeaderSourceInterface>, HeaderError>;
	type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;
	type LedgerFactory =
		fn(&toml::Value, &NetworkConfig) -> Result<Box<dyn LedgerInterface>, DeliveryError>;

	fn mock_headers(_: &toml::Value) -> Result<Box<dyn HeaderSourceInterface>, HeaderError> {
		Ok(Box::new(MockChain::with_tip(10)))
	}

	fn mock_ledger(
		_: &toml::Value,
		_: &NetworkConfig,
	) -> Result<Box<dyn LedgerInterface>, DeliveryError> {
		Ok(Box::new(MockLedger::new()))
	}

	fn failing_ledger(
		_: &toml::Value,
		_: &NetworkConfig,
	) -> Result<Box<dyn LedgerInterface>, DeliveryError> {
		Err(DeliveryError::InvalidConfig("rpc_url must be an http(s) URL".into()))
	}

	fn factories(ledger: LedgerFactory) -> RelayFactories<HeaderFactory, AccountFactory, LedgerFactory> {
		RelayFactories {
			header_factories: HashMap::from([("mempool".to_string(), mock_headers as HeaderFactory)]),
			account_factories: HashMap::from([("local".to_string(), create_account as AccountFactory)]),
			delivery_factories: HashMap::from([("sui_rpc".to_string(), ledger)]),
		}
	}

	fn config() -> Config {
		let empty = toml::Value::Table(toml::Table::new());
		let mut account = toml::Table::new();
		account.insert("private_key".into(), OPERATOR_KEY.into());

		let mut config = ConfigBuilder::new().network("test", "0xp1", "0xrelay").build();
		config.headers.implementations.insert("mempool".into(), empty.clone());
		config.account.implementations.insert("local".into(), toml::Value::Table(account));
		config.delivery.implementations.insert("sui_rpc".into(), empty);
		config
	}

	#[tokio::test]
	async fn test_build_wires_primary_implementations() {
		let config = config();
		let network = config.network("test").unwrap();

		let engine = RelayBuilder::new(config, network)
			.build(factories(mock_ledger))
			.await
			.unwrap();

		assert_eq!(engine.target().module, "btcrelay");
		assert_eq!(engine.target().relay_object_id.as_str(), "0xrelay");
		let sender = engine.delivery().sender().await.unwrap();
		assert_eq!(
			sender.0,
			"0x0881c07520943bbf13989b92892093c1b50672156fa5f873c22892701cb2e207"
		);
	}

	#[tokio::test]
	async fn test_network_without_deployment_fails() {
		let config = config();
		let network = config.network("devnet").unwrap();

		let result = RelayBuilder::new(config, network)
			.build(factories(mock_ledger))
			.await;
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}

	#[tokio::test]
	async fn test_factory_error_is_reported() {
		let config = config();
		let network = config.network("test").unwrap();

		let result = RelayBuilder::new(config, network)
			.build(factories(failing_ledger))
			.await;
		assert!(matches!(result, Err(BuilderError::Config(ref msg)) if msg.contains("sui_rpc")));
	}

	#[tokio::test]
	async fn test_missing_implementations() {
		let mut config = config();
		config.headers.implementations.clear();
		let network = config.network("test").unwrap();

		let result = RelayBuilder::new(config, network)
			.build(factories(mock_ledger))
			.await;
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}

	#[tokio::test]
	async fn test_unknown_primary() {
		let mut config = config();
		config.account.primary = "kms".to_string();
		let network = config.network("test").unwrap();

		let result = RelayBuilder::new(config, network)
			.build(factories(mock_ledger))
			.await;
		assert!(matches!(result, Err(BuilderError::Config(ref msg)) if msg.contains("kms")));
	}
}
