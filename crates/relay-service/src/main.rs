//! Main entry point for the relay synchronizer.
//!
//! Keeps an on-chain Bitcoin header relay caught up with the Bitcoin chain
//! on the network named on the command line.

use clap::Parser;
use relay_config::Config;
use relay_core::{RelayBuilder, RelayFactories, SyncEngine};
use relay_types::NetworkConfig;
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable holding the configuration file path.
const CONFIG_ENV: &str = "RELAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

/// Command-line arguments for the relay synchronizer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Network to synchronize (e.g. local, devnet, testnet, mainnet)
	network: String,
}

fn config_path(from_env: Option<String>) -> PathBuf {
	from_env
		.filter(|path| !path.trim().is_empty())
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Main entry point for the relay synchronizer.
///
/// This function:
/// 1. Parses the network argument
/// 2. Initializes logging
/// 3. Loads configuration and resolves the network
/// 4. Builds the sync engine
/// 5. Runs it until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started relay synchronizer");

	let path = config_path(std::env::var(CONFIG_ENV).ok());
	let config = Config::from_file(&path).await?;
	tracing::info!("Loaded configuration [{}] from {}", config.relay.id, path.display());

	let network = config.network(&args.network)?;
	tracing::info!(network = %args.network, rpc_url = %network.rpc_url, "Selected network");

	let engine = build_engine(config, network).await?;
	engine.run().await?;

	tracing::info!("Stopped relay synchronizer");
	Ok(())
}

fn factory_map<F>(implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect()
}

/// Builds the sync engine from every registered implementation.
async fn build_engine(
	config: Config,
	network: NetworkConfig,
) -> Result<SyncEngine, Box<dyn std::error::Error>> {
	let factories = RelayFactories {
		header_factories: factory_map(relay_headers::get_all_implementations()),
		account_factories: factory_map(relay_account::get_all_implementations()),
		delivery_factories: factory_map(relay_delivery::get_all_implementations()),
	};

	Ok(RelayBuilder::new(config, network).build(factories).await?)
}
