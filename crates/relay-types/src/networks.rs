//! Network configuration types.
//!
//! A network is selected by name on the command line. Each entry names the
//! ledger RPC endpoint and, once the relay is deployed there, the ids of the
//! relay package and shared relay object.

use crate::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for a single ledger network.
///
/// # Fields
///
/// * `rpc_url` - JSON-RPC endpoint of a full node
/// * `package_id` - Package that publishes the relay module
/// * `relay_object_id` - Shared relay object holding the watermark
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkConfig {
	pub rpc_url: String,
	#[serde(default)]
	pub package_id: Option<ObjectId>,
	#[serde(default)]
	pub relay_object_id: Option<ObjectId>,
}

impl NetworkConfig {
	pub fn new(rpc_url: impl Into<String>) -> Self {
		Self {
			rpc_url: rpc_url.into(),
			package_id: None,
			relay_object_id: None,
		}
	}
}

/// Networks keyed by name (`local`, `testnet`, ...).
pub type NetworksConfig = HashMap<String, NetworkConfig>;

/// Public endpoints used when the configuration does not list any networks.
pub fn default_networks() -> NetworksConfig {
	[
		("local", "http://127.0.0.1:9000"),
		("devnet", "https://fullnode.devnet.sui.io:443"),
		("testnet", "https://sui-testnet-rpc.publicnode.com"),
		("mainnet", "https://fullnode.mainnet.sui.io:443"),
	]
	.into_iter()
	.map(|(name, url)| (name.to_string(), NetworkConfig::new(url)))
	.collect()
}
