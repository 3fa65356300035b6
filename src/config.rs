//! Client configuration.
//!
//! A [`ClientConfig`] starts from one of the network presets and is then overlaid with
//! environment variables. Nothing in the library reads the environment directly; the runner
//! builds a config once and passes the pieces down.

use crate::wallet::WalletSeed;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Seed of the wallet holding the tokens minted in the genesis block of a local node.
pub const GENESIS_MINT_WALLET_SEED: &str =
	"0000000000000000000000000000000000000000000000000000000000000001";

pub const DEFAULT_PRIVATE_STATE_STORE: &str = "crowdfunding-private-state";

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("Invalid value for {name}: {reason}")]
	InvalidValue { name: &'static str, reason: String },
	#[error("Unknown network '{0}'")]
	UnknownNetwork(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkId {
	MainNet,
	DevNet,
	TestNet,
	Undeployed,
}

impl NetworkId {
	/// Network part of a bech32m address prefix. Main net addresses carry none.
	pub fn address_suffix(&self) -> Option<&'static str> {
		match self {
			NetworkId::MainNet => None,
			NetworkId::DevNet => Some("dev"),
			NetworkId::TestNet => Some("test"),
			NetworkId::Undeployed => Some("undeployed"),
		}
	}
}

impl FromStr for NetworkId {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"mainnet" | "main" => Ok(NetworkId::MainNet),
			"devnet" | "dev" => Ok(NetworkId::DevNet),
			"testnet" | "test" => Ok(NetworkId::TestNet),
			"undeployed" | "standalone" => Ok(NetworkId::Undeployed),
			other => Err(ConfigError::UnknownNetwork(other.to_string())),
		}
	}
}

/// Sampling intervals and timeouts of every wait the client performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
	pub funds_interval: Duration,
	pub sync_interval: Duration,
	pub balance_interval: Duration,
	pub balance_timeout: Duration,
	pub post_operation_interval: Duration,
	pub post_operation_timeout: Duration,
	/// How long a restored session may take to report progress at all.
	pub restore_first_state_timeout: Duration,
	/// How long a restored session is given to sync before startup proceeds anyway.
	pub restore_sync_timeout: Duration,
}

impl Default for WaitConfig {
	fn default() -> Self {
		Self {
			funds_interval: Duration::from_secs(10),
			sync_interval: Duration::from_secs(5),
			balance_interval: Duration::from_secs(2),
			balance_timeout: Duration::from_secs(30),
			post_operation_interval: Duration::from_secs(1),
			post_operation_timeout: Duration::from_secs(30),
			restore_first_state_timeout: Duration::from_secs(60),
			restore_sync_timeout: Duration::from_secs(120),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub network: NetworkId,
	pub indexer_url: String,
	pub indexer_ws_url: String,
	pub node_url: String,
	pub proof_server_url: String,
	/// Directory for session snapshots. `None` disables persistence.
	pub sync_cache: Option<PathBuf>,
	pub seed: Option<WalletSeed>,
	pub snapshot_filename: Option<String>,
	pub private_state_store: String,
	pub contract_address: Option<String>,
	pub viewing_key: Option<String>,
	/// Shielded address the viewing key belongs to.
	pub wallet_address: Option<String>,
	pub wait_for_funds: bool,
	pub wait: WaitConfig,
}

impl ClientConfig {
	/// Local node, indexer and proof server, funded by the genesis mint wallet.
	pub fn standalone() -> Self {
		Self {
			network: NetworkId::Undeployed,
			indexer_url: "http://127.0.0.1:8088/api/v1/graphql".to_string(),
			indexer_ws_url: "ws://127.0.0.1:8088/api/v1/graphql/ws".to_string(),
			node_url: "http://127.0.0.1:9944".to_string(),
			proof_server_url: "http://127.0.0.1:6300".to_string(),
			sync_cache: None,
			seed: WalletSeed::from_str(GENESIS_MINT_WALLET_SEED).ok(),
			snapshot_filename: None,
			private_state_store: DEFAULT_PRIVATE_STATE_STORE.to_string(),
			contract_address: None,
			viewing_key: None,
			wallet_address: None,
			wait_for_funds: true,
			wait: WaitConfig::default(),
		}
	}

	/// Public test network with a local proof server.
	pub fn testnet() -> Self {
		Self {
			network: NetworkId::TestNet,
			indexer_url: "https://indexer.testnet-02.midnight.network/api/v1/graphql".to_string(),
			indexer_ws_url: "wss://indexer.testnet-02.midnight.network/api/v1/graphql/ws".to_string(),
			node_url: "https://rpc.testnet-02.midnight.network".to_string(),
			proof_server_url: "http://127.0.0.1:6300".to_string(),
			seed: None,
			wait_for_funds: false,
			..Self::standalone()
		}
	}

	/// Preset selected by `NETWORK` (default standalone), overlaid with the other variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

		let network = var("NETWORK")
			.map(|value| value.parse::<NetworkId>())
			.transpose()?
			.unwrap_or(NetworkId::Undeployed);
		let mut config = match network {
			NetworkId::Undeployed => Self::standalone(),
			other => Self {
				network: other,
				..Self::testnet()
			},
		};

		if let Some(url) = var("INDEXER_URL") {
			config.indexer_url = url;
		}
		if let Some(url) = var("INDEXER_WS_URL") {
			config.indexer_ws_url = url;
		}
		if let Some(url) = var("NODE_URL") {
			config.node_url = url;
		}
		if let Some(url) = var("PROOF_SERVER_URL") {
			config.proof_server_url = url;
		}
		if let Some(dir) = var("SYNC_CACHE") {
			config.sync_cache = Some(PathBuf::from(dir));
		}
		if let Some(seed) = var("WALLET_SEED") {
			config.seed = Some(seed.parse().map_err(|e| ConfigError::InvalidValue {
				name: "WALLET_SEED",
				reason: format!("{}", e),
			})?);
		}
		if let Some(filename) = var("SNAPSHOT_FILENAME") {
			config.snapshot_filename = Some(filename);
		}
		if let Some(store) = var("PRIVATE_STATE_STORE") {
			config.private_state_store = store;
		}
		if let Some(address) = var("CONTRACT_ADDRESS") {
			config.contract_address = Some(address);
		}
		if let Some(key) = var("VIEWING_KEY") {
			config.viewing_key = Some(key);
		}
		if let Some(address) = var("WALLET_ADDRESS") {
			config.wallet_address = Some(address);
		}
		if let Some(flag) = var("WAIT_FOR_FUNDS") {
			config.wait_for_funds = parse_flag("WAIT_FOR_FUNDS", &flag)?;
		}

		Ok(config)
	}
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		other => Err(ConfigError::InvalidValue {
			name,
			reason: format!("expected a boolean, got '{}'", other),
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn defaults_to_standalone_with_the_genesis_seed_and_no_persistence() {
		let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
		assert_eq!(config.network, NetworkId::Undeployed);
		assert_eq!(config.seed.unwrap().to_hex(), GENESIS_MINT_WALLET_SEED);
		assert!(config.sync_cache.is_none());
		assert_eq!(config.wait.funds_interval, Duration::from_secs(10));
	}

	#[test]
	fn environment_overrides_the_preset() {
		let config = ClientConfig::from_lookup(lookup(&[
			("NETWORK", "testnet"),
			("SYNC_CACHE", "/tmp/cache"),
			("NODE_URL", "http://node:9944"),
			("WAIT_FOR_FUNDS", "yes"),
			("SNAPSHOT_FILENAME", ""),
		]))
		.unwrap();
		assert_eq!(config.network, NetworkId::TestNet);
		assert_eq!(config.sync_cache, Some(PathBuf::from("/tmp/cache")));
		assert_eq!(config.node_url, "http://node:9944");
		assert!(config.wait_for_funds);
		assert!(config.snapshot_filename.is_none());
		assert!(config.seed.is_none());
	}

	#[test]
	fn invalid_values_are_reported() {
		assert!(matches!(
			ClientConfig::from_lookup(lookup(&[("NETWORK", "moon")])),
			Err(ConfigError::UnknownNetwork(_))
		));
		assert!(matches!(
			ClientConfig::from_lookup(lookup(&[("WALLET_SEED", "abc")])),
			Err(ConfigError::InvalidValue { name: "WALLET_SEED", .. })
		));
		assert!(matches!(
			ClientConfig::from_lookup(lookup(&[("WAIT_FOR_FUNDS", "maybe")])),
			Err(ConfigError::InvalidValue { .. })
		));
	}
}
