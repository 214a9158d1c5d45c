/// Connector configuration from environment variables
///
/// Controls the default canonical network, the persistence namespace, and
/// the optional transaction-relay endpoint.
use std::env;
use std::path::PathBuf;

use crate::network::NetworkType;

#[derive(Clone, Debug)]
pub struct ConnectorConfig {
    /// Canonical network active at startup
    pub network: NetworkType,
    /// Namespace prefix for persisted session keys
    pub storage_namespace: String,
    /// Base directory for the file-backed session store
    pub storage_dir: PathBuf,
    /// Optional transaction-relay endpoint (broadcast + authorization)
    pub relay_url: Option<String>,
}

impl ConnectorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WALLET_NETWORK`: canonical network name, defaults to "mainnet"
    /// - `WALLET_STORAGE_NAMESPACE`: persisted key namespace (default "satlink")
    /// - `WALLET_STORAGE_DIR`: session store directory (default "./.satlink")
    /// - `RELAY_URL`: transaction-relay endpoint (optional)
    pub fn from_env() -> Self {
        let network = match env::var("WALLET_NETWORK") {
            Ok(raw) => match raw.to_lowercase().parse::<NetworkType>() {
                Ok(network) => network,
                Err(_) => {
                    log::warn!("Unknown network '{}', defaulting to mainnet", raw);
                    NetworkType::Mainnet
                }
            },
            Err(_) => NetworkType::Mainnet,
        };
        log::info!("Using {} network", network);

        let storage_namespace =
            env::var("WALLET_STORAGE_NAMESPACE").unwrap_or_else(|_| "satlink".to_string());

        let storage_dir = env::var("WALLET_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.satlink"));

        let relay_url = env::var("RELAY_URL").ok();
        if let Some(ref url) = relay_url {
            log::info!("Transaction relay: {}", url);
        }

        Self {
            network,
            storage_namespace,
            storage_dir,
            relay_url,
        }
    }

    /// Configuration for a specific network with defaults for everything else
    pub fn with_network(network: NetworkType) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }
}

impl Default for ConnectorConfig {
    /// Default configuration (mainnet, no relay)
    fn default() -> Self {
        Self {
            network: NetworkType::Mainnet,
            storage_namespace: "satlink".to_string(),
            storage_dir: PathBuf::from("./.satlink"),
            relay_url: None,
        }
    }
}
