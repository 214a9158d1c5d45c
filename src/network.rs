//! Canonical network model and per-provider network identifier tables.
//!
//! Every wallet extension names chains its own way ("BITCOIN_MAINNET",
//! "livenet", "Mainnet", ...). This module owns the canonical identifiers
//! and the total, bidirectional translation to each provider's native
//! values. Canonical networks a provider does not natively support degrade
//! to that provider's closest analog rather than erroring.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderType;

pub const UNISAT_MAINNET: &str = "BITCOIN_MAINNET";
pub const UNISAT_TESTNET: &str = "BITCOIN_TESTNET";
pub const UNISAT_TESTNET4: &str = "BITCOIN_TESTNET4";
pub const UNISAT_SIGNET: &str = "BITCOIN_SIGNET";
pub const UNISAT_FRACTAL_MAINNET: &str = "FRACTAL_BITCOIN_MAINNET";
pub const UNISAT_FRACTAL_TESTNET: &str = "FRACTAL_BITCOIN_TESTNET";

pub const SATS_CONNECT_MAINNET: &str = "Mainnet";
pub const SATS_CONNECT_TESTNET: &str = "Testnet";
pub const SATS_CONNECT_SIGNET: &str = "Signet";

pub const LEATHER_MAINNET: &str = "mainnet";
pub const LEATHER_TESTNET: &str = "testnet";

pub const OKX_MAINNET: &str = "livenet";
pub const OKX_TESTNET: &str = "testnet";

pub const WIZZ_MAINNET: &str = "livenet";
pub const WIZZ_TESTNET: &str = "testnet";
pub const WIZZ_TESTNET4: &str = "testnet4";
pub const WIZZ_SIGNET: &str = "signet";

/// Canonical, provider-independent chain identifier.
///
/// Exactly one canonical value is active per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NetworkType {
    #[default]
    #[serde(rename = "mainnet")]
    Mainnet,
    #[serde(rename = "testnet")]
    Testnet,
    #[serde(rename = "testnet4")]
    Testnet4,
    #[serde(rename = "signet")]
    Signet,
    #[serde(rename = "fractal mainnet")]
    FractalMainnet,
    #[serde(rename = "fractal testnet")]
    FractalTestnet,
    #[serde(rename = "regtest")]
    Regtest,
}

impl NetworkType {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkType::Mainnet => "mainnet",
            NetworkType::Testnet => "testnet",
            NetworkType::Testnet4 => "testnet4",
            NetworkType::Signet => "signet",
            NetworkType::FractalMainnet => "fractal mainnet",
            NetworkType::FractalTestnet => "fractal testnet",
            NetworkType::Regtest => "regtest",
        }
    }

    /// Map onto the `bitcoin` crate's network for transaction construction.
    ///
    /// Fractal chains share mainnet encoding parameters; testnet4 uses
    /// testnet parameters.
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            NetworkType::Mainnet | NetworkType::FractalMainnet | NetworkType::FractalTestnet => {
                bitcoin::Network::Bitcoin
            }
            NetworkType::Testnet | NetworkType::Testnet4 => bitcoin::Network::Testnet,
            NetworkType::Signet => bitcoin::Network::Signet,
            NetworkType::Regtest => bitcoin::Network::Regtest,
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(NetworkType::Mainnet),
            "testnet" => Ok(NetworkType::Testnet),
            "testnet4" => Ok(NetworkType::Testnet4),
            "signet" => Ok(NetworkType::Signet),
            "fractal mainnet" => Ok(NetworkType::FractalMainnet),
            "fractal testnet" => Ok(NetworkType::FractalTestnet),
            "regtest" => Ok(NetworkType::Regtest),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

/// Translate a canonical network to the given provider's native identifier.
///
/// Total over both closed sets. Networks the provider has no native value
/// for map to its closest supported analog.
pub fn to_provider_network(network: NetworkType, provider: ProviderType) -> &'static str {
    use NetworkType::*;
    match provider {
        ProviderType::Unisat => match network {
            Mainnet | Regtest => UNISAT_MAINNET,
            Testnet => UNISAT_TESTNET,
            Testnet4 => UNISAT_TESTNET4,
            Signet => UNISAT_SIGNET,
            FractalMainnet => UNISAT_FRACTAL_MAINNET,
            FractalTestnet => UNISAT_FRACTAL_TESTNET,
        },
        // sats-connect family: no testnet4, fractal degrades to mainnet
        ProviderType::Xverse | ProviderType::MagicEden | ProviderType::Oyl => match network {
            Mainnet | FractalMainnet | FractalTestnet | Regtest => SATS_CONNECT_MAINNET,
            Testnet | Testnet4 => SATS_CONNECT_TESTNET,
            Signet => SATS_CONNECT_SIGNET,
        },
        ProviderType::Leather => match network {
            Mainnet | FractalMainnet | FractalTestnet | Regtest => LEATHER_MAINNET,
            Testnet | Testnet4 | Signet => LEATHER_TESTNET,
        },
        ProviderType::Okx | ProviderType::OpNet | ProviderType::Phantom => match network {
            Mainnet | FractalMainnet | FractalTestnet | Regtest => OKX_MAINNET,
            Testnet | Testnet4 | Signet => OKX_TESTNET,
        },
        ProviderType::Wizz => match network {
            Mainnet | FractalMainnet | Regtest => WIZZ_MAINNET,
            Testnet | FractalTestnet => WIZZ_TESTNET,
            Testnet4 => WIZZ_TESTNET4,
            Signet => WIZZ_SIGNET,
        },
        ProviderType::Orange => match network {
            Mainnet | FractalMainnet | FractalTestnet | Regtest => SATS_CONNECT_MAINNET,
            Testnet | Testnet4 | Signet => SATS_CONNECT_TESTNET,
        },
    }
}

/// Translate a provider-native network identifier back to canonical form.
///
/// Unknown native values fall back to mainnet rather than erroring; the
/// extensions are un-versioned and may grow identifiers we have never seen.
pub fn from_provider_network(native: &str, provider: ProviderType) -> NetworkType {
    match provider {
        ProviderType::Unisat => match native {
            UNISAT_TESTNET => NetworkType::Testnet,
            UNISAT_TESTNET4 => NetworkType::Testnet4,
            UNISAT_SIGNET => NetworkType::Signet,
            UNISAT_FRACTAL_MAINNET => NetworkType::FractalMainnet,
            UNISAT_FRACTAL_TESTNET => NetworkType::FractalTestnet,
            _ => NetworkType::Mainnet,
        },
        ProviderType::Xverse | ProviderType::MagicEden | ProviderType::Oyl => match native {
            SATS_CONNECT_TESTNET => NetworkType::Testnet,
            SATS_CONNECT_SIGNET => NetworkType::Signet,
            _ => NetworkType::Mainnet,
        },
        ProviderType::Leather => match native {
            LEATHER_TESTNET => NetworkType::Testnet,
            _ => NetworkType::Mainnet,
        },
        ProviderType::Okx | ProviderType::OpNet | ProviderType::Phantom => match native {
            OKX_TESTNET => NetworkType::Testnet,
            _ => NetworkType::Mainnet,
        },
        ProviderType::Wizz => match native {
            WIZZ_TESTNET => NetworkType::Testnet,
            WIZZ_TESTNET4 => NetworkType::Testnet4,
            WIZZ_SIGNET => NetworkType::Signet,
            _ => NetworkType::Mainnet,
        },
        ProviderType::Orange => match native {
            SATS_CONNECT_TESTNET => NetworkType::Testnet,
            _ => NetworkType::Mainnet,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_NETWORKS: [NetworkType; 7] = [
        NetworkType::Mainnet,
        NetworkType::Testnet,
        NetworkType::Testnet4,
        NetworkType::Signet,
        NetworkType::FractalMainnet,
        NetworkType::FractalTestnet,
        NetworkType::Regtest,
    ];

    #[test]
    fn unisat_round_trips_native_networks() {
        for network in [
            NetworkType::Mainnet,
            NetworkType::Testnet,
            NetworkType::Testnet4,
            NetworkType::Signet,
            NetworkType::FractalMainnet,
            NetworkType::FractalTestnet,
        ] {
            let native = to_provider_network(network, ProviderType::Unisat);
            assert_eq!(from_provider_network(native, ProviderType::Unisat), network);
        }
    }

    #[test]
    fn unisat_regtest_degrades_to_mainnet() {
        let native = to_provider_network(NetworkType::Regtest, ProviderType::Unisat);
        assert_eq!(native, UNISAT_MAINNET);
        assert_eq!(
            from_provider_network(native, ProviderType::Unisat),
            NetworkType::Mainnet
        );
    }

    #[test]
    fn xverse_supports_signet_natively() {
        let native = to_provider_network(NetworkType::Signet, ProviderType::Xverse);
        assert_eq!(native, SATS_CONNECT_SIGNET);
        assert_eq!(
            from_provider_network(native, ProviderType::Xverse),
            NetworkType::Signet
        );
    }

    #[test]
    fn orange_signet_degrades_to_testnet() {
        let native = to_provider_network(NetworkType::Signet, ProviderType::Orange);
        assert_eq!(native, SATS_CONNECT_TESTNET);
        assert_eq!(
            from_provider_network(native, ProviderType::Orange),
            NetworkType::Testnet
        );
    }

    #[test]
    fn translation_is_total_for_every_pair() {
        // Round-trip when natively supported, documented degradation
        // otherwise; never a panic.
        for provider in ProviderType::ALL {
            for network in ALL_NETWORKS {
                let native = to_provider_network(network, provider);
                let back = from_provider_network(native, provider);
                let again = to_provider_network(back, provider);
                // Degradation is stable: a degraded value maps to itself.
                assert_eq!(native, again, "{provider} {network}");
            }
        }
    }

    #[test]
    fn unknown_native_value_falls_back_to_mainnet() {
        for provider in ProviderType::ALL {
            assert_eq!(
                from_provider_network("no-such-network", provider),
                NetworkType::Mainnet
            );
        }
    }

    #[test]
    fn string_forms_round_trip() {
        for network in ALL_NETWORKS {
            assert_eq!(network.as_str().parse::<NetworkType>().unwrap(), network);
        }
        assert!("atlantis".parse::<NetworkType>().is_err());
    }
}
