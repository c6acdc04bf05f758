//! Network definitions and chain-wide constants.
//!
//! Every operation that touches a chain-specific constant resolves a
//! [`Network`] first and fails closed on unrecognized strings. Chain ids and
//! default service URLs live here as pure lookup tables so the typed-data
//! domain derivation stays total and testable.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use url::Url;

use crate::felt::Felt;

/// Supported Starknet-style networks.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Sepolia testnet (chain id `SN_SEPOLIA`).
    #[serde(rename = "starknet-sepolia")]
    StarknetSepolia,
    /// Mainnet (chain id `SN_MAIN`).
    #[serde(rename = "starknet")]
    Starknet,
}

static CHAIN_ID_SEPOLIA: Lazy<Felt> =
    Lazy::new(|| Felt::short_string("SN_SEPOLIA").expect("invalid chain id short string"));
static CHAIN_ID_MAINNET: Lazy<Felt> =
    Lazy::new(|| Felt::short_string("SN_MAIN").expect("invalid chain id short string"));

impl Network {
    /// Return all known [`Network`] variants.
    pub fn variants() -> &'static [Network] {
        &[Network::StarknetSepolia, Network::Starknet]
    }

    /// The chain id felt bound into typed-data domains for this network.
    pub fn chain_id(&self) -> Felt {
        match self {
            Network::StarknetSepolia => *CHAIN_ID_SEPOLIA,
            Network::Starknet => *CHAIN_ID_MAINNET,
        }
    }

    /// Base URL of the default facilitator for this network.
    pub fn default_facilitator_url(&self) -> Url {
        let url = match self {
            Network::StarknetSepolia => "https://facilitator.sepolia.x402.rs/",
            Network::Starknet => "https://facilitator.x402.rs/",
        };
        Url::parse(url).expect("invalid default facilitator url")
    }

    /// Base URL of the default block explorer for this network.
    pub fn explorer_url(&self) -> Url {
        let url = match self {
            Network::StarknetSepolia => "https://sepolia.voyager.online/",
            Network::Starknet => "https://voyager.online/",
        };
        Url::parse(url).expect("invalid default explorer url")
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::StarknetSepolia => write!(f, "starknet-sepolia"),
            Network::Starknet => write!(f, "starknet"),
        }
    }
}

/// Error for unrecognized network names. Chain-specific constants must never
/// be derived from an unknown network string.
#[derive(Debug, thiserror::Error)]
#[error("unknown network: {0:?}")]
pub struct UnknownNetworkError(pub String);

impl FromStr for Network {
    type Err = UnknownNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starknet-sepolia" => Ok(Network::StarknetSepolia),
            "starknet" => Ok(Network::Starknet),
            other => Err(UnknownNetworkError(other.to_string())),
        }
    }
}
