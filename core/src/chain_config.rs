//! Known networks and the settings derived from the connected chain.
//!
//! Lookup never gates a connection: an unknown chain id is reported and
//! the defaults stay in effect.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CORE_ASSET: &str = "CORE";
pub const DEFAULT_ADDRESS_PREFIX: &str = "GPH";
pub const DEFAULT_EXPIRE_IN_SECS: u64 = 15;
pub const DEFAULT_EXPIRE_IN_SECS_PROPOSAL: u64 = 24 * 60 * 60;
pub const DEFAULT_REVIEW_IN_SECS_COMMITTEE: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub core_asset: String,
    pub address_prefix: String,
    pub chain_id: String,
}

const NETWORKS: &[(&str, &str, &str, &str)] = &[
    (
        "RevPop",
        "RVP",
        "RVP",
        "3eb7485cde282aabdfaf41d54fa4fedb1fe2537c598c969b0f4dce412f8ad29d",
    ),
    (
        "RevPopDev",
        "RVP",
        "RVP",
        "147f0c14427dc6c28ecc977229e5067cf3608cb6d16f79aa39888845ee4ca2bf",
    ),
];

/// Find the network with the given chain id.
pub fn lookup_by_chain_id(chain_id: &str) -> Option<(String, NetworkInfo)> {
    NETWORKS
        .iter()
        .find(|(_, _, _, id)| *id == chain_id)
        .map(|(name, core_asset, prefix, id)| {
            (
                name.to_string(),
                NetworkInfo {
                    core_asset: core_asset.to_string(),
                    address_prefix: prefix.to_string(),
                    chain_id: id.to_string(),
                },
            )
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub core_asset: String,
    pub address_prefix: String,
    pub expire_in_secs: u64,
    pub expire_in_secs_proposal: u64,
    pub review_in_secs_committee: u64,
    pub network_name: Option<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            core_asset: DEFAULT_CORE_ASSET.into(),
            address_prefix: DEFAULT_ADDRESS_PREFIX.into(),
            expire_in_secs: DEFAULT_EXPIRE_IN_SECS,
            expire_in_secs_proposal: DEFAULT_EXPIRE_IN_SECS_PROPOSAL,
            review_in_secs_committee: DEFAULT_REVIEW_IN_SECS_COMMITTEE,
            network_name: None,
        }
    }
}

impl ChainConfig {
    /// Apply the settings of a known chain id.  Returns `None` for an
    /// unknown chain, which may be a testnet.
    pub fn set_chain_id(&mut self, chain_id: &str) -> Option<(String, NetworkInfo)> {
        match lookup_by_chain_id(chain_id) {
            Some((name, network)) => {
                self.network_name = Some(name.clone());
                self.address_prefix = network.address_prefix.clone();
                Some((name, network))
            }
            None => {
                warn!("Unknown chain id (this may be a testnet): {}", chain_id);
                None
            }
        }
    }

    pub fn set_prefix<S: Into<String>>(&mut self, prefix: S) {
        self.address_prefix = prefix.into();
    }

    pub fn reset(&mut self) {
        *self = ChainConfig::default();
        info!("Chain config reset");
    }
}
