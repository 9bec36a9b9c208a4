use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Display;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain_config::NetworkInfo;
use crate::error::Error;

/// A node address with a human readable label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub label: String,
}

impl Endpoint {
    pub fn new<S: Into<String>>(url: S) -> Self {
        let url = url.into();
        Self {
            label: url.clone(),
            url,
        }
    }

    pub fn with_label<S: Into<String>, L: Into<String>>(url: S, label: L) -> Self {
        Self {
            url: url.into(),
            label: label.into(),
        }
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Endpoint::new(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Endpoint::new(value)
    }
}

/// The primary endpoint followed by the fallbacks, in the order they are
/// attempted.  Duplicates are kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub primary: Endpoint,
    pub fallbacks: Vec<Endpoint>,
}

impl CandidateSet {
    pub fn new<P, F>(primary: P, fallbacks: Vec<F>) -> Self
    where
        P: Into<Endpoint>,
        F: Into<Endpoint>,
    {
        Self {
            primary: primary.into(),
            fallbacks: fallbacks.into_iter().map(Into::into).collect(),
        }
    }

    /// All candidates in attempt order, primary first.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.fallbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Candidate URLs with duplicates removed, first occurrence wins.
    pub fn distinct_urls(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.iter()
            .filter(|e| seen.insert(e.url.as_str()))
            .map(|e| e.url.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// The API namespaces a node may expose after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiNamespace {
    Database,
    NetworkBroadcast,
    History,
    Crypto,
    Orders,
}

impl ApiNamespace {
    /// Namespaces requested on every connection.
    pub const DEFAULT: [ApiNamespace; 4] = [
        ApiNamespace::Database,
        ApiNamespace::NetworkBroadcast,
        ApiNamespace::History,
        ApiNamespace::Crypto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiNamespace::Database => "database",
            ApiNamespace::NetworkBroadcast => "network_broadcast",
            ApiNamespace::History => "history",
            ApiNamespace::Crypto => "crypto",
            ApiNamespace::Orders => "orders",
        }
    }
}

impl Display for ApiNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Namespaces activated on connect in addition to [`ApiNamespace::DEFAULT`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalApis {
    pub enable_orders: bool,
}

impl OptionalApis {
    pub fn namespaces(&self) -> Vec<ApiNamespace> {
        let mut ret = ApiNamespace::DEFAULT.to_vec();
        if self.enable_orders {
            ret.push(ApiNamespace::Orders);
        }
        ret
    }
}

/// What a node told us during the handshake.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeInfo {
    pub chain_id: String,
    pub network_name: Option<String>,
    pub network: Option<NetworkInfo>,
    pub apis: BTreeSet<String>,
}

impl HandshakeInfo {
    pub fn has_api(&self, namespace: &str) -> bool {
        self.apis.contains(namespace)
    }

    pub fn core_asset(&self) -> Option<&str> {
        self.network.as_ref().map(|n| n.core_asset.as_str())
    }
}

/// Outcome of probing a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Latency(Duration),
    Failed(Error),
}

impl ProbeResult {
    pub fn latency(&self) -> Option<Duration> {
        match self {
            ProbeResult::Latency(d) => Some(*d),
            ProbeResult::Failed(_) => None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeResult::Latency(_))
    }
}

/// Probe outcomes keyed by endpoint URL, one entry per distinct URL.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LatencyReport {
    entries: HashMap<String, ProbeResult>,
}

impl LatencyReport {
    pub fn insert<S: Into<String>>(&mut self, url: S, result: ProbeResult) {
        self.entries.insert(url.into(), result);
    }

    pub fn get(&self, url: &str) -> Option<&ProbeResult> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProbeResult)> {
        self.entries.iter()
    }

    /// Reachable endpoints, fastest first.
    pub fn ranked(&self) -> Vec<(&str, Duration)> {
        let mut ret: Vec<(&str, Duration)> = self
            .entries
            .iter()
            .filter_map(|(url, r)| r.latency().map(|d| (url.as_str(), d)))
            .collect();
        ret.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        ret
    }
}

impl FromIterator<(String, ProbeResult)> for LatencyReport {
    fn from_iter<T: IntoIterator<Item = (String, ProbeResult)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
