use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type NetworkId = u64;
pub type NetworkName = String;

/// Hardhat/anvil development chain. Never probed.
pub const LOCAL_NETWORK_ID: NetworkId = 31337;
pub const LOCAL_HOST: &str = "http://127.0.0.1:8545";

/// The URL a JSON-RPC client silently binds to when it was given nothing usable.
pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:8545";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum EndpointKind {
    Official,
    Community,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tracking {
    None,
    Limited,
    Yes,
    Unspecified,
}

impl Tracking {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "none" => Tracking::None,
            "limited" => Tracking::Limited,
            "yes" => Tracking::Yes,
            _ => Tracking::Unspecified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Endpoint {
    pub url: String,
    pub kind: EndpointKind,
    pub tracking: Option<Tracking>,
}

impl Endpoint {
    pub fn official(url: impl Into<String>) -> Self {
        Self { url: url.into(), kind: EndpointKind::Official, tracking: None }
    }

    pub fn community(url: impl Into<String>, tracking: Option<Tracking>) -> Self {
        Self { url: url.into(), kind: EndpointKind::Community, tracking }
    }

    /// Official endpoints are never considered tracked. Community endpoints are
    /// tracked unless they explicitly declare `tracking: none`.
    pub fn is_tracked(&self) -> bool {
        match self.kind {
            EndpointKind::Official => false,
            EndpointKind::Community => !matches!(self.tracking, Some(Tracking::None)),
        }
    }
}

/// Declaration order is verbosity order: `Error` is the quietest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace
}

/// Outcome of one probe against one endpoint. `Failed` is never selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Latency {
    Measured(u64),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LatencyKey {
    pub network_id: NetworkId,
    pub url: String,
}

impl LatencyKey {
    pub fn new(network_id: NetworkId, url: impl Into<String>) -> Self {
        Self { network_id, url: url.into() }
    }
}

impl fmt::Display for LatencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}", self.network_id, self.url)
    }
}

impl FromStr for LatencyKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, url) = s
            .split_once("__")
            .ok_or_else(|| format!("latency key `{s}` is missing the `__` separator"))?;
        let network_id = network
            .parse::<NetworkId>()
            .map_err(|e| format!("latency key `{s}` has an invalid network id: {e}"))?;
        if url.is_empty() {
            return Err(format!("latency key `{s}` has an empty url"));
        }
        Ok(Self::new(network_id, url))
    }
}

/**
 * JSON object keys have to be strings, so the key travels as `"{network_id}__{url}"`.
 *
 * `collect_str` goes through the `Display` impl above and `FromStr` brings it back.
 */

impl Serialize for LatencyKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LatencyKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LatencyRecord {
    pub latency: Latency,
    pub last_tested: DateTime<Utc>,
    #[serde(default)]
    pub failure_count: u32
}

impl LatencyRecord {
    pub fn measured(latency_ms: u64) -> Self {
        Self {
            latency: Latency::Measured(latency_ms),
            last_tested: Utc::now(),
            failure_count: 0,
        }
    }

    /// Consecutive failures carry over from the previous record for the same key.
    pub fn failed(previous: Option<&LatencyRecord>) -> Self {
        Self {
            latency: Latency::Failed,
            last_tested: Utc::now(),
            failure_count: previous.map_or(0, |p| p.failure_count).saturating_add(1),
        }
    }

    pub fn latency_ms(&self) -> Option<u64> {
        match self.latency {
            Latency::Measured(ms) => Some(ms),
            Latency::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.latency, Latency::Failed)
    }
}

/// Ordered by `(network_id, url)`, which also fixes the selection tie-break.
pub type LatencyMap = BTreeMap<LatencyKey, LatencyRecord>;

/// Entries for one network that hold a real measurement.
pub fn usable_entries(latencies: &LatencyMap, network_id: NetworkId) -> impl Iterator<Item = (&LatencyKey, u64)> {
    latencies
        .iter()
        .filter(move |(key, _)| key.network_id == network_id)
        .filter_map(|(key, record)| record.latency_ms().map(|ms| (key, ms)))
}
