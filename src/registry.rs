use std::{
    collections::{BTreeMap, HashSet},
    sync::LazyLock,
};

use serde_json::Value;
use url::Url;

use crate::{Endpoint, NetworkId, NetworkName, Result, RpcHandlerError, Tracking};

/*
 * The bundled chain data is compiled into the binary and parsed the first time
 * anything asks for it. LazyLock guarantees that happens exactly once even when
 * several sessions are constructed concurrently.
 */

static BUNDLED: LazyLock<EndpointRegistry> = LazyLock::new(|| {
    EndpointRegistry::from_json(include_str!("../data/chains.json")).unwrap_or_else(|e| {
        tracing::error!(error = %e, "bundled endpoint registry is unreadable, continuing with an empty registry");
        EndpointRegistry::default()
    })
});

#[derive(Debug, Clone, Default)]
struct NetworkEntry {
    name: NetworkName,
    endpoints: Vec<Endpoint>,
}

/// Read-only mapping of network id to its candidate endpoints and display name.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    networks: BTreeMap<NetworkId, NetworkEntry>,
}

impl EndpointRegistry {
    pub fn bundled() -> &'static EndpointRegistry {
        &BUNDLED
    }

    /// Parses a chainlist-style document:
    ///
    /// ```json
    /// { "100": { "name": "Gnosis", "rpcs": ["https://rpc.gnosischain.com", { "url": "https://...", "tracking": "none" }] } }
    /// ```
    ///
    /// Plain strings are official endpoints, objects with a `url` are community
    /// endpoints. Anything else is skipped without complaint.
    pub fn from_json(raw: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(raw)?;
        let chains = document.as_object().ok_or_else(|| {
            RpcHandlerError::Configuration("endpoint registry must be a JSON object keyed by network id".to_string())
        })?;

        let mut networks = BTreeMap::new();

        for (id, chain) in chains {
            let Ok(network_id) = id.trim().parse::<NetworkId>() else {
                continue;
            };
            let Some(chain) = chain.as_object() else {
                continue;
            };

            let name = chain
                .get("name")
                .and_then(Value::as_str)
                .map(normalize_name)
                .unwrap_or_default();

            let mut official = Vec::new();
            let mut community = Vec::new();

            for rpc in chain.get("rpcs").and_then(Value::as_array).into_iter().flatten() {
                match rpc {
                    Value::String(url) => {
                        if let Some(url) = sanitize_url(url) {
                            official.push(Endpoint::official(url));
                        }
                    }
                    Value::Object(fields) => {
                        let Some(url) = fields.get("url").and_then(Value::as_str).and_then(sanitize_url) else {
                            continue;
                        };
                        let tracking = fields.get("tracking").and_then(Value::as_str).map(Tracking::parse);
                        community.push(Endpoint::community(url, tracking));
                    }
                    _ => {}
                }
            }

            let mut seen = HashSet::new();
            let endpoints = official
                .into_iter()
                .chain(community)
                .filter(|endpoint| seen.insert(endpoint.url.clone()))
                .collect();

            networks.insert(network_id, NetworkEntry { name, endpoints });
        }

        Ok(Self { networks })
    }

    /// Official endpoints first, then community ones, in registry order.
    pub fn candidates(&self, network_id: NetworkId, exclude_tracking: bool) -> Result<Vec<Endpoint>> {
        let entry = self
            .networks
            .get(&network_id)
            .ok_or(RpcHandlerError::LookupFailure { network_id })?;

        Ok(entry
            .endpoints
            .iter()
            .filter(|endpoint| !(exclude_tracking && endpoint.is_tracked()))
            .cloned()
            .collect())
    }

    pub fn network_name(&self, network_id: NetworkId) -> Option<&str> {
        self.networks
            .get(&network_id)
            .map(|entry| entry.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.networks.keys().copied().collect()
    }

    pub fn contains(&self, network_id: NetworkId) -> bool {
        self.networks.contains_key(&network_id)
    }
}

fn normalize_name(name: &str) -> NetworkName {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Accepts only absolute http(s) URLs without unresolved API-key templates.
pub(crate) fn sanitize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains("${") {
        return None;
    }

    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let parsed = Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }

    Some(trimmed.to_string())
}
