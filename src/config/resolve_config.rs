use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    registry::sanitize_url,
    storage::DEFAULT_ENV,
    strategy::DEFAULT_CACHE_REFRESH_CYCLES,
    types::{LogLevel, NetworkId, NetworkName},
    Result, RpcHandlerError,
};

pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 3000;

/// Construction parameters for a session, as a caller writes them.
///
/// Everything but `network_id` is optional and falls back to a default in
/// [`resolve_config`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerConfig {
    pub network_id: Option<NetworkId>,
    #[serde(default, alias = "excludeTrackingRPCs")]
    pub exclude_tracking_rpcs: bool,
    pub network_name: Option<NetworkName>,
    /// Extra endpoints appended to the registry candidates.
    #[serde(default)]
    pub network_rpcs: Vec<String>,
    /// Seeds the reported runtime set before the first cycle has run.
    pub runtime_rpcs: Option<Vec<String>>,
    pub cache_refresh_cycles: Option<u32>,
    pub rpc_timeout_ms: Option<u64>,
    /// Read persisted state at start and write it after every cycle.
    #[serde(default)]
    pub auto_storage: bool,
    /// Namespace for persisted state.
    pub env: Option<String>,
    pub log_level: Option<LogLevel>,
}

/**
 * Think of the `with_*` methods as a fluent builder: each one takes the config by
 * value, sets one field and hands it back, so they can be chained.
 */

impl HandlerConfig {
    pub fn new(network_id: NetworkId) -> Self {
        Self {
            network_id: Some(network_id),
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| RpcHandlerError::Configuration(format!("invalid handler config: {e}")))
    }

    pub fn with_exclude_tracking_rpcs(mut self, exclude: bool) -> Self {
        self.exclude_tracking_rpcs = exclude;
        self
    }

    pub fn with_network_name(mut self, name: impl Into<NetworkName>) -> Self {
        self.network_name = Some(name.into());
        self
    }

    pub fn with_network_rpcs(mut self, rpcs: Vec<String>) -> Self {
        self.network_rpcs = rpcs;
        self
    }

    pub fn with_runtime_rpcs(mut self, rpcs: Vec<String>) -> Self {
        self.runtime_rpcs = Some(rpcs);
        self
    }

    pub fn with_cache_refresh_cycles(mut self, cycles: u32) -> Self {
        self.cache_refresh_cycles = Some(cycles);
        self
    }

    pub fn with_rpc_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.rpc_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_auto_storage(mut self, enabled: bool) -> Self {
        self.auto_storage = enabled;
        self
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedConfig {
    /// The network to select an endpoint for
    pub network_id: NetworkId,
    /// Drop community endpoints that track users
    pub exclude_tracking_rpcs: bool,
    /// Display name override, otherwise taken from the registry
    pub network_name: Option<NetworkName>,
    /// Validated extra endpoints (localhost, private nodes, etc)
    pub network_rpcs: Vec<String>,
    pub runtime_rpcs: Option<Vec<String>>,
    /// Partial cycles allowed before a full re-probe is forced
    pub cache_refresh_cycles: u32,
    /// Per-endpoint probe deadline
    pub rpc_timeout: Duration,
    pub auto_storage: bool,
    pub env: String,
    pub log_level: LogLevel,
}

pub fn resolve_config(config: HandlerConfig) -> Result<NormalizedConfig> {
    let network_id = config
        .network_id
        .ok_or_else(|| RpcHandlerError::Configuration("networkId is required".to_string()))?;

    // zero means "not set"
    let cache_refresh_cycles = config
        .cache_refresh_cycles
        .filter(|cycles| *cycles > 0)
        .unwrap_or(DEFAULT_CACHE_REFRESH_CYCLES);
    let rpc_timeout_ms = config
        .rpc_timeout_ms
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_RPC_TIMEOUT_MS);

    let mut network_rpcs = Vec::with_capacity(config.network_rpcs.len());
    for raw in &config.network_rpcs {
        let url = sanitize_url(raw)
            .ok_or_else(|| RpcHandlerError::Configuration(format!("`{raw}` is not a usable RPC url")))?;
        network_rpcs.push(url);
    }

    let env = config
        .env
        .map(|env| env.trim().to_string())
        .filter(|env| !env.is_empty())
        .unwrap_or_else(|| DEFAULT_ENV.to_string());

    Ok(NormalizedConfig {
        network_id,
        exclude_tracking_rpcs: config.exclude_tracking_rpcs,
        network_name: config.network_name.filter(|name| !name.is_empty()),
        network_rpcs,
        runtime_rpcs: config.runtime_rpcs,
        cache_refresh_cycles,
        rpc_timeout: Duration::from_millis(rpc_timeout_ms),
        auto_storage: config.auto_storage,
        env,
        log_level: config.log_level.unwrap_or_default(),
    })
}
