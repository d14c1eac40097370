use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    config::{resolve_config, HandlerConfig, NormalizedConfig},
    performance::{rank_fastest, LatencyProbe},
    provider::{create_provider, ProviderHandle},
    registry::EndpointRegistry,
    storage::LatencyStore,
    strategy::RefreshPolicy,
    transport::{HttpTransport, Transport},
    types::{LOCAL_HOST, LOCAL_NETWORK_ID},
    LatencyMap, LogLevel, NetworkId, NetworkName, Result, RpcHandlerError,
};

/// Everything a selection cycle reads and rewrites. Guarded as one unit so the
/// policy decision, probe merge, counter update and persistence of one cycle
/// never interleave with another call on the same session.
#[derive(Debug, Default)]
struct SessionState {
    latencies: LatencyMap,
    refresh_counter: u32,
    runtime_rpcs: Vec<String>,
    provider: Option<ProviderHandle>,
}

/// A selection session for one network.
///
/// Owns its measurements and refresh counter; optionally mirrors them into a
/// [`LatencyStore`] so the next session starts warm.
pub struct RpcHandler {
    config: NormalizedConfig,
    network_name: NetworkName,
    network_rpcs: Vec<String>,
    probe: LatencyProbe,
    policy: RefreshPolicy,
    store: Option<Arc<dyn LatencyStore>>,
    client: reqwest::Client,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for RpcHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcHandler")
            .field("network_id", &self.config.network_id)
            .field("network_name", &self.network_name)
            .field("network_rpcs", &self.network_rpcs.len())
            .field("policy", &self.policy)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

pub struct RpcHandlerBuilder {
    config: HandlerConfig,
    registry: Option<Arc<EndpointRegistry>>,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn LatencyStore>>,
    client: Option<reqwest::Client>,
}

impl RpcHandlerBuilder {
    /// Defaults to the bundled registry.
    pub fn registry(mut self, registry: Arc<EndpointRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Defaults to [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Backend used when `autoStorage` is enabled.
    pub fn store(mut self, store: Arc<dyn LatencyStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Client shared by the default transport and the handed-out providers.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub async fn build(self) -> Result<RpcHandler> {
        let config = resolve_config(self.config)?;
        let network_id = config.network_id;

        let store = match (config.auto_storage, self.store) {
            (true, Some(store)) => Some(store),
            (true, None) => {
                return Err(RpcHandlerError::Configuration(
                    "autoStorage is enabled but no latency store was supplied".to_string(),
                ));
            }
            (false, Some(_)) => {
                tracing::debug!(network = network_id, "latency store supplied without autoStorage, ignoring it");
                None
            }
            (false, None) => None,
        };

        let registry = self.registry.as_deref().unwrap_or_else(|| EndpointRegistry::bundled());

        let mut network_rpcs: Vec<String> = if network_id == LOCAL_NETWORK_ID {
            vec![LOCAL_HOST.to_string()]
        } else {
            match registry.candidates(network_id, config.exclude_tracking_rpcs) {
                Ok(endpoints) => endpoints.into_iter().map(|endpoint| endpoint.url).collect(),
                // A network the registry has never heard of is still usable when the caller brings its own endpoints.
                Err(RpcHandlerError::LookupFailure { .. }) if !config.network_rpcs.is_empty() => Vec::new(),
                Err(e) => return Err(e),
            }
        };
        for url in &config.network_rpcs {
            if !network_rpcs.contains(url) {
                network_rpcs.push(url.clone());
            }
        }

        let network_name = config
            .network_name
            .clone()
            .or_else(|| registry.network_name(network_id).map(str::to_string))
            .unwrap_or_else(|| format!("network_{network_id}"));

        let client = self.client.unwrap_or_default();
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::with_client(client.clone())));

        let mut state = SessionState {
            runtime_rpcs: config.runtime_rpcs.clone().unwrap_or_default(),
            ..SessionState::default()
        };

        if let Some(store) = &store {
            match store.get_latencies(&config.env, network_id).await {
                // Entries from sessions with a different candidate set (tracking allowed,
                // other extras, an older registry) must not be probed or selected here.
                Ok(mut latencies) => {
                    latencies.retain(|key, _| network_rpcs.contains(&key.url));
                    state.latencies = latencies;
                }
                Err(e) => tracing::warn!(network = network_id, error = %e, "could not load cached latencies, starting cold"),
            }
            match store.get_refresh_counter(&config.env).await {
                Ok(counter) => state.refresh_counter = counter,
                Err(e) => tracing::warn!(network = network_id, error = %e, "could not load refresh counter, starting at 0"),
            }
        }

        let handler = RpcHandler {
            probe: LatencyProbe::new(transport, config.rpc_timeout),
            policy: RefreshPolicy::new(config.cache_refresh_cycles),
            network_name,
            network_rpcs,
            store,
            client,
            state: Mutex::new(state),
            config,
        };

        handler.log(LogLevel::Debug, "-", "session created");

        Ok(handler)
    }
}

impl RpcHandler {
    pub fn builder(config: HandlerConfig) -> RpcHandlerBuilder {
        RpcHandlerBuilder {
            config,
            registry: None,
            transport: None,
            store: None,
            client: None,
        }
    }

    /// Session over the bundled registry with HTTP probing and no persistence.
    pub async fn new(config: HandlerConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    /// Returns the cached provider, running a selection cycle only when there is none.
    pub async fn get_fastest_rpc_provider(&self) -> Result<ProviderHandle> {
        let mut state = self.state.lock().await;

        if let Some(provider) = &state.provider {
            return Ok(provider.clone());
        }

        self.resolve_provider(&mut state).await
    }

    /// Runs a selection cycle now and replaces the cached provider.
    pub async fn test_rpc_performance(&self) -> Result<ProviderHandle> {
        let mut state = self.state.lock().await;
        state.provider = None;
        self.resolve_provider(&mut state).await
    }

    pub async fn get_provider(&self) -> Result<ProviderHandle> {
        self.state
            .lock()
            .await
            .provider
            .clone()
            .ok_or(RpcHandlerError::UninitializedAccess)
    }

    /// Drops the cached provider; the next request selects again.
    pub async fn invalidate(&self) {
        self.state.lock().await.provider = None;
    }

    /// Flushes state to the store, if persistence is enabled, and ends the session.
    pub async fn close(self) -> Result<()> {
        let state = self.state.into_inner();
        if let Some(store) = &self.store {
            store
                .set_state(&self.config.env, &state.latencies, state.refresh_counter)
                .await?;
        }
        Ok(())
    }

    async fn resolve_provider(&self, state: &mut SessionState) -> Result<ProviderHandle> {
        let network_id = self.config.network_id;

        if network_id == LOCAL_NETWORK_ID {
            let provider = create_provider(LOCAL_HOST, network_id, self.client.clone());
            state.provider = Some(provider.clone());
            return Ok(provider);
        }

        let provider = self.run_cycle(state, false, false).await?;
        if !provider.is_placeholder() {
            return Ok(provider);
        }

        // The client fell back to its default host: discard it and retry once over every candidate,
        // this time passing over any endpoint that binds to the default host.
        self.log(LogLevel::Warn, &provider.url, "provider resolved to the default host, forcing a full refresh");
        state.provider = None;

        self.run_cycle(state, true, true).await
    }

    /// policy -> probe -> merge -> persist -> select
    async fn run_cycle(
        &self,
        state: &mut SessionState,
        force_full: bool,
        skip_placeholder: bool,
    ) -> Result<ProviderHandle> {
        let network_id = self.config.network_id;

        let plan = self.policy.plan(
            network_id,
            &state.latencies,
            state.refresh_counter,
            &self.network_rpcs,
            force_full,
        );

        tracing::debug!(
            network = %self.network_name,
            scope = %plan.scope,
            endpoints = plan.endpoints.len(),
            refresh_counter = plan.next_counter,
            "starting probe cycle"
        );

        let report = self.probe.measure(network_id, &plan.endpoints, &state.latencies).await;
        state.latencies = report.latencies;
        state.runtime_rpcs = report.probed;
        state.refresh_counter = plan.next_counter;

        self.persist(state).await;

        let selected = rank_fastest(&state.latencies, network_id)
            .into_iter()
            .map(|(url, latency_ms)| (create_provider(&url, network_id, self.client.clone()), latency_ms))
            .find(|(provider, _)| !(skip_placeholder && provider.is_placeholder()));

        match selected {
            Some((provider, latency_ms)) => {
                state.provider = Some(provider.clone());
                self.log(LogLevel::Info, &provider.url, &format!("selected fastest RPC ({latency_ms}ms)"));
                Ok(provider)
            }
            None => {
                state.provider = None;
                self.log(LogLevel::Error, "-", "no RPC endpoint survived probing");
                Err(RpcHandlerError::SelectionFailure { network_id })
            }
        }
    }

    async fn persist(&self, state: &SessionState) {
        let Some(store) = &self.store else {
            return;
        };

        if let Err(e) = store
            .set_state(&self.config.env, &state.latencies, state.refresh_counter)
            .await
        {
            tracing::warn!(network = %self.network_name, error = %e, "failed to persist latency state");
        }
    }

    pub fn network_id(&self) -> NetworkId {
        self.config.network_id
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    /// Full candidate set: registry endpoints plus configured extras.
    pub fn network_rpcs(&self) -> &[String] {
        &self.network_rpcs
    }

    pub fn cache_refresh_cycles(&self) -> u32 {
        self.policy.cache_refresh_cycles()
    }

    pub fn config(&self) -> &NormalizedConfig {
        &self.config
    }

    /// Endpoints probed by the most recent cycle.
    pub async fn runtime_rpcs(&self) -> Vec<String> {
        self.state.lock().await.runtime_rpcs.clone()
    }

    pub async fn latencies(&self) -> LatencyMap {
        self.state.lock().await.latencies.clone()
    }

    pub async fn refresh_counter(&self) -> u32 {
        self.state.lock().await.refresh_counter
    }

    fn log(&self, level: LogLevel, url: &str, msg: &str) {
        if level > self.config.log_level {
            return;
        }

        match level {
            LogLevel::Error => tracing::error!(
                network = %self.network_name,
                url = %url,
                "{msg}"
            ),
            LogLevel::Warn => tracing::warn!(
                network = %self.network_name,
                url = %url,
                "{msg}"
            ),
            LogLevel::Info => tracing::info!(
                network = %self.network_name,
                url = %url,
                "{msg}"
            ),
            LogLevel::Debug => tracing::debug!(
                network = %self.network_name,
                url = %url,
                "{msg}"
            ),
            LogLevel::Trace => tracing::trace!(
                network = %self.network_name,
                url = %url,
                "{msg}"
            )
        }
    }
}
