use std::{sync::Arc, time::Duration};

use futures::future::join_all;

use crate::{
    transport::Transport, JsonRpcRequest, LatencyKey, LatencyMap, LatencyRecord, NetworkId, RpcHandlerError,
};

#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Incoming map with this cycle's results written over it.
    pub latencies: LatencyMap,
    /// Endpoints measured this cycle, in the order they were given.
    pub probed: Vec<String>,
}

/// Concurrently times the fixed probe call against a set of endpoints.
#[derive(Clone)]
pub struct LatencyProbe {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    payload: JsonRpcRequest,
}

impl std::fmt::Debug for LatencyProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyProbe")
            .field("timeout", &self.timeout)
            .field("payload", &self.payload.method)
            .finish()
    }
}

impl LatencyProbe {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            payload: JsonRpcRequest::latency_probe(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Measure every endpoint, each under its own deadline.
    ///
    /// The cycle only resolves once every endpoint has answered or timed out;
    /// a slow endpoint never holds up the others and never aborts the cycle.
    /// A timed out request is dropped, which cancels it in flight.
    pub async fn measure(&self, network_id: NetworkId, endpoints: &[String], previous: &LatencyMap) -> ProbeReport {
        let tasks: Vec<_> = endpoints
            .iter()
            .map(|url| {
                let transport = Arc::clone(&self.transport);
                let payload = &self.payload;
                let timeout = self.timeout;

                async move {
                    let outcome = match tokio::time::timeout(timeout, transport.probe(url, payload)).await {
                        Ok(Ok(elapsed)) => Ok(elapsed.as_millis() as u64),
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(RpcHandlerError::Timeout {
                            duration_ms: timeout.as_millis() as u64,
                        }),
                    };
                    (url, outcome)
                }
            })
            .collect();

        let results = join_all(tasks).await;

        let mut latencies = previous.clone();
        let mut probed = Vec::with_capacity(results.len());

        for (url, outcome) in results {
            let key = LatencyKey::new(network_id, url.clone());
            let record = match outcome {
                Ok(latency_ms) => {
                    tracing::debug!(network = network_id, url = %url, latency_ms, "probe succeeded");
                    LatencyRecord::measured(latency_ms)
                }
                Err(e) => {
                    tracing::debug!(network = network_id, url = %url, error = %e, "probe failed");
                    LatencyRecord::failed(latencies.get(&key))
                }
            };
            latencies.insert(key, record);
            probed.push(url.clone());
        }

        ProbeReport { latencies, probed }
    }
}
