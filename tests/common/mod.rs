#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use fastest_rpc::*;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Answer with this latency.
    Reply(u64),
    /// Transport-level error.
    Fail,
    /// Never answer within any sane deadline.
    Hang,
}

/// Transport double driven by per-url scripts. The last step of a script repeats forever.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(steps: &[(&str, Step)]) -> Arc<Self> {
        let transport = Self::default();
        for (url, step) in steps {
            transport.script(url, &[*step]);
        }
        Arc::new(transport)
    }

    pub fn script(&self, url: &str, steps: &[Step]) {
        self.scripts.lock().insert(url.to_string(), steps.iter().copied().collect());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|called| called.as_str() == url).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn next_step(&self, url: &str) -> Step {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(url) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap_or(Step::Fail),
            Some(steps) => steps.front().copied().unwrap_or(Step::Fail),
            None => Step::Fail,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn probe(&self, url: &str, _payload: &JsonRpcRequest) -> Result<Duration> {
        self.calls.lock().push(url.to_string());
        let step = self.next_step(url);
        tokio::task::yield_now().await;

        match step {
            Step::Reply(ms) => Ok(Duration::from_millis(ms)),
            Step::Fail => Err(RpcHandlerError::JsonRpc(url.to_string())),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Duration::from_millis(1))
            }
        }
    }
}

/// Routes library logs to the test harness output; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Registry with one network whose official endpoints are `urls`.
pub fn registry(network_id: NetworkId, urls: &[&str]) -> Arc<EndpointRegistry> {
    let rpcs = serde_json::to_string(urls).unwrap();
    let raw = format!(r#"{{"{network_id}": {{"name": "Test Net", "rpcs": {rpcs}}}}}"#);
    Arc::new(EndpointRegistry::from_json(&raw).unwrap())
}

pub fn latency_of(latencies: &LatencyMap, network_id: NetworkId, url: &str) -> Option<Latency> {
    latencies.get(&LatencyKey::new(network_id, url)).map(|record| record.latency)
}
