use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::{JsonRpcRequest, Result, RpcHandlerError};

/// Performs one probe call against one endpoint and reports how long it took.
///
/// Deadlines are enforced by the caller, which drops the returned future once
/// it expires. Implementations must therefore be cancel-safe.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn probe(&self, url: &str, payload: &JsonRpcRequest) -> Result<Duration>;
}

/// reqwest-backed transport: a probe succeeds on a 2xx reply whose JSON body carries `result`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, url: &str, payload: &JsonRpcRequest) -> Result<Duration> {
        let start = Instant::now();

        let response = self.client.post(url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(RpcHandlerError::JsonRpc(format!("{url} answered with HTTP {}", response.status())));
        }

        let body: Value = response.json().await?;
        let elapsed = start.elapsed();

        if body.get("result").is_some() {
            Ok(elapsed)
        } else {
            Err(RpcHandlerError::JsonRpc(url.to_owned()))
        }
    }
}
