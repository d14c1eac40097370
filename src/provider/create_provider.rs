use serde_json::Value;
use url::Url;

use crate::{
    types::DEFAULT_PROVIDER_URL, JsonRpcRequest, JsonRpcResponse, NetworkId, Result, RpcHandlerError,
};

/// The selected endpoint bound to a network and an HTTP client.
#[derive(Debug, Clone)]
pub struct JsonRpcProvider {
    pub url: String,
    pub chain_id: NetworkId,
    client: reqwest::Client,
}

impl PartialEq for JsonRpcProvider {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.chain_id == other.chain_id
    }
}

impl JsonRpcProvider {
    /// True when the client ended up on the default host instead of the endpoint it was given.
    pub fn is_placeholder(&self) -> bool {
        match Url::parse(&self.url) {
            Ok(url) => url.host_str() == Some("localhost") && url.port_or_known_default() == Some(8545),
            Err(_) => false,
        }
    }

    pub async fn request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse<Value>> {
        let response = self.client
            .post(&self.url)
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            let json_response = response.json().await?;
            Ok(json_response)
        } else {
            Err(RpcHandlerError::JsonRpc(self.url.clone()))
        }
    }
}

/// Binds `url` to a client. Like most JSON-RPC clients, an unusable URL does not
/// fail here: the client quietly falls back to `http://localhost:8545`.
pub fn create_provider(url: &str, chain_id: NetworkId, client: reqwest::Client) -> JsonRpcProvider {
    let url = match Url::parse(url) {
        Ok(_) => url.to_string(),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "unusable provider url, client fell back to its default host");
            DEFAULT_PROVIDER_URL.to_string()
        }
    };

    JsonRpcProvider { url, chain_id, client }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LOCAL_HOST;

    #[test]
    fn test_create_provider_keeps_valid_url() {
        let provider = create_provider("https://rpc.gnosischain.com", 100, reqwest::Client::new());
        assert_eq!(provider.url, "https://rpc.gnosischain.com");
        assert_eq!(provider.chain_id, 100);
        assert!(!provider.is_placeholder());
    }

    #[test]
    fn test_unusable_url_falls_back_to_placeholder() {
        let provider = create_provider("", 1, reqwest::Client::new());
        assert_eq!(provider.url, DEFAULT_PROVIDER_URL);
        assert!(provider.is_placeholder());
    }

    #[test]
    fn test_loopback_ip_is_not_the_placeholder() {
        assert!(!create_provider(LOCAL_HOST, 31337, reqwest::Client::new()).is_placeholder());
        assert!(!create_provider("http://127.0.0.1:40123", 1, reqwest::Client::new()).is_placeholder());
    }
}
