#[derive(Debug, thiserror::Error)]
pub enum RpcHandlerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network {network_id} is not present in the endpoint registry")]
    LookupFailure { network_id: crate::NetworkId },

    #[error("No reachable RPC endpoint for network {network_id}")]
    SelectionFailure { network_id: crate::NetworkId },

    #[error("Provider is not initialized")]
    UninitializedAccess,

    #[error("JSON-RPC error from {0}")]
    JsonRpc(String),

    #[error("Request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RpcHandlerError>;
