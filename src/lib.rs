//! Picks the lowest-latency JSON-RPC endpoint for an EVM network and keeps the
//! measurements warm across calls.
//!
//! ```no_run
//! use fastest_rpc::{HandlerConfig, RpcHandler};
//!
//! # async fn run() -> fastest_rpc::Result<()> {
//! let handler = RpcHandler::new(HandlerConfig::new(100).with_exclude_tracking_rpcs(true)).await?;
//! let provider = handler.get_fastest_rpc_provider().await?;
//! println!("{} -> {}", handler.network_name(), provider.url);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod jsonrpc;
pub mod performance;
pub mod provider;
pub mod registry;
pub mod storage;
pub mod strategy;
pub mod transport;
pub mod types;

pub use error::{RpcHandlerError, Result};
pub use handler::{RpcHandler, RpcHandlerBuilder};
pub use jsonrpc::{JsonRpcRequest, JsonRpcResponse, JsonRpcError};
pub use types::{
    Endpoint, EndpointKind, Latency, LatencyKey, LatencyMap, LatencyRecord, LogLevel, NetworkId, NetworkName,
    Tracking, DEFAULT_PROVIDER_URL, LOCAL_HOST, LOCAL_NETWORK_ID,
};

// Re-export commonly used items
pub use config::{resolve_config, HandlerConfig, NormalizedConfig};
pub use performance::{pick_fastest, rank_fastest, LatencyProbe, ProbeReport};
pub use provider::{create_provider, JsonRpcProvider, ProviderHandle};
pub use registry::EndpointRegistry;
pub use storage::{FileStore, LatencyStore, MemoryStore};
pub use strategy::{ProbePlan, ProbeScope, RefreshPolicy};
pub use transport::{HttpTransport, Transport};
