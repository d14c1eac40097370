pub mod resolve_config;

pub use resolve_config::{resolve_config, HandlerConfig, NormalizedConfig, DEFAULT_RPC_TIMEOUT_MS};
