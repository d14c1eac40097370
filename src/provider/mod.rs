pub mod create_provider;

pub use create_provider::{create_provider, JsonRpcProvider};

/// The handle a session hands out.
pub type ProviderHandle = JsonRpcProvider;
