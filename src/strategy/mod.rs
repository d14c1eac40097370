pub mod refresh_policy;

pub use refresh_policy::{ProbePlan, ProbeScope, RefreshPolicy, DEFAULT_CACHE_REFRESH_CYCLES};
