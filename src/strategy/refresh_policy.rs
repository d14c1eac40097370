use crate::{types::usable_entries, LatencyMap, NetworkId};

pub const DEFAULT_CACHE_REFRESH_CYCLES: u32 = 10;

/// Fewer usable entries than this always triggers a full probe.
const MIN_COMPARISON_SET: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeScope {
    /// Every registry candidate.
    Full,
    /// Only endpoints with a usable cached measurement.
    Partial,
}

impl std::fmt::Display for ProbeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeScope::Full => f.write_str("full"),
            ProbeScope::Partial => f.write_str("partial"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePlan {
    pub scope: ProbeScope,
    pub endpoints: Vec<String>,
    /// Counter value to store once this cycle has run.
    pub next_counter: u32,
}

/// Decides per cycle between re-probing the whole candidate set and only the
/// working set already known to respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    cache_refresh_cycles: u32,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_REFRESH_CYCLES)
    }
}

impl RefreshPolicy {
    pub fn new(cache_refresh_cycles: u32) -> Self {
        Self { cache_refresh_cycles }
    }

    pub fn cache_refresh_cycles(&self) -> u32 {
        self.cache_refresh_cycles
    }

    pub fn plan(
        &self,
        network_id: NetworkId,
        latencies: &LatencyMap,
        refresh_counter: u32,
        candidates: &[String],
        force_full: bool,
    ) -> ProbePlan {
        let working_set: Vec<String> = usable_entries(latencies, network_id)
            .map(|(key, _)| key.url.clone())
            .collect();

        let full = force_full
            || working_set.len() < MIN_COMPARISON_SET
            || refresh_counter >= self.cache_refresh_cycles;

        if full {
            ProbePlan {
                scope: ProbeScope::Full,
                endpoints: candidates.to_vec(),
                next_counter: 0,
            }
        } else {
            ProbePlan {
                scope: ProbeScope::Partial,
                endpoints: working_set,
                next_counter: refresh_counter.saturating_add(1),
            }
        }
    }
}
