use crate::{types::usable_entries, LatencyMap, NetworkId, Result, RpcHandlerError};

/// Lowest measured latency for the network. Failed entries never qualify.
///
/// Ties go to the lexicographically smallest URL: the map iterates in
/// `(network_id, url)` order and `min_by_key` keeps the first minimum.
pub fn pick_fastest(latencies: &LatencyMap, network_id: NetworkId) -> Result<(String, u64)> {
    usable_entries(latencies, network_id)
        .min_by_key(|(_, latency)| *latency)
        .map(|(key, latency)| (key.url.clone(), latency))
        .ok_or(RpcHandlerError::SelectionFailure { network_id })
}

/// Every usable entry for the network, fastest first, with the same tie-break
/// as [`pick_fastest`].
pub fn rank_fastest(latencies: &LatencyMap, network_id: NetworkId) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = usable_entries(latencies, network_id)
        .map(|(key, latency)| (key.url.clone(), latency))
        .collect();
    ranked.sort_by_key(|(_, latency)| *latency);
    ranked
}
