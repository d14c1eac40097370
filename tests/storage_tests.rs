mod common;

use std::sync::Arc;

use common::{registry, ScriptedTransport, Step};
use fastest_rpc::*;

const NETWORK: NetworkId = 100;
const A: &str = "https://a.example";
const B: &str = "https://b.example";
const C: &str = "https://c.example";

async fn persistent_session(store: Arc<dyn LatencyStore>, transport: Arc<ScriptedTransport>) -> RpcHandler {
    RpcHandler::builder(HandlerConfig::new(NETWORK).with_auto_storage(true).with_env("ci"))
        .registry(registry(NETWORK, &[A, B, C]))
        .transport(transport)
        .store(store)
        .build()
        .await
        .expect("handler init")
}

#[tokio::test]
async fn test_file_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());

    assert!(store.get_latencies("ci", NETWORK).await.unwrap().is_empty());
    assert_eq!(store.get_refresh_counter("ci").await.unwrap(), 0);

    let mut latencies = LatencyMap::new();
    latencies.insert(LatencyKey::new(NETWORK, A), LatencyRecord::measured(12));
    latencies.insert(LatencyKey::new(1, B), LatencyRecord::measured(34));
    store.set_latencies("ci", &latencies).await.unwrap();
    store.set_refresh_counter("ci", 7).await.unwrap();

    let mut update = LatencyMap::new();
    update.insert(LatencyKey::new(NETWORK, C), LatencyRecord::failed(None));
    store.set_latencies("ci", &update).await.unwrap();

    let reopened = FileStore::new(dir.path());
    let network = reopened.get_latencies("ci", NETWORK).await.unwrap();
    assert_eq!(network.len(), 2);
    assert_eq!(network[&LatencyKey::new(NETWORK, A)].latency_ms(), Some(12));
    assert!(network[&LatencyKey::new(NETWORK, C)].is_failed());
    assert_eq!(reopened.get_latencies("ci", 1).await.unwrap().len(), 1);
    assert_eq!(reopened.get_refresh_counter("ci").await.unwrap(), 7);
    assert!(reopened.path_for("ci").exists());
}

#[tokio::test]
async fn test_corrupt_file_is_an_error_but_session_starts_cold() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));
    std::fs::write(store.path_for("ci"), b"not json").unwrap();

    assert!(matches!(
        store.get_latencies("ci", NETWORK).await,
        Err(RpcHandlerError::Serialization(_))
    ));

    let transport = ScriptedTransport::new(&[(A, Step::Reply(10)), (B, Step::Reply(20)), (C, Step::Reply(30))]);
    let handler = persistent_session(store.clone(), transport).await;
    assert!(handler.latencies().await.is_empty());

    // the first cycle rewrites the file with valid state
    handler.get_fastest_rpc_provider().await.unwrap();
    assert_eq!(store.get_latencies("ci", NETWORK).await.unwrap().len(), 3);
}

async fn assert_state_survives_sessions(store: Arc<dyn LatencyStore>) {
    let transport = ScriptedTransport::new(&[(A, Step::Reply(40)), (B, Step::Reply(15)), (C, Step::Fail)]);

    let first = persistent_session(Arc::clone(&store), Arc::clone(&transport)).await;
    assert_eq!(first.get_fastest_rpc_provider().await.unwrap().url, B);
    first.test_rpc_performance().await.unwrap();
    let written_latencies = first.latencies().await;
    let written_counter = first.refresh_counter().await;
    assert_eq!(written_counter, 1);
    first.close().await.unwrap();

    let second = persistent_session(Arc::clone(&store), Arc::clone(&transport)).await;
    assert_eq!(second.latencies().await, written_latencies);
    assert_eq!(second.refresh_counter().await, written_counter);

    // warm start: partial probe over the two endpoints that answered last time
    transport.reset_calls();
    assert_eq!(second.get_fastest_rpc_provider().await.unwrap().url, B);
    assert_eq!(transport.calls_to(C), 0);
    assert_eq!(second.refresh_counter().await, 2);
    assert_eq!(store.get_refresh_counter("ci").await.unwrap(), 2);
}

#[tokio::test]
async fn test_persistence_roundtrip_memory_store() {
    assert_state_survives_sessions(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_persistence_roundtrip_file_store() {
    let dir = tempfile::tempdir().unwrap();
    assert_state_survives_sessions(Arc::new(FileStore::new(dir.path()))).await;
}

#[tokio::test]
async fn test_store_is_ignored_without_auto_storage() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new(&[(A, Step::Reply(10)), (B, Step::Reply(20))]);

    let handler = RpcHandler::builder(HandlerConfig::new(NETWORK))
        .registry(registry(NETWORK, &[A, B]))
        .transport(transport)
        .store(store.clone())
        .build()
        .await
        .unwrap();
    handler.get_fastest_rpc_provider().await.unwrap();

    assert!(store.get_latencies("native", NETWORK).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cached_tracking_endpoint_is_not_used_when_tracking_is_excluded() {
    common::init_tracing();
    const TRACKED: &str = "https://tracked.example";
    let raw = format!(
        r#"{{"{NETWORK}": {{"name": "Test Net", "rpcs": ["{A}", {{"url": "{TRACKED}", "tracking": "yes"}}]}}}}"#
    );
    let registry = Arc::new(EndpointRegistry::from_json(&raw).unwrap());
    let store: Arc<dyn LatencyStore> = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new(&[(A, Step::Reply(50)), (TRACKED, Step::Reply(1))]);

    let permissive = RpcHandler::builder(HandlerConfig::new(NETWORK).with_auto_storage(true))
        .registry(Arc::clone(&registry))
        .transport(transport.clone())
        .store(Arc::clone(&store))
        .build()
        .await
        .unwrap();
    assert_eq!(permissive.get_fastest_rpc_provider().await.unwrap().url, TRACKED);
    permissive.close().await.unwrap();

    let strict = RpcHandler::builder(
        HandlerConfig::new(NETWORK)
            .with_auto_storage(true)
            .with_exclude_tracking_rpcs(true),
    )
    .registry(registry)
    .transport(transport.clone())
    .store(store)
    .build()
    .await
    .unwrap();
    assert_eq!(strict.network_rpcs(), &[A.to_string()]);
    assert!(!strict.latencies().await.contains_key(&LatencyKey::new(NETWORK, TRACKED)));

    transport.reset_calls();
    assert_eq!(strict.get_fastest_rpc_provider().await.unwrap().url, A);
    assert_eq!(transport.calls_to(TRACKED), 0);
    assert_eq!(strict.runtime_rpcs().await, vec![A.to_string()]);
}

#[tokio::test]
async fn test_cached_endpoint_dropped_from_registry_is_forgotten() {
    let store: Arc<dyn LatencyStore> = Arc::new(MemoryStore::new());
    let mut seeded = LatencyMap::new();
    seeded.insert(LatencyKey::new(NETWORK, A), LatencyRecord::measured(30));
    seeded.insert(LatencyKey::new(NETWORK, B), LatencyRecord::measured(40));
    seeded.insert(LatencyKey::new(NETWORK, "https://retired.example"), LatencyRecord::measured(1));
    store.set_state("ci", &seeded, 1).await.unwrap();

    let transport = ScriptedTransport::new(&[(A, Step::Reply(30)), (B, Step::Reply(40)), (C, Step::Reply(60))]);
    let handler = persistent_session(store, Arc::clone(&transport)).await;
    assert_eq!(handler.latencies().await.len(), 2);

    // two usable cached candidates: partial cycle over exactly those
    assert_eq!(handler.get_fastest_rpc_provider().await.unwrap().url, A);
    assert_eq!(transport.calls_to("https://retired.example"), 0);
    assert_eq!(handler.runtime_rpcs().await, vec![A.to_string(), B.to_string()]);
}
