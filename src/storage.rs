use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{LatencyMap, NetworkId, Result, RpcHandlerError};

pub const DEFAULT_ENV: &str = "native";

/// Persists latency measurements and the refresh counter between sessions.
///
/// `env` namespaces the data so unrelated deployments sharing a backend do not
/// see each other's measurements.
#[async_trait]
pub trait LatencyStore: Send + Sync {
    /// Entries for a single network.
    async fn get_latencies(&self, env: &str, network_id: NetworkId) -> Result<LatencyMap>;

    /// Upserts every entry in `latencies`; entries not mentioned are left alone.
    async fn set_latencies(&self, env: &str, latencies: &LatencyMap) -> Result<()>;

    async fn get_refresh_counter(&self, env: &str) -> Result<u32>;

    async fn set_refresh_counter(&self, env: &str, counter: u32) -> Result<()>;

    /// Latencies and counter of one cycle. Backends that can write both at
    /// once should, so the two never drift apart.
    async fn set_state(&self, env: &str, latencies: &LatencyMap, counter: u32) -> Result<()> {
        self.set_latencies(env, latencies).await?;
        self.set_refresh_counter(env, counter).await
    }
}

fn for_network(latencies: &LatencyMap, network_id: NetworkId) -> LatencyMap {
    latencies
        .iter()
        .filter(|(key, _)| key.network_id == network_id)
        .map(|(key, record)| (key.clone(), record.clone()))
        .collect()
}

/// Process-local store. Outlives individual sessions, not the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    latencies: DashMap<String, LatencyMap>,
    counters: DashMap<String, u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LatencyStore for MemoryStore {
    async fn get_latencies(&self, env: &str, network_id: NetworkId) -> Result<LatencyMap> {
        Ok(self
            .latencies
            .get(env)
            .map(|stored| for_network(&stored, network_id))
            .unwrap_or_default())
    }

    async fn set_latencies(&self, env: &str, latencies: &LatencyMap) -> Result<()> {
        let mut stored = self.latencies.entry(env.to_string()).or_default();
        stored.extend(latencies.iter().map(|(key, record)| (key.clone(), record.clone())));
        Ok(())
    }

    async fn get_refresh_counter(&self, env: &str) -> Result<u32> {
        Ok(self.counters.get(env).map(|c| *c).unwrap_or(0))
    }

    async fn set_refresh_counter(&self, env: &str, counter: u32) -> Result<()> {
        self.counters.insert(env.to_string(), counter);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    latencies: LatencyMap,
    #[serde(default)]
    refresh_counter: u32,
}

/// One JSON document per env inside `dir`.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, env: &str) -> PathBuf {
        let file_name: String = env
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }

    async fn load(&self, env: &str) -> Result<StoredState> {
        match tokio::fs::read(self.path_for(env)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoredState::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// A document that no longer parses is replaced rather than blocking every future write.
    async fn load_for_update(&self, env: &str) -> Result<StoredState> {
        match self.load(env).await {
            Err(RpcHandlerError::Serialization(e)) => {
                tracing::warn!(env, error = %e, "discarding unreadable latency cache");
                Ok(StoredState::default())
            }
            other => other,
        }
    }

    async fn save(&self, env: &str, state: &StoredState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(env);
        let tmp = path.with_extension("json.tmp");
        let written = match tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl LatencyStore for FileStore {
    async fn get_latencies(&self, env: &str, network_id: NetworkId) -> Result<LatencyMap> {
        let _guard = self.lock.lock().await;
        let state = self.load(env).await?;
        Ok(for_network(&state.latencies, network_id))
    }

    async fn set_latencies(&self, env: &str, latencies: &LatencyMap) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.load_for_update(env).await?;
        state
            .latencies
            .extend(latencies.iter().map(|(key, record)| (key.clone(), record.clone())));
        self.save(env, &state).await
    }

    async fn get_refresh_counter(&self, env: &str) -> Result<u32> {
        let _guard = self.lock.lock().await;
        Ok(self.load(env).await?.refresh_counter)
    }

    async fn set_refresh_counter(&self, env: &str, counter: u32) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.load_for_update(env).await?;
        state.refresh_counter = counter;
        self.save(env, &state).await
    }

    async fn set_state(&self, env: &str, latencies: &LatencyMap, counter: u32) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.load_for_update(env).await?;
        state
            .latencies
            .extend(latencies.iter().map(|(key, record)| (key.clone(), record.clone())));
        state.refresh_counter = counter;
        self.save(env, &state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LatencyKey, LatencyRecord};

    #[tokio::test]
    async fn test_memory_store_filters_by_network_and_env() {
        let store = MemoryStore::new();
        let mut latencies = LatencyMap::new();
        latencies.insert(LatencyKey::new(1, "https://a.example"), LatencyRecord::measured(10));
        latencies.insert(LatencyKey::new(2, "https://b.example"), LatencyRecord::measured(20));
        store.set_latencies("native", &latencies).await.unwrap();
        store.set_refresh_counter("native", 4).await.unwrap();

        let network_one = store.get_latencies("native", 1).await.unwrap();
        assert_eq!(network_one.len(), 1);
        assert!(network_one.contains_key(&LatencyKey::new(1, "https://a.example")));
        assert!(store.get_latencies("browser", 1).await.unwrap().is_empty());
        assert_eq!(store.get_refresh_counter("native").await.unwrap(), 4);
        assert_eq!(store.get_refresh_counter("browser").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_store_set_state_writes_once_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let mut latencies = LatencyMap::new();
        latencies.insert(LatencyKey::new(1, "https://a.example"), LatencyRecord::measured(10));

        store.set_state("native", &latencies, 3).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path_for("native")).unwrap()).unwrap();
        assert_eq!(raw["refresh_counter"], 3);
        assert_eq!(raw["latencies"].as_object().unwrap().len(), 1);
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        // a directory in the way makes the rename fail
        std::fs::create_dir(store.path_for("native")).unwrap();
        std::fs::write(store.path_for("native").join("keep"), b"x").unwrap();

        assert!(store.save("native", &StoredState::default()).await.is_err());
        assert!(!store.path_for("native").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_sanitizes_env_into_file_name() {
        let store = FileStore::new("/tmp/latencies");
        assert_eq!(store.path_for("node"), PathBuf::from("/tmp/latencies/node.json"));
        assert_eq!(store.path_for("../etc"), PathBuf::from("/tmp/latencies/___etc.json"));
    }
}
