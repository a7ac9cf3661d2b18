use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::debug;

use super::{LearningStore, StoreError, StoreResult};
use crate::analysis::ResponseMetrics;

/// Learned metrics kept in one JSON document keyed by zone id.
///
/// Reads are served from the in-memory copy. Every write rewrites the file
/// through a temporary sibling and an atomic rename, so a crash leaves
/// either the old or the new document on disk.
#[derive(Debug)]
pub struct JsonLearningStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, ResponseMetrics>>,
}

impl JsonLearningStore {
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                    source,
                    path: path.clone(),
                })?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { source, path }),
        };
        debug!(
            target: "heattune",
            path = %path.display(),
            zones = records.len(),
            "learning store opened"
        );
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &BTreeMap<String, ResponseMetrics>) -> StoreResult<()> {
        let payload = serde_json::to_vec_pretty(records)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &payload))
            .await
            .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

fn write_atomically(path: &Path, payload: &[u8]) -> StoreResult<()> {
    let io_error = |source: std::io::Error| StoreError::Io {
        source,
        path: path.to_path_buf(),
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_error)?;
    let mut file = NamedTempFile::new_in(&dir).map_err(io_error)?;
    file.write_all(payload).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(path).map_err(|err| io_error(err.error))?;
    Ok(())
}

#[async_trait]
impl LearningStore for JsonLearningStore {
    async fn load(&self, zone_id: &str) -> StoreResult<Option<ResponseMetrics>> {
        Ok(self.records.read().await.get(zone_id).cloned())
    }

    async fn load_all(&self) -> StoreResult<BTreeMap<String, ResponseMetrics>> {
        Ok(self.records.read().await.clone())
    }

    async fn store(&self, zone_id: &str, metrics: ResponseMetrics) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        next.insert(zone_id.to_string(), metrics);
        self.persist(&next).await?;
        *records = next;
        debug!(
            target: "heattune",
            zone = zone_id,
            path = %self.path.display(),
            "learned metrics stored"
        );
        Ok(())
    }
}
