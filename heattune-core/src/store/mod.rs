//! Persistence of learned response metrics, one record per zone.

mod json;
mod memory;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::analysis::ResponseMetrics;

pub use json::JsonLearningStore;
pub use memory::MemoryLearningStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access learning store {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("learning store {path} is corrupt: {source}")]
    Corrupt {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("learning store task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn load(&self, zone_id: &str) -> StoreResult<Option<ResponseMetrics>>;

    async fn load_all(&self) -> StoreResult<BTreeMap<String, ResponseMetrics>>;

    /// Replaces the record of `zone_id`; earlier metrics are not merged.
    async fn store(&self, zone_id: &str, metrics: ResponseMetrics) -> StoreResult<()>;
}
