use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LearningStore, StoreResult};
use crate::analysis::ResponseMetrics;

#[derive(Debug, Default)]
pub struct MemoryLearningStore {
    records: RwLock<BTreeMap<String, ResponseMetrics>>,
}

impl MemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LearningStore for MemoryLearningStore {
    async fn load(&self, zone_id: &str) -> StoreResult<Option<ResponseMetrics>> {
        Ok(self.records.read().await.get(zone_id).cloned())
    }

    async fn load_all(&self) -> StoreResult<BTreeMap<String, ResponseMetrics>> {
        Ok(self.records.read().await.clone())
    }

    async fn store(&self, zone_id: &str, metrics: ResponseMetrics) -> StoreResult<()> {
        self.records
            .write()
            .await
            .insert(zone_id.to_string(), metrics);
        Ok(())
    }
}
