use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    with_initial_state, ControllerStateSource, HistoryResult, HistorySource, StateSample,
};
use crate::models::ControllerState;

/// In-process history, used by tests and by callers that already hold the
/// traces in memory.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    traces: RwLock<HashMap<String, Vec<StateSample>>>,
    controllers: RwLock<HashMap<String, ControllerState>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends samples to a trace, keeping it sorted by timestamp.
    pub async fn extend(&self, entity_id: &str, samples: impl IntoIterator<Item = StateSample>) {
        let mut traces = self.traces.write().await;
        let trace = traces.entry(entity_id.to_string()).or_default();
        trace.extend(samples);
        trace.sort_by_key(|sample| sample.timestamp);
    }

    pub async fn set_controller_state(&self, entity_id: &str, state: ControllerState) {
        self.controllers
            .write()
            .await
            .insert(entity_id.to_string(), state);
    }
}

#[async_trait]
impl HistorySource for MemoryHistory {
    async fn fetch_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<StateSample>> {
        let traces = self.traces.read().await;
        let Some(trace) = traces.get(entity_id) else {
            return Ok(Vec::new());
        };
        let prior = trace
            .iter()
            .filter(|sample| sample.timestamp < start)
            .last()
            .cloned();
        let in_range = trace
            .iter()
            .filter(|sample| sample.timestamp >= start && sample.timestamp <= end)
            .cloned()
            .collect();
        Ok(with_initial_state(prior, in_range, start))
    }
}

#[async_trait]
impl ControllerStateSource for MemoryHistory {
    async fn controller_state(&self, entity_id: &str) -> HistoryResult<Option<ControllerState>> {
        Ok(self.controllers.read().await.get(entity_id).cloned())
    }
}
