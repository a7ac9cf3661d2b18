//! State-history model and the sources the tuning service reads from.
//!
//! A source answers two questions: the chronological trace of one entity
//! over a time range, and the live state of a zone controller. Both are
//! consumed read-only by the analysis pipeline.

mod memory;
mod sqlite;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ControllerState, HvacMode};

pub use memory::MemoryHistory;
pub use sqlite::{SqliteHistoryStore, SqliteHistoryStoreBuilder};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("history store path not configured")]
    MissingStore,
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("history task failed: {0}")]
    Task(String),
}

pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchState {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleValue {
    Switch(SwitchState),
    Numeric(f64),
    Text(String),
    Unavailable,
}

impl SampleValue {
    /// Interprets a raw state string as recorded by a home-automation hub.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "on" => return SampleValue::Switch(SwitchState::On),
            "off" => return SampleValue::Switch(SwitchState::Off),
            "" | "unavailable" | "unknown" | "none" => return SampleValue::Unavailable,
            _ => {}
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => SampleValue::Numeric(value),
            _ => SampleValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_switch(&self) -> Option<SwitchState> {
        match self {
            SampleValue::Switch(state) => Some(*state),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Numeric(value) => Some(*value),
            _ => None,
        }
    }

    /// Inverse of [`SampleValue::parse`], used when persisting samples.
    pub fn to_raw(&self) -> String {
        match self {
            SampleValue::Switch(SwitchState::On) => "on".to_string(),
            SampleValue::Switch(SwitchState::Off) => "off".to_string(),
            SampleValue::Numeric(value) => value.to_string(),
            SampleValue::Text(text) => text.clone(),
            SampleValue::Unavailable => "unavailable".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_mode: Option<HvacMode>,
}

/// One recorded state of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSample {
    pub timestamp: DateTime<Utc>,
    pub value: SampleValue,
    #[serde(default)]
    pub attributes: SampleAttributes,
}

impl StateSample {
    pub fn new(timestamp: DateTime<Utc>, value: SampleValue) -> Self {
        Self {
            timestamp,
            value,
            attributes: SampleAttributes::default(),
        }
    }

    pub fn switch(timestamp: DateTime<Utc>, on: bool) -> Self {
        let state = if on { SwitchState::On } else { SwitchState::Off };
        Self::new(timestamp, SampleValue::Switch(state))
    }

    pub fn numeric(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self::new(timestamp, SampleValue::Numeric(value))
    }

    pub fn unavailable(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, SampleValue::Unavailable)
    }

    /// Controller trace sample carrying the commanded setpoint.
    pub fn controller(timestamp: DateTime<Utc>, mode: HvacMode, setpoint: f64) -> Self {
        Self {
            timestamp,
            value: SampleValue::Text(mode.as_str().to_string()),
            attributes: SampleAttributes {
                setpoint: Some(setpoint),
                hvac_mode: Some(mode),
            },
        }
    }
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Chronological samples of `entity_id` in `[start, end]`. When a state
    /// was already in effect at `start` it is reported as the first sample,
    /// stamped at `start`.
    async fn fetch_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<StateSample>>;
}

#[async_trait]
pub trait ControllerStateSource: Send + Sync {
    async fn controller_state(&self, entity_id: &str) -> HistoryResult<Option<ControllerState>>;
}

/// Builds a window trace from the last sample before `start` (if any) and
/// the samples inside the window.
pub(crate) fn with_initial_state(
    prior: Option<StateSample>,
    mut in_range: Vec<StateSample>,
    start: DateTime<Utc>,
) -> Vec<StateSample> {
    let starts_exactly = in_range
        .first()
        .map(|sample| sample.timestamp == start)
        .unwrap_or(false);
    match prior {
        Some(mut sample) if !starts_exactly => {
            sample.timestamp = start;
            in_range.insert(0, sample);
            in_range
        }
        _ => in_range,
    }
}
