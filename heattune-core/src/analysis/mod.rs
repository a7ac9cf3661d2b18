//! Pure analysis of recorded heater, temperature and setpoint traces.

pub mod cycles;
pub mod response;
pub mod segment;
pub mod setpoint;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use cycles::{cycle_metrics, CycleMetrics};
pub use response::{
    temperature_points, EventResponse, ResponseAnalyzer, ResponseInputs, ResponseMetrics,
    ResponseSettings, TemperaturePoint,
};
pub use segment::{segment, HeatingEvent, OnPeriod, Segmentation};
pub use setpoint::{SetpointChange, SetpointProfile, SetpointTrack};

/// Closed time range an analysis looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AnalysisWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of `length` ending at `end`; `None` when the length is
    /// negative or the start falls outside the representable range.
    pub fn trailing(end: DateTime<Utc>, length: Duration) -> Option<Self> {
        if length < Duration::zero() {
            return None;
        }
        let start = end.checked_sub_signed(length)?;
        Some(Self { start, end })
    }

    pub fn trailing_hours(end: DateTime<Utc>, hours: i64) -> Option<Self> {
        Self::trailing(end, Duration::try_hours(hours)?)
    }

    pub fn trailing_minutes(end: DateTime<Utc>, minutes: i64) -> Option<Self> {
        Self::trailing(end, Duration::try_minutes(minutes)?)
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}
