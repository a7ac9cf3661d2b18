//! Gain computation: a physics baseline per zone and adaptive corrections
//! driven by learned response metrics.

pub mod adaptive;
pub mod baseline;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::ResponseMetrics;
use crate::models::PidGains;

pub use adaptive::adaptive_gains;
pub use baseline::{baseline_gains, thermal_time_constant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainSource {
    Physics,
    PhysicsNotHeating,
    Adaptive,
}

impl GainSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GainSource::Physics => "physics",
            GainSource::PhysicsNotHeating => "physics (not heating)",
            GainSource::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for GainSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recommended gain triple with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainSet {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub source: GainSource,
    pub rationale: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on_events: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tau_hours: Option<f64>,
}

impl GainSet {
    pub fn gains(&self) -> PidGains {
        PidGains::new(self.kp, self.ki, self.kd)
    }

    pub(crate) fn with_source(mut self, source: GainSource) -> Self {
        self.source = source;
        self
    }
}

/// Where a zone stands on its way from physics defaults to learned gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningState {
    /// No controller snapshot and nothing learned.
    NoData,
    PhysicsOnly,
    /// Metrics were recorded but not enough events backed them.
    Learning,
    Adaptive,
}

impl TuningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TuningState::NoData => "no_data",
            TuningState::PhysicsOnly => "physics_only",
            TuningState::Learning => "learning",
            TuningState::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for TuningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub zone_id: String,
    pub state: TuningState,
    pub heating: bool,
    pub current: PidGains,
    pub recommended: GainSet,
    pub baseline: GainSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned: Option<ResponseMetrics>,
}

impl Recommendation {
    pub fn changes_gains(&self) -> bool {
        self.recommended.gains() != self.current
    }
}
