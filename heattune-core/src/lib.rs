pub mod analysis;
pub mod changes;
pub mod config;
pub mod energy;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod report;
pub mod service;
mod sqlite;
pub mod store;
pub mod tuning;

pub use analysis::{
    cycle_metrics, segment, AnalysisWindow, CycleMetrics, HeatingEvent, OnPeriod,
    ResponseAnalyzer, ResponseMetrics, ResponseSettings, SetpointChange, SetpointProfile,
    SetpointTrack,
};
pub use changes::{plan_gain_changes, ChangePlan, GainChange};
pub use config::{
    load_config, AnalysisSection, EnergySection, HealthSection, HeatTuneConfig, PowerSection,
    TuningBounds, ZoneConfig, MAX_WINDOW_HOURS,
};
pub use energy::{cost_report, metered_gj, weekly_kwh, CostReport, CostSource, MeterKind, ZoneDuty};
pub use error::{ConfigError, Result};
pub use health::{HealthIssue, HealthReport, HealthStatus, ZoneHealthInput};
pub use history::{
    ControllerStateSource, HistoryError, HistoryResult, HistorySource, MemoryHistory,
    SampleAttributes, SampleValue, SqliteHistoryStore, SqliteHistoryStoreBuilder, StateSample,
    SwitchState,
};
pub use models::{
    ControllerState, HvacMode, PidGains, ThermalProfile, ToleranceBand, ZoneCategory,
};
pub use report::{weekly_report, PowerRating, WeeklyReport, ZonePerformance, ZoneWeek};
pub use service::{ControllerView, LearningReport, TuningError, TuningResult, TuningService};
pub use store::{JsonLearningStore, LearningStore, MemoryLearningStore, StoreError, StoreResult};
pub use tuning::{
    adaptive_gains, baseline_gains, GainSet, GainSource, Recommendation, TuningState,
};
