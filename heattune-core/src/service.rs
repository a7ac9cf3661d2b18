use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::{
    cycle_metrics, segment, AnalysisWindow, CycleMetrics, ResponseAnalyzer, ResponseInputs,
    ResponseMetrics, ResponseSettings, SetpointTrack,
};
use crate::config::{HeatTuneConfig, ZoneConfig};
use crate::error::ConfigError;
use crate::history::{ControllerStateSource, HistorySource, StateSample};
use crate::models::{ControllerState, PidGains, ToleranceBand};
use crate::store::{LearningStore, StoreError};
use crate::tuning::{
    adaptive_gains, baseline_gains, GainSource, Recommendation, TuningState,
};

#[derive(Debug, Error)]
pub enum TuningError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to persist learned metrics for {zone}: {source}")]
    Store { zone: String, source: StoreError },
    #[error("analysis window of {hours} h is out of range")]
    Window { hours: i64 },
}

pub type TuningResult<T> = std::result::Result<T, TuningError>;

/// Controller state with every missing field resolved from configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerView {
    pub reported: Option<ControllerState>,
    pub heating: bool,
    pub setpoint: f64,
    pub tolerance: ToleranceBand,
    pub gains: PidGains,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub window: AnalysisWindow,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub insufficient: Vec<String>,
    pub metrics: BTreeMap<String, ResponseMetrics>,
}

enum ZoneLearning {
    NotHeating,
    Insufficient(Option<ResponseMetrics>),
    Ready(ResponseMetrics),
}

pub struct TuningService {
    config: Arc<HeatTuneConfig>,
    history: Arc<dyn HistorySource>,
    controllers: Arc<dyn ControllerStateSource>,
    store: Arc<dyn LearningStore>,
    analyzer: ResponseAnalyzer,
    learning: Mutex<()>,
}

impl TuningService {
    pub fn new(
        config: Arc<HeatTuneConfig>,
        history: Arc<dyn HistorySource>,
        controllers: Arc<dyn ControllerStateSource>,
        store: Arc<dyn LearningStore>,
    ) -> Self {
        let analyzer = ResponseAnalyzer::new(ResponseSettings::from(&config.analysis));
        Self {
            config,
            history,
            controllers,
            store,
            analyzer,
            learning: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &HeatTuneConfig {
        &self.config
    }

    fn zone(&self, zone_id: &str) -> TuningResult<&ZoneConfig> {
        Ok(self.config.zone(zone_id)?)
    }

    async fn fetch(&self, entity_id: &str, window: AnalysisWindow) -> Vec<StateSample> {
        match self
            .history
            .fetch_history(entity_id, window.start, window.end)
            .await
        {
            Ok(samples) => samples,
            Err(err) => {
                warn!(
                    target: "heattune::history",
                    entity = entity_id,
                    error = %err,
                    "history fetch failed; treating as empty"
                );
                Vec::new()
            }
        }
    }

    pub async fn controller_view(&self, zone_id: &str) -> TuningResult<ControllerView> {
        let zone = self.zone(zone_id)?;
        let reported = match self.controllers.controller_state(&zone.climate_entity).await {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    target: "heattune::history",
                    zone = zone_id,
                    entity = %zone.climate_entity,
                    error = %err,
                    "controller state unavailable; using configured fallbacks"
                );
                None
            }
        };
        let analysis = &self.config.analysis;
        let fallback_gains = zone.default_gains.unwrap_or(analysis.default_gains);
        Ok(ControllerView {
            heating: reported.as_ref().map(ControllerState::is_heating).unwrap_or(false),
            setpoint: reported
                .as_ref()
                .and_then(|state| state.setpoint)
                .unwrap_or(analysis.fallback_setpoint),
            tolerance: reported
                .as_ref()
                .and_then(|state| state.tolerances)
                .unwrap_or_else(|| analysis.default_tolerances()),
            gains: reported
                .as_ref()
                .and_then(|state| state.gains)
                .unwrap_or(fallback_gains),
            reported,
        })
    }

    /// Switching statistics of the zone heater over the last `hours`.
    pub async fn analyze_cycles(
        &self,
        zone_id: &str,
        hours: i64,
    ) -> TuningResult<Option<CycleMetrics>> {
        let window = trailing_window(Utc::now(), hours)?;
        self.analyze_cycles_in(zone_id, window).await
    }

    pub async fn analyze_cycles_in(
        &self,
        zone_id: &str,
        window: AnalysisWindow,
    ) -> TuningResult<Option<CycleMetrics>> {
        let zone = self.zone(zone_id)?;
        let heater = self.fetch(&zone.heater_entity, window).await;
        if heater.is_empty() {
            debug!(target: "heattune", zone = zone_id, "no heater history in window");
            return Ok(None);
        }
        let segmentation = segment(&heater);
        Ok(Some(cycle_metrics(
            &segmentation.on_periods,
            window.length(),
            self.config.power.reference_w_m2,
        )))
    }

    /// Closed-loop response of the zone over the last `hours`.
    pub async fn analyze_heating_response(
        &self,
        zone_id: &str,
        hours: i64,
    ) -> TuningResult<Option<ResponseMetrics>> {
        let window = trailing_window(Utc::now(), hours)?;
        self.analyze_heating_response_in(zone_id, window).await
    }

    pub async fn analyze_heating_response_in(
        &self,
        zone_id: &str,
        window: AnalysisWindow,
    ) -> TuningResult<Option<ResponseMetrics>> {
        let zone = self.zone(zone_id)?;
        let (temperature, heater, climate, view) = futures::join!(
            self.fetch(&zone.temperature_entity, window),
            self.fetch(&zone.heater_entity, window),
            self.fetch(&zone.climate_entity, window),
            self.controller_view(zone_id),
        );
        let view = view?;
        if temperature.is_empty() || heater.is_empty() {
            debug!(
                target: "heattune",
                zone = zone_id,
                temperature = temperature.len(),
                heater = heater.len(),
                "not enough history for response analysis"
            );
            return Ok(None);
        }

        let setpoints = SetpointTrack::from_samples(&climate);
        let metrics = self.analyzer.analyze(&ResponseInputs {
            zone_id,
            heater: &heater,
            temperature: &temperature,
            setpoints: &setpoints,
            live_setpoint: view.setpoint,
            tolerance: view.tolerance,
            timestamp: window.end,
        });
        debug!(
            target: "heattune",
            zone = zone_id,
            events = metrics.response_events,
            analyzed = metrics.analyzed_events,
            excluded = metrics.excluded_events,
            "response analysed"
        );
        Ok(Some(metrics))
    }

    /// True when the most recent temperature reading is numeric.
    pub async fn sensor_available(&self, zone_id: &str, now: DateTime<Utc>) -> TuningResult<bool> {
        let zone = self.zone(zone_id)?;
        let lookback = self.config.health.sensor_lookback();
        let window = AnalysisWindow::trailing(now, lookback).ok_or(TuningError::Window {
            hours: lookback.num_hours(),
        })?;
        let samples = self.fetch(&zone.temperature_entity, window).await;
        Ok(samples
            .last()
            .map(|sample| sample.value.as_f64().is_some())
            .unwrap_or(false))
    }

    /// Learned metrics for a zone; a failing store reads as nothing learned.
    pub async fn learned_metrics(&self, zone_id: &str) -> Option<ResponseMetrics> {
        match self.store.load(zone_id).await {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(
                    target: "heattune",
                    zone = zone_id,
                    error = %err,
                    "learning store read failed"
                );
                None
            }
        }
    }

    pub async fn recommend_gains(&self, zone_id: &str) -> TuningResult<Recommendation> {
        let zone = self.zone(zone_id)?;
        let baseline = baseline_gains(&zone.thermal_profile(), &self.config.tuning);
        let (view, learned) =
            futures::join!(self.controller_view(zone_id), self.learned_metrics(zone_id));
        let view = view?;
        let min_events = self.config.analysis.min_analyzed_events;

        let (state, recommended) = if !view.heating {
            let state = if view.reported.is_none() && learned.is_none() {
                TuningState::NoData
            } else {
                TuningState::PhysicsOnly
            };
            (
                state,
                baseline.clone().with_source(GainSource::PhysicsNotHeating),
            )
        } else {
            match &learned {
                Some(metrics) if metrics.has_sufficient_data(min_events) => (
                    TuningState::Adaptive,
                    adaptive_gains(view.gains, metrics, &self.config.tuning),
                ),
                Some(_) => (TuningState::Learning, baseline.clone()),
                None => (TuningState::PhysicsOnly, baseline.clone()),
            }
        };

        Ok(Recommendation {
            zone_id: zone_id.to_string(),
            state,
            heating: view.heating,
            current: view.gains,
            recommended,
            baseline,
            learned,
        })
    }

    /// Analyses every requested zone and stores metrics backed by enough
    /// events. Runs never overlap.
    pub async fn run_learning(&self, zone_ids: &[String]) -> TuningResult<LearningReport> {
        self.run_learning_at(zone_ids, Utc::now()).await
    }

    pub async fn run_learning_at(
        &self,
        zone_ids: &[String],
        now: DateTime<Utc>,
    ) -> TuningResult<LearningReport> {
        let _guard = self.learning.lock().await;
        for zone_id in zone_ids {
            self.zone(zone_id)?;
        }

        let run_id = Uuid::new_v4();
        let length = self.config.analysis.window();
        let window = AnalysisWindow::trailing(now, length).ok_or(TuningError::Window {
            hours: length.num_hours(),
        })?;
        info!(
            target: "heattune::learning",
            %run_id,
            zones = zone_ids.len(),
            "learning run started"
        );

        let outcomes = join_all(
            zone_ids
                .iter()
                .map(|zone_id| self.learn_zone(zone_id, window)),
        )
        .await;

        let mut report = LearningReport {
            run_id,
            started_at: now,
            window,
            updated: Vec::new(),
            skipped: Vec::new(),
            insufficient: Vec::new(),
            metrics: BTreeMap::new(),
        };
        for (zone_id, outcome) in zone_ids.iter().zip(outcomes) {
            match outcome? {
                ZoneLearning::NotHeating => report.skipped.push(zone_id.clone()),
                ZoneLearning::Insufficient(metrics) => {
                    let analyzed = metrics.as_ref().map(|m| m.analyzed_events).unwrap_or(0);
                    info!(
                        target: "heattune::learning",
                        %run_id,
                        zone = %zone_id,
                        analyzed,
                        "insufficient events; keeping previous metrics"
                    );
                    report.insufficient.push(zone_id.clone());
                }
                ZoneLearning::Ready(metrics) => {
                    self.store
                        .store(zone_id, metrics.clone())
                        .await
                        .map_err(|source| TuningError::Store {
                            zone: zone_id.clone(),
                            source,
                        })?;
                    info!(
                        target: "heattune::learning",
                        %run_id,
                        zone = %zone_id,
                        analyzed = metrics.analyzed_events,
                        overshoot = metrics.overshoot,
                        settling = metrics.settling_time,
                        "learned metrics updated"
                    );
                    report.updated.push(zone_id.clone());
                    report.metrics.insert(zone_id.clone(), metrics);
                }
            }
        }

        info!(
            target: "heattune::learning",
            %run_id,
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            insufficient = report.insufficient.len(),
            "learning run finished"
        );
        Ok(report)
    }

    async fn learn_zone(&self, zone_id: &str, window: AnalysisWindow) -> TuningResult<ZoneLearning> {
        let view = self.controller_view(zone_id).await?;
        if !view.heating {
            info!(
                target: "heattune::learning",
                zone = zone_id,
                "controller not heating; zone skipped"
            );
            return Ok(ZoneLearning::NotHeating);
        }
        let metrics = self.analyze_heating_response_in(zone_id, window).await?;
        Ok(match metrics {
            Some(metrics) if metrics.has_sufficient_data(self.config.analysis.min_analyzed_events) => {
                ZoneLearning::Ready(metrics)
            }
            other => ZoneLearning::Insufficient(other),
        })
    }
}

fn trailing_window(end: DateTime<Utc>, hours: i64) -> TuningResult<AnalysisWindow> {
    AnalysisWindow::trailing_hours(end, hours).ok_or(TuningError::Window { hours })
}
