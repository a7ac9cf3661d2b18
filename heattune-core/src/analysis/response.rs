use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::segment::{segment, HeatingEvent};
use super::setpoint::{SetpointProfile, SetpointTrack};
use crate::config::AnalysisSection;
use crate::history::StateSample;
use crate::models::{round_to, ToleranceBand};

/// Aggregated closed-loop response of one zone over an analysis window.
/// This is the record a learning run persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub overshoot: f64,
    pub undershoot: f64,
    pub settling_time: f64,
    pub oscillation_count: f64,
    pub rise_time: f64,
    pub response_events: usize,
    pub analyzed_events: usize,
    pub excluded_events: usize,
    pub dynamic_setpoint_detected: bool,
    pub setpoint_range: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMetrics {
    pub fn has_sufficient_data(&self, min_analyzed_events: usize) -> bool {
        self.analyzed_events >= min_analyzed_events
    }
}

#[derive(Debug, Clone)]
pub struct ResponseSettings {
    pub max_events: usize,
    pub look_ahead: Duration,
    pub confound_buffer: Duration,
    pub min_event_samples: usize,
    pub settle_window: usize,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self::from(&AnalysisSection::default())
    }
}

impl From<&AnalysisSection> for ResponseSettings {
    fn from(section: &AnalysisSection) -> Self {
        Self {
            max_events: section.max_events,
            look_ahead: section.look_ahead(),
            confound_buffer: section.setpoint_change_buffer(),
            min_event_samples: section.min_event_samples,
            settle_window: section.settle_window_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperaturePoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Numeric readings of a temperature trace; everything else is dropped.
pub fn temperature_points(samples: &[StateSample]) -> Vec<TemperaturePoint> {
    samples
        .iter()
        .filter_map(|sample| {
            sample.value.as_f64().map(|value| TemperaturePoint {
                time: sample.timestamp,
                value,
            })
        })
        .collect()
}

/// Per-event measurements. `None` means the metric did not contribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventResponse {
    pub overshoot: Option<f64>,
    pub undershoot: Option<f64>,
    pub rise_time: Option<f64>,
    pub oscillations: Option<usize>,
    pub settling_time: Option<f64>,
}

pub struct ResponseInputs<'a> {
    pub zone_id: &'a str,
    pub heater: &'a [StateSample],
    pub temperature: &'a [StateSample],
    pub setpoints: &'a SetpointTrack,
    pub live_setpoint: f64,
    pub tolerance: ToleranceBand,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseAnalyzer {
    settings: ResponseSettings,
}

impl ResponseAnalyzer {
    pub fn new(settings: ResponseSettings) -> Self {
        Self { settings }
    }

    pub fn analyze(&self, inputs: &ResponseInputs<'_>) -> ResponseMetrics {
        let segmentation = segment(inputs.heater);
        let events = &segmentation.events;
        let recent = &events[events.len().saturating_sub(self.settings.max_events)..];
        let temps = temperature_points(inputs.temperature);

        let profile = inputs.setpoints.profile();
        let variable = matches!(profile, SetpointProfile::Variable { .. });

        let mut overshoots = Vec::new();
        let mut undershoots = Vec::new();
        let mut rise_times = Vec::new();
        let mut oscillations = Vec::new();
        let mut settling_times = Vec::new();
        let mut excluded = 0usize;

        for event in recent {
            if variable
                && inputs
                    .setpoints
                    .has_change_near(event.start, self.settings.confound_buffer)
            {
                excluded += 1;
                debug!(
                    target: "heattune",
                    zone = inputs.zone_id,
                    start = %event.start,
                    "event excluded: setpoint changed nearby"
                );
                continue;
            }

            let setpoint = inputs
                .setpoints
                .active_setpoint_at(event.start)
                .unwrap_or(inputs.live_setpoint);
            let Some(response) = self.analyze_event(event, &temps, setpoint, inputs.tolerance)
            else {
                continue;
            };

            overshoots.extend(response.overshoot);
            undershoots.extend(response.undershoot);
            rise_times.extend(response.rise_time);
            oscillations.extend(response.oscillations.map(|count| count as f64));
            settling_times.extend(response.settling_time);
        }

        let (setpoint, setpoint_range) = match profile {
            SetpointProfile::Constant { value } => (Some(value.unwrap_or(inputs.live_setpoint)), 0.0),
            SetpointProfile::Variable { range, .. } => (None, range),
        };

        ResponseMetrics {
            overshoot: round_to(mean(&overshoots), 2),
            undershoot: round_to(mean(&undershoots), 2),
            settling_time: round_to(mean(&settling_times), 1),
            oscillation_count: round_to(mean(&oscillations), 1),
            rise_time: round_to(mean(&rise_times), 1),
            response_events: events.len(),
            analyzed_events: overshoots.len().max(settling_times.len()),
            excluded_events: excluded,
            dynamic_setpoint_detected: variable,
            setpoint_range: round_to(setpoint_range, 1),
            setpoint,
            timestamp: inputs.timestamp,
        }
    }

    /// Measures one event against a fixed setpoint. Returns `None` when the
    /// event window holds too few temperature readings.
    pub fn analyze_event(
        &self,
        event: &HeatingEvent,
        temps: &[TemperaturePoint],
        setpoint: f64,
        band: ToleranceBand,
    ) -> Option<EventResponse> {
        let window_end = event.analysis_end(self.settings.look_ahead);
        let window: Vec<TemperaturePoint> = temps
            .iter()
            .copied()
            .filter(|point| point.time >= event.start && point.time <= window_end)
            .collect();
        if window.len() < self.settings.min_event_samples {
            return None;
        }

        let after: Vec<TemperaturePoint> = window
            .iter()
            .copied()
            .filter(|point| point.time >= event.end)
            .collect();
        let lower = band.lower(setpoint);
        let upper = band.upper(setpoint);

        let overshoot = after
            .iter()
            .map(|point| point.value)
            .reduce(f64::max)
            .map(|peak| peak - upper)
            .filter(|value| *value > 0.0);

        let undershoot = window
            .iter()
            .filter(|point| point.time <= event.start)
            .map(|point| point.value)
            .reduce(f64::min)
            .map(|trough| lower - trough)
            .filter(|value| *value > 0.0);

        let rise_time = window
            .iter()
            .find(|point| point.value >= lower)
            .map(|point| minutes_between(event.start, point.time));

        let oscillations = (after.len() > 3).then(|| {
            after
                .windows(2)
                .filter(|pair| (pair[0].value > setpoint) != (pair[1].value > setpoint))
                .count()
        });

        let settling_time = after
            .iter()
            .enumerate()
            .find(|(index, point)| {
                if !band.contains(setpoint, point.value) {
                    return false;
                }
                let remaining = &after[*index..];
                remaining.len() < 3
                    || remaining
                        .iter()
                        .take(self.settings.settle_window)
                        .all(|next| band.contains(setpoint, next.value))
            })
            .map(|(_, point)| minutes_between(event.end, point.time))
            .filter(|minutes| *minutes > 0.0);

        Some(EventResponse {
            overshoot,
            undershoot,
            rise_time,
            oscillations,
            settling_time,
        })
    }
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 6, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn points(values: &[(i64, f64)]) -> Vec<TemperaturePoint> {
        values
            .iter()
            .map(|(minute, value)| TemperaturePoint {
                time: at(*minute),
                value: *value,
            })
            .collect()
    }

    fn event(start: i64, end: i64) -> HeatingEvent {
        HeatingEvent {
            start: at(start),
            end: at(end),
        }
    }

    #[test]
    fn sparse_event_windows_are_skipped() {
        let analyzer = ResponseAnalyzer::default();
        let temps = points(&[(0, 20.0), (10, 20.5), (40, 21.0), (60, 21.0)]);
        assert!(analyzer
            .analyze_event(&event(0, 40), &temps, 21.0, ToleranceBand::symmetric(0.3))
            .is_none());
    }

    #[test]
    fn overshoot_rise_and_undershoot_are_measured() {
        let analyzer = ResponseAnalyzer::default();
        let temps = points(&[
            (0, 20.5),
            (10, 20.8),
            (20, 21.2),
            (40, 21.7),
            (50, 21.5),
            (60, 21.1),
        ]);
        let response = analyzer
            .analyze_event(&event(0, 40), &temps, 21.0, ToleranceBand::symmetric(0.3))
            .unwrap();
        assert!((response.overshoot.unwrap() - 0.4).abs() < 1e-9);
        assert!((response.undershoot.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(response.rise_time, Some(10.0));
        assert!(response.oscillations.is_none());
    }

    #[test]
    fn in_band_peak_contributes_no_overshoot() {
        let analyzer = ResponseAnalyzer::default();
        let temps = points(&[(0, 20.9), (10, 21.0), (20, 21.1), (30, 21.1), (40, 21.2)]);
        let response = analyzer
            .analyze_event(&event(0, 30), &temps, 21.0, ToleranceBand::symmetric(0.3))
            .unwrap();
        assert!(response.overshoot.is_none());
        assert!(response.undershoot.is_none());
        assert_eq!(response.rise_time, Some(0.0));
    }

    #[test]
    fn oscillations_count_crossings_of_setpoint() {
        let analyzer = ResponseAnalyzer::default();
        let temps = points(&[
            (0, 20.0),
            (20, 21.5),
            (30, 20.8),
            (40, 21.2),
            (50, 20.9),
            (60, 20.95),
        ]);
        let response = analyzer
            .analyze_event(&event(0, 20), &temps, 21.0, ToleranceBand::symmetric(0.3))
            .unwrap();
        assert_eq!(response.oscillations, Some(3));
    }

    #[test]
    fn settling_requires_the_band_to_hold() {
        let analyzer = ResponseAnalyzer::default();
        let mut values = vec![(0, 20.2), (10, 20.9), (20, 21.6)];
        // Touches the band at +10 but leaves it again at +20.
        values.push((30, 21.2));
        values.push((40, 21.5));
        // Re-enters at +30 and stays for more than ten samples.
        for minute in (50..=160).step_by(10) {
            values.push((minute, 21.1));
        }
        let response = analyzer
            .analyze_event(
                &event(0, 20),
                &points(&values),
                21.0,
                ToleranceBand::symmetric(0.3),
            )
            .unwrap();
        assert_eq!(response.settling_time, Some(30.0));
    }

    #[test]
    fn short_tail_counts_as_settled() {
        let analyzer = ResponseAnalyzer::default();
        let temps = points(&[
            (0, 20.5),
            (10, 20.8),
            (20, 21.6),
            (30, 21.8),
            (40, 21.5),
            (50, 21.1),
            (60, 21.0),
        ]);
        let response = analyzer
            .analyze_event(&event(0, 20), &temps, 21.0, ToleranceBand::symmetric(0.3))
            .unwrap();
        assert_eq!(response.settling_time, Some(30.0));
    }

    #[test]
    fn settling_at_heater_off_does_not_count() {
        let analyzer = ResponseAnalyzer::default();
        let temps = points(&[(0, 20.5), (10, 20.8), (20, 21.0), (30, 21.1), (40, 21.0)]);
        let response = analyzer
            .analyze_event(&event(0, 20), &temps, 21.0, ToleranceBand::symmetric(0.3))
            .unwrap();
        assert!(response.settling_time.is_none());
    }

    #[test]
    fn aggregation_with_no_events_is_all_zero() {
        let analyzer = ResponseAnalyzer::default();
        let heater = vec![StateSample::switch(at(0), false)];
        let temperature = vec![StateSample::numeric(at(0), 20.0)];
        let track = SetpointTrack::default();
        let metrics = analyzer.analyze(&ResponseInputs {
            zone_id: "bedroom",
            heater: &heater,
            temperature: &temperature,
            setpoints: &track,
            live_setpoint: 20.5,
            tolerance: ToleranceBand::symmetric(0.3),
            timestamp: at(600),
        });
        assert_eq!(metrics.response_events, 0);
        assert_eq!(metrics.analyzed_events, 0);
        assert_eq!(metrics.overshoot, 0.0);
        assert_eq!(metrics.setpoint, Some(20.5));
        assert!(!metrics.dynamic_setpoint_detected);
        assert!(!metrics.has_sufficient_data(3));
    }

    #[test]
    fn averages_count_only_contributing_events() {
        let analyzer = ResponseAnalyzer::default();
        let mut heater = Vec::new();
        let mut temperature = Vec::new();
        // (reading at heater on, peak at heater off)
        let shapes = [(20.3, 22.1), (20.8, 21.1), (20.5, 21.2)];
        for (cycle, (first, peak)) in shapes.into_iter().enumerate() {
            let base = cycle as i64 * 300;
            heater.push(StateSample::switch(at(base), false));
            heater.push(StateSample::switch(at(base + 10), true));
            heater.push(StateSample::switch(at(base + 40), false));
            for (offset, value) in [
                (10, first),
                (20, 20.9),
                (30, 21.0),
                (40, peak),
                (60, 21.1),
                (80, 21.1),
            ] {
                temperature.push(StateSample::numeric(at(base + offset), value));
            }
        }
        let track = SetpointTrack::default();
        let metrics = analyzer.analyze(&ResponseInputs {
            zone_id: "kitchen",
            heater: &heater,
            temperature: &temperature,
            setpoints: &track,
            live_setpoint: 21.0,
            tolerance: ToleranceBand::symmetric(0.3),
            timestamp: at(1000),
        });
        assert_eq!(metrics.response_events, 3);
        // Only the first event overshoots the band.
        assert_eq!(metrics.overshoot, 0.8);
        // The first and third start below it.
        assert_eq!(metrics.undershoot, 0.3);
        assert_eq!(metrics.analyzed_events, 1);
    }

    #[test]
    fn only_most_recent_events_are_analyzed() {
        let analyzer = ResponseAnalyzer::new(ResponseSettings {
            max_events: 2,
            ..ResponseSettings::default()
        });
        let mut heater = Vec::new();
        let mut temperature = Vec::new();
        for cycle in 0..4i64 {
            let base = cycle * 300;
            heater.push(StateSample::switch(at(base), false));
            heater.push(StateSample::switch(at(base + 10), true));
            heater.push(StateSample::switch(at(base + 40), false));
            // Only the oldest two events overshoot.
            let peak = if cycle < 2 { 22.0 } else { 21.2 };
            for (offset, value) in [(10, 20.5), (20, 20.9), (30, 21.0), (40, peak), (60, 21.1)] {
                temperature.push(StateSample::numeric(at(base + offset), value));
            }
        }
        let track = SetpointTrack::default();
        let metrics = analyzer.analyze(&ResponseInputs {
            zone_id: "study",
            heater: &heater,
            temperature: &temperature,
            setpoints: &track,
            live_setpoint: 21.0,
            tolerance: ToleranceBand::symmetric(0.3),
            timestamp: at(1500),
        });
        assert_eq!(metrics.response_events, 4);
        assert_eq!(metrics.overshoot, 0.0);
        assert_eq!(metrics.rise_time, 10.0);
    }
}
