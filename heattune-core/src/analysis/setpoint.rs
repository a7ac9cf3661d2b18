use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::history::StateSample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointChange {
    pub time: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SetpointProfile {
    Constant { value: Option<f64> },
    Variable { min: f64, max: f64, range: f64 },
}

/// Commanded setpoint history of a controller, deduplicated by value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetpointTrack {
    changes: Vec<SetpointChange>,
}

impl SetpointTrack {
    pub fn from_samples(samples: &[StateSample]) -> Self {
        Self::from_changes(samples.iter().filter_map(|sample| {
            sample.attributes.setpoint.map(|value| SetpointChange {
                time: sample.timestamp,
                value,
            })
        }))
    }

    pub fn from_changes(changes: impl IntoIterator<Item = SetpointChange>) -> Self {
        let mut retained: Vec<SetpointChange> = Vec::new();
        for change in changes {
            if retained.last().map(|last| last.value) != Some(change.value) {
                retained.push(change);
            }
        }
        Self { changes: retained }
    }

    pub fn changes(&self) -> &[SetpointChange] {
        &self.changes
    }

    pub fn profile(&self) -> SetpointProfile {
        if self.changes.len() <= 1 {
            return SetpointProfile::Constant {
                value: self.changes.first().map(|change| change.value),
            };
        }
        let min = self
            .changes
            .iter()
            .map(|change| change.value)
            .fold(f64::INFINITY, f64::min);
        let max = self
            .changes
            .iter()
            .map(|change| change.value)
            .fold(f64::NEG_INFINITY, f64::max);
        SetpointProfile::Variable {
            min,
            max,
            range: max - min,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.profile(), SetpointProfile::Variable { .. })
    }

    /// Value of the last change at or before `time`.
    pub fn active_setpoint_at(&self, time: DateTime<Utc>) -> Option<f64> {
        self.changes
            .iter()
            .take_while(|change| change.time <= time)
            .last()
            .map(|change| change.value)
    }

    /// True when a recorded change lies strictly closer than `buffer` to `time`.
    pub fn has_change_near(&self, time: DateTime<Utc>, buffer: Duration) -> bool {
        self.changes.iter().any(|change| {
            let distance = if change.time > time {
                change.time - time
            } else {
                time - change.time
            };
            distance < buffer
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HvacMode;
    use chrono::TimeZone;

    fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn sample(hours: i64, setpoint: f64) -> StateSample {
        StateSample::controller(at(hours), HvacMode::Heat, setpoint)
    }

    #[test]
    fn repeated_values_are_collapsed() {
        let track = SetpointTrack::from_samples(&[
            sample(0, 20.0),
            sample(1, 20.0),
            sample(2, 21.5),
            sample(3, 21.5),
            sample(4, 20.0),
        ]);
        let values: Vec<f64> = track.changes().iter().map(|c| c.value).collect();
        assert_eq!(values, vec![20.0, 21.5, 20.0]);
        assert_eq!(track.changes()[1].time, at(2));
    }

    #[test]
    fn samples_without_setpoint_are_skipped() {
        let mut plain = StateSample::numeric(at(1), 0.0);
        plain.attributes.setpoint = None;
        let track = SetpointTrack::from_samples(&[sample(0, 21.0), plain]);
        assert_eq!(track.changes().len(), 1);
    }

    #[test]
    fn classification_by_distinct_points() {
        assert_eq!(
            SetpointTrack::default().profile(),
            SetpointProfile::Constant { value: None }
        );
        let constant = SetpointTrack::from_samples(&[sample(0, 21.0), sample(5, 21.0)]);
        assert_eq!(
            constant.profile(),
            SetpointProfile::Constant { value: Some(21.0) }
        );
        assert!(!constant.is_variable());

        let variable = SetpointTrack::from_samples(&[sample(0, 19.0), sample(5, 21.5)]);
        assert_eq!(
            variable.profile(),
            SetpointProfile::Variable {
                min: 19.0,
                max: 21.5,
                range: 2.5
            }
        );
    }

    #[test]
    fn active_setpoint_uses_last_change_at_or_before() {
        let track = SetpointTrack::from_samples(&[sample(2, 19.0), sample(6, 21.0)]);
        assert_eq!(track.active_setpoint_at(at(1)), None);
        assert_eq!(track.active_setpoint_at(at(2)), Some(19.0));
        assert_eq!(track.active_setpoint_at(at(5)), Some(19.0));
        assert_eq!(track.active_setpoint_at(at(6)), Some(21.0));
        assert_eq!(track.active_setpoint_at(at(30)), Some(21.0));
    }

    #[test]
    fn change_proximity_is_strict_and_symmetric() {
        let track = SetpointTrack::from_samples(&[sample(10, 19.0), sample(20, 21.0)]);
        let buffer = Duration::hours(2);
        assert!(track.has_change_near(at(11), buffer));
        assert!(track.has_change_near(at(9), buffer));
        assert!(!track.has_change_near(at(12), buffer));
        assert!(!track.has_change_near(at(15), buffer));
    }
}
