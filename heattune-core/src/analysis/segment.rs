use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::history::{StateSample, SwitchState};

/// One completed off -> on -> off transition of a heater switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl OnPeriod {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A heating burst whose thermal response is analysed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatingEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HeatingEvent {
    pub fn analysis_end(&self, look_ahead: Duration) -> DateTime<Utc> {
        self.end + look_ahead
    }
}

impl From<OnPeriod> for HeatingEvent {
    fn from(period: OnPeriod) -> Self {
        Self {
            start: period.start,
            end: period.end,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segmentation {
    pub on_periods: Vec<OnPeriod>,
    pub events: Vec<HeatingEvent>,
}

/// Splits a heater trace into completed on-periods.
///
/// Only transitions observed in full are kept: a leading `on` has an unknown
/// start and a trailing `on` has no end. Anything that is not a switch
/// state breaks the trace and the scan waits for the next `off`.
pub fn segment(samples: &[StateSample]) -> Segmentation {
    let mut last: Option<SwitchState> = None;
    let mut open: Option<DateTime<Utc>> = None;
    let mut on_periods = Vec::new();

    for sample in samples {
        match sample.value.as_switch() {
            Some(SwitchState::On) => {
                if last == Some(SwitchState::Off) {
                    open = Some(sample.timestamp);
                }
                last = Some(SwitchState::On);
            }
            Some(SwitchState::Off) => {
                if last == Some(SwitchState::On) {
                    if let Some(start) = open.take() {
                        on_periods.push(OnPeriod {
                            start,
                            end: sample.timestamp,
                        });
                    }
                }
                last = Some(SwitchState::Off);
            }
            None => {
                open = None;
                last = None;
            }
        }
    }

    let events = on_periods.iter().copied().map(HeatingEvent::from).collect();
    Segmentation { on_periods, events }
}
