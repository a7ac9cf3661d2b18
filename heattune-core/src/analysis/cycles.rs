use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::segment::OnPeriod;
use crate::models::round_to;

/// Switching behaviour of one heater over an analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub avg_cycle_minutes: f64,
    pub duty_cycle_percent: f64,
    pub power_w_m2: f64,
    pub cycle_count: usize,
}

pub fn cycle_metrics(periods: &[OnPeriod], window: Duration, reference_w_m2: f64) -> CycleMetrics {
    if periods.is_empty() {
        return CycleMetrics::default();
    }

    let durations: Vec<f64> = periods
        .iter()
        .map(|period| period.duration().num_milliseconds().max(0) as f64 / 60_000.0)
        .collect();
    let total_minutes: f64 = durations.iter().sum();
    let avg_cycle_minutes = total_minutes / durations.len() as f64;

    let window_minutes = window.num_milliseconds() as f64 / 60_000.0;
    let duty_cycle_percent = if window_minutes > 0.0 {
        (total_minutes / window_minutes * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let power_w_m2 = duty_cycle_percent / 100.0 * reference_w_m2;

    CycleMetrics {
        avg_cycle_minutes: round_to(avg_cycle_minutes, 1),
        duty_cycle_percent: round_to(duty_cycle_percent, 1),
        power_w_m2: round_to(power_w_m2, 1),
        cycle_count: periods.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn period(start_min: i64, end_min: i64) -> OnPeriod {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        OnPeriod {
            start: base + Duration::minutes(start_min),
            end: base + Duration::minutes(end_min),
        }
    }

    #[test]
    fn no_periods_yield_zero_metrics() {
        let metrics = cycle_metrics(&[], Duration::hours(24), 50.0);
        assert_eq!(metrics, CycleMetrics::default());
        assert_eq!(metrics.cycle_count, 0);
    }

    #[test]
    fn duty_and_power_follow_on_time() {
        // Six hours of on-time in a 24 hour window.
        let periods = [period(0, 120), period(300, 420), period(600, 720)];
        let metrics = cycle_metrics(&periods, Duration::hours(24), 50.0);
        assert_eq!(metrics.cycle_count, 3);
        assert_eq!(metrics.avg_cycle_minutes, 120.0);
        assert_eq!(metrics.duty_cycle_percent, 25.0);
        assert_eq!(metrics.power_w_m2, 12.5);
    }

    #[test]
    fn values_are_rounded_to_one_decimal() {
        let periods = [period(0, 10), period(20, 27)];
        let metrics = cycle_metrics(&periods, Duration::hours(7), 50.0);
        assert_eq!(metrics.avg_cycle_minutes, 8.5);
        assert_eq!(metrics.duty_cycle_percent, 4.0);
        assert_eq!(metrics.power_w_m2, 2.0);
    }

    #[test]
    fn duty_never_exceeds_full_window() {
        let periods = [period(0, 180)];
        let metrics = cycle_metrics(&periods, Duration::hours(1), 50.0);
        assert_eq!(metrics.duty_cycle_percent, 100.0);
        assert_eq!(metrics.power_w_m2, 50.0);
    }
}
