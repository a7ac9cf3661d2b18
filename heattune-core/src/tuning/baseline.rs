use super::{GainSet, GainSource};
use crate::config::TuningBounds;
use crate::models::{round_to, ThermalProfile, ZoneCategory};

/// Cooling rate (°C/h) at which the proportional gain starts to rise.
const KP_COOL_RATE_FLOOR: f64 = 0.05;
/// Cooling-rate span over which kp moves from its minimum to its maximum.
const KP_COOL_RATE_SPAN: f64 = 0.03;
const KI_TAU_PIVOT_HOURS: f64 = 15.0;
const KI_TAU_SPAN_HOURS: f64 = 10.0;
const KD_SLOW_TAU_HOURS: f64 = 20.0;
const KD_MEDIUM_TAU_HOURS: f64 = 15.0;

/// Thermal time constant in hours: the time for the zone's excess
/// temperature to decay by a factor of e with the heating off, taken as
/// the reciprocal of the measured cooling rate.
pub fn thermal_time_constant(profile: &ThermalProfile, fallback_hours: f64) -> f64 {
    if profile.cool_rate_c_per_hour > 0.0 {
        1.0 / profile.cool_rate_c_per_hour
    } else {
        fallback_hours
    }
}

/// Physics-derived gains for a zone, independent of any recorded history.
pub fn baseline_gains(profile: &ThermalProfile, bounds: &TuningBounds) -> GainSet {
    let tau = thermal_time_constant(profile, bounds.tau_fallback_hours);
    let cool_rate = profile.cool_rate_c_per_hour;

    let kp_position = clamp01((cool_rate - KP_COOL_RATE_FLOOR) / KP_COOL_RATE_SPAN);
    let mut kp = bounds.kp_min + (bounds.kp_max - bounds.kp_min) * kp_position;

    let ki_position = clamp01(1.0 - (tau - KI_TAU_PIVOT_HOURS) / KI_TAU_SPAN_HOURS);
    let mut ki = bounds.ki_min + (bounds.ki_max - bounds.ki_min) * ki_position;

    let kd = if tau > KD_SLOW_TAU_HOURS {
        bounds.kd_slow
    } else if tau > KD_MEDIUM_TAU_HOURS {
        bounds.kd_medium
    } else {
        bounds.kd_fast
    };

    let mut rationale = vec![format!(
        "Thermal time constant {:.1} h from cooling rate {:.3} °C/h",
        tau, cool_rate
    )];
    match profile.category {
        ZoneCategory::Disturbance => {
            ki *= 0.8;
            rationale.push(
                "Frequent disturbances (oven, exterior door): Ki lowered 20% to limit overshoot"
                    .to_string(),
            );
        }
        ZoneCategory::Skylight => {
            kp = (kp * 1.2).min(bounds.kp_max);
            rationale.push("Skylight heat loss: Kp raised 20% for a faster response".to_string());
        }
        ZoneCategory::Ventilation => {
            ki *= 0.9;
            rationale.push("Ventilated zone: Ki lowered 10% against integral wind-up".to_string());
        }
        ZoneCategory::Coupled => {
            rationale.push("Open-plan zone: tuned alongside its coupled neighbour".to_string());
        }
        ZoneCategory::Standard => {
            rationale.push("Standard zone: baseline tuning".to_string());
        }
    }

    GainSet {
        kp: bounds.clamp_kp(round_to(kp, 3)),
        ki: bounds.clamp_ki(round_to(ki, 4)),
        kd: bounds.clamp_kd(round_to(kd, 1)),
        source: GainSource::Physics,
        rationale,
        based_on_events: None,
        tau_hours: Some(round_to(tau, 1)),
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
