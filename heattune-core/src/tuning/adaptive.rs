use super::{GainSet, GainSource};
use crate::analysis::ResponseMetrics;
use crate::config::TuningBounds;
use crate::models::{round_to, PidGains};

const OVERSHOOT_HIGH_C: f64 = 0.5;
const OVERSHOOT_MODERATE_C: f64 = 0.2;
const SLOW_RISE_MINUTES: f64 = 60.0;
const UNDERSHOOT_C: f64 = 0.3;
const SLOW_SETTLING_MINUTES: f64 = 90.0;
const FAST_SETTLING_MINUTES: f64 = 20.0;

/// Corrects the live gains from learned response metrics.
///
/// Each rule starts from the live value of the gain it touches, so a later
/// rule replaces an earlier one on the same gain instead of compounding it.
/// The oscillation rule is the exception for kp: it scales whatever the
/// overshoot rules produced.
pub fn adaptive_gains(current: PidGains, metrics: &ResponseMetrics, bounds: &TuningBounds) -> GainSet {
    let mut kp = current.kp;
    let mut ki = current.ki;
    let mut kd = current.kd;
    let mut rationale = Vec::new();

    let overshoot = metrics.overshoot;
    if overshoot > OVERSHOOT_HIGH_C {
        let reduction = (overshoot * 0.1).min(0.15);
        kp = bounds.clamp_kp(current.kp * (1.0 - reduction));
        ki = bounds.clamp_ki(current.ki * (1.0 - reduction / 2.0));
        rationale.push(format!(
            "High overshoot ({overshoot:.2} °C): Kp -{:.0}%, Ki -{:.1}%",
            reduction * 100.0,
            reduction * 50.0
        ));
    } else if overshoot > OVERSHOOT_MODERATE_C {
        kp = bounds.clamp_kp(current.kp * 0.95);
        rationale.push(format!("Moderate overshoot ({overshoot:.2} °C): Kp -5%"));
    } else if overshoot == 0.0 && metrics.rise_time > SLOW_RISE_MINUTES {
        kp = bounds.clamp_kp(current.kp * 1.1);
        rationale.push(format!(
            "Slow rise ({:.0} min) without overshoot: Kp +10%",
            metrics.rise_time
        ));
    }

    if metrics.undershoot > UNDERSHOOT_C {
        let increase = (metrics.undershoot * 0.15).min(0.2);
        ki = bounds.clamp_ki(current.ki * (1.0 + increase));
        rationale.push(format!(
            "Undershoot ({:.2} °C): Ki +{:.1}%",
            metrics.undershoot,
            increase * 100.0
        ));
    }

    let oscillations = metrics.oscillation_count;
    if oscillations > 3.0 {
        kp = bounds.clamp_kp(kp * 0.9);
        kd = bounds.clamp_kd(current.kd * 1.2);
        rationale.push(format!(
            "Oscillating ({oscillations:.1} crossings per event): Kp -10%, Kd +20%"
        ));
    } else if oscillations > 1.0 {
        kd = bounds.clamp_kd(current.kd * 1.1);
        rationale.push(format!(
            "Some oscillation ({oscillations:.1} crossings per event): Kd +10%"
        ));
    }

    let settling = metrics.settling_time;
    if settling > SLOW_SETTLING_MINUTES {
        kd = bounds.clamp_kd(current.kd * 1.15);
        rationale.push(format!("Slow settling ({settling:.0} min): Kd +15%"));
    } else if settling > 0.0 && settling < FAST_SETTLING_MINUTES && overshoot == 0.0 {
        rationale.push(format!(
            "Settles in {settling:.0} min without overshoot: response is good"
        ));
    }

    if rationale.is_empty() {
        rationale.push("Response within targets: current gains kept".to_string());
    }

    GainSet {
        kp: bounds.clamp_kp(round_to(bounds.clamp_kp(kp), 3)),
        ki: bounds.clamp_ki(round_to(bounds.clamp_ki(ki), 4)),
        kd: bounds.clamp_kd(round_to(bounds.clamp_kd(kd), 1)),
        source: GainSource::Adaptive,
        rationale,
        based_on_events: Some(metrics.analyzed_events),
        tau_hours: None,
    }
}
