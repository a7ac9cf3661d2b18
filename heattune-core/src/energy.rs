//! Weekly energy and cost figures, either estimated from heater duty cycles
//! or read from a district-heating meter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::EnergySection;
use crate::history::StateSample;
use crate::models::round_to;

const HOURS_PER_DAY: f64 = 24.0;
const DAYS_PER_WEEK: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterKind {
    /// Monotonic counter; usage is the growth over the window.
    Cumulative,
    /// Counter that restarts each period; the latest reading is the usage.
    Resetting,
}

impl FromStr for MeterKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cumulative" => Ok(MeterKind::Cumulative),
            "resetting" => Ok(MeterKind::Resetting),
            other => Err(format!("unknown meter kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    Meter,
    DutyCycleEstimate,
}

impl fmt::Display for CostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostSource::Meter => f.write_str("meter"),
            CostSource::DutyCycleEstimate => f.write_str("duty-cycle estimate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneEnergy {
    pub zone_id: String,
    pub duty_cycle_percent: f64,
    pub kwh_week: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub source: CostSource,
    pub zones: Vec<ZoneEnergy>,
    pub estimated_kwh: f64,
    pub metered_gj: Option<f64>,
    pub gj: f64,
    pub kwh: f64,
    pub cost: f64,
    pub gj_price: f64,
}

/// Weekly kWh of one zone, extrapolated from its duty cycle.
pub fn weekly_kwh(duty_cycle_percent: f64, area_m2: f64, reference_w_m2: f64) -> f64 {
    duty_cycle_percent / 100.0 * reference_w_m2 * area_m2 * HOURS_PER_DAY / 1000.0 * DAYS_PER_WEEK
}

/// Usage in GJ from a meter trace, or `None` without two usable readings
/// (one for a resetting meter).
pub fn metered_gj(samples: &[StateSample], kind: MeterKind) -> Option<f64> {
    let mut readings = samples.iter().filter_map(|sample| sample.value.as_f64());
    match kind {
        MeterKind::Cumulative => {
            let first = readings.next()?;
            let last = readings.last()?;
            Some((last - first).max(0.0))
        }
        MeterKind::Resetting => readings.last().map(|value| value.max(0.0)),
    }
}

pub struct ZoneDuty<'a> {
    pub zone_id: &'a str,
    pub area_m2: f64,
    pub duty_cycle_percent: f64,
}

/// Combines the duty-cycle estimate with an optional meter reading. The
/// meter wins whenever it reports positive usage.
pub fn cost_report(
    zones: &[ZoneDuty<'_>],
    metered_gj: Option<f64>,
    energy: &EnergySection,
    reference_w_m2: f64,
) -> CostReport {
    let zone_energy: Vec<ZoneEnergy> = zones
        .iter()
        .map(|zone| ZoneEnergy {
            zone_id: zone.zone_id.to_string(),
            duty_cycle_percent: zone.duty_cycle_percent,
            kwh_week: round_to(
                weekly_kwh(zone.duty_cycle_percent, zone.area_m2, reference_w_m2),
                1,
            ),
        })
        .collect();
    let estimated_kwh: f64 = zones
        .iter()
        .map(|zone| weekly_kwh(zone.duty_cycle_percent, zone.area_m2, reference_w_m2))
        .sum();

    let (source, gj) = match metered_gj {
        Some(gj) if gj > 0.0 => (CostSource::Meter, gj),
        _ => (
            CostSource::DutyCycleEstimate,
            if energy.gj_to_kwh_factor > 0.0 {
                estimated_kwh / energy.gj_to_kwh_factor
            } else {
                0.0
            },
        ),
    };
    let kwh = gj * energy.gj_to_kwh_factor;

    CostReport {
        source,
        zones: zone_energy,
        estimated_kwh: round_to(estimated_kwh, 1),
        metered_gj: metered_gj.map(|value| round_to(value, 3)),
        gj: round_to(gj, 3),
        kwh: round_to(kwh, 1),
        cost: round_to(gj * energy.gj_price, 2),
        gj_price: energy.gj_price,
    }
}
