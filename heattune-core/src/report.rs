use std::fmt;

use serde::Serialize;

use crate::analysis::CycleMetrics;
use crate::config::{EnergySection, ZoneConfig};
use crate::models::round_to;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerRating {
    Excellent,
    Good,
    High,
}

impl PowerRating {
    pub fn classify(power_w_m2: f64, energy: &EnergySection) -> Self {
        if power_w_m2 <= energy.excellent_w_m2 {
            PowerRating::Excellent
        } else if power_w_m2 <= energy.target_w_m2 {
            PowerRating::Good
        } else {
            PowerRating::High
        }
    }
}

impl fmt::Display for PowerRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PowerRating::Excellent => "excellent",
            PowerRating::Good => "good",
            PowerRating::High => "high",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonePerformance {
    pub zone_id: String,
    pub display_name: String,
    pub power_w_m2: f64,
    pub avg_cycle_minutes: f64,
    pub duty_cycle_percent: f64,
    pub rating: PowerRating,
    pub short_cycling: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyReport {
    pub zones: Vec<ZonePerformance>,
    /// Area-weighted mean power; absent when no zone reported metrics.
    pub system_average_w_m2: Option<f64>,
    pub short_cycling: Vec<String>,
}

pub struct ZoneWeek<'a> {
    pub zone_id: &'a str,
    pub zone: &'a ZoneConfig,
    pub cycles: CycleMetrics,
}

pub fn weekly_report(
    zones: &[ZoneWeek<'_>],
    energy: &EnergySection,
    short_cycle_min: f64,
) -> WeeklyReport {
    let performance: Vec<ZonePerformance> = zones
        .iter()
        .map(|entry| {
            let cycle = entry.cycles.avg_cycle_minutes;
            ZonePerformance {
                zone_id: entry.zone_id.to_string(),
                display_name: entry.zone.display_name.clone(),
                power_w_m2: entry.cycles.power_w_m2,
                avg_cycle_minutes: cycle,
                duty_cycle_percent: entry.cycles.duty_cycle_percent,
                rating: PowerRating::classify(entry.cycles.power_w_m2, energy),
                short_cycling: cycle > 0.0 && cycle < short_cycle_min,
            }
        })
        .collect();

    let total_area: f64 = zones.iter().map(|entry| entry.zone.area_m2).sum();
    let system_average_w_m2 = (total_area > 0.0).then(|| {
        let weighted: f64 = zones
            .iter()
            .map(|entry| entry.cycles.power_w_m2 * entry.zone.area_m2)
            .sum();
        round_to(weighted / total_area, 1)
    });

    let short_cycling = performance
        .iter()
        .filter(|zone| zone.short_cycling)
        .map(|zone| zone.zone_id.clone())
        .collect();

    WeeklyReport {
        zones: performance,
        system_average_w_m2,
        short_cycling,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: &str, area: f64) -> ZoneConfig {
        ZoneConfig {
            display_name: name.to_string(),
            area_m2: area,
            volume_m3: area * 2.6,
            cool_rate_c_per_hour: 0.1,
            notes: String::new(),
            category: None,
            heater_entity: format!("switch.{name}"),
            temperature_entity: format!("sensor.{name}"),
            climate_entity: format!("climate.{name}"),
            default_gains: None,
        }
    }

    fn cycles(avg: f64, power: f64) -> CycleMetrics {
        CycleMetrics {
            avg_cycle_minutes: avg,
            duty_cycle_percent: power * 2.0,
            power_w_m2: power,
            cycle_count: 7,
        }
    }

    #[test]
    fn ratings_and_weighted_average() {
        let kitchen = zone("kitchen", 30.0);
        let study = zone("study", 10.0);
        let energy = EnergySection::default();
        let report = weekly_report(
            &[
                ZoneWeek {
                    zone_id: "kitchen",
                    zone: &kitchen,
                    cycles: cycles(40.0, 10.0),
                },
                ZoneWeek {
                    zone_id: "study",
                    zone: &study,
                    cycles: cycles(12.0, 30.0),
                },
            ],
            &energy,
            15.0,
        );
        assert_eq!(report.zones[0].rating, PowerRating::Excellent);
        assert_eq!(report.zones[1].rating, PowerRating::High);
        assert_eq!(report.system_average_w_m2, Some(15.0));
        assert_eq!(report.short_cycling, vec!["study".to_string()]);
    }

    #[test]
    fn rating_boundaries_are_inclusive() {
        let energy = EnergySection::default();
        assert_eq!(PowerRating::classify(15.0, &energy), PowerRating::Excellent);
        assert_eq!(PowerRating::classify(25.0, &energy), PowerRating::Good);
        assert_eq!(PowerRating::classify(25.1, &energy), PowerRating::High);
    }

    #[test]
    fn empty_report_has_no_average() {
        let report = weekly_report(&[], &EnergySection::default(), 15.0);
        assert!(report.zones.is_empty());
        assert_eq!(report.system_average_w_m2, None);
    }
}
