use std::fmt;

use serde::Serialize;

use crate::analysis::CycleMetrics;
use crate::config::HealthSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthIssue {
    pub zone_id: String,
    pub severity: HealthStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<HealthIssue>,
}

#[derive(Debug, Clone)]
pub struct ZoneHealthInput<'a> {
    pub zone_id: &'a str,
    pub display_name: &'a str,
    pub cycles: Option<CycleMetrics>,
    pub sensor_available: bool,
}

pub fn evaluate(zones: &[ZoneHealthInput<'_>], thresholds: &HealthSection) -> HealthReport {
    let mut issues = Vec::new();
    let mut push = |zone: &ZoneHealthInput<'_>, severity, message: String| {
        issues.push(HealthIssue {
            zone_id: zone.zone_id.to_string(),
            severity,
            message,
        });
    };

    for zone in zones {
        if let Some(cycles) = zone.cycles {
            let cycle = cycles.avg_cycle_minutes;
            if cycle > 0.0 && cycle < thresholds.very_short_cycle_min {
                push(
                    zone,
                    HealthStatus::Critical,
                    format!(
                        "{}: very short cycles ({cycle:.1} min average)",
                        zone.display_name
                    ),
                );
            } else if cycle > 0.0 && cycle < thresholds.short_cycle_min {
                push(
                    zone,
                    HealthStatus::Warning,
                    format!("{}: short cycles ({cycle:.1} min average)", zone.display_name),
                );
            }

            let exempt = thresholds
                .high_power_exception_zones
                .iter()
                .any(|id| id == zone.zone_id);
            if !exempt && cycles.power_w_m2 > thresholds.high_power_threshold_w_m2 {
                push(
                    zone,
                    HealthStatus::Warning,
                    format!(
                        "{}: high power demand ({:.1} W/m²)",
                        zone.display_name, cycles.power_w_m2
                    ),
                );
            }
        }

        if !zone.sensor_available {
            push(
                zone,
                HealthStatus::Critical,
                format!("{}: temperature sensor unavailable", zone.display_name),
            );
        }
    }

    let status = issues
        .iter()
        .map(|issue| issue.severity)
        .max()
        .unwrap_or(HealthStatus::Healthy);
    HealthReport { status, issues }
}
