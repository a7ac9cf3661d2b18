use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::models::{PidGains, ThermalProfile, ToleranceBand, ZoneCategory};

/// Longest analysis window accepted, about five years.
pub const MAX_WINDOW_HOURS: i64 = 24 * 366 * 5;
/// Upper limit for look-ahead and sensor look-back, one week.
pub const MAX_LOOK_MINUTES: i64 = 7 * 24 * 60;
/// Upper limit for the setpoint-change buffer, one week.
pub const MAX_SETPOINT_BUFFER_HOURS: i64 = 7 * 24;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HeatTuneConfig {
    pub tuning: TuningBounds,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub power: PowerSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub energy: EnergySection,
    pub zones: BTreeMap<String, ZoneConfig>,
}

impl HeatTuneConfig {
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn zone(&self, zone_id: &str) -> Result<&ZoneConfig> {
        self.zones
            .get(zone_id)
            .ok_or_else(|| ConfigError::UnknownZone(zone_id.to_string()))
    }

    pub fn zone_ids(&self) -> Vec<String> {
        self.zones.keys().cloned().collect()
    }

    /// Assigns a category to every zone that does not declare one.
    pub fn classify_zones(&mut self) {
        for zone in self.zones.values_mut() {
            if zone.category.is_none() {
                zone.category = Some(ZoneCategory::infer_from_notes(&zone.notes));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.tuning;
        if !(t.kp_min <= t.kp_max) {
            return Err(ConfigError::Invalid(format!(
                "tuning.kp_min ({}) exceeds tuning.kp_max ({})",
                t.kp_min, t.kp_max
            )));
        }
        if !(t.ki_min <= t.ki_max) {
            return Err(ConfigError::Invalid(format!(
                "tuning.ki_min ({}) exceeds tuning.ki_max ({})",
                t.ki_min, t.ki_max
            )));
        }
        if !(t.tau_fallback_hours > 0.0) {
            return Err(ConfigError::Invalid(
                "tuning.tau_fallback_hours must be positive".into(),
            ));
        }
        if self.analysis.max_events == 0 {
            return Err(ConfigError::Invalid(
                "analysis.max_events must be at least 1".into(),
            ));
        }
        let ranges = [
            ("analysis.window_hours", self.analysis.window_hours, 1, MAX_WINDOW_HOURS),
            (
                "analysis.look_ahead_minutes",
                self.analysis.look_ahead_minutes,
                0,
                MAX_LOOK_MINUTES,
            ),
            (
                "analysis.setpoint_change_buffer_hours",
                self.analysis.setpoint_change_buffer_hours,
                0,
                MAX_SETPOINT_BUFFER_HOURS,
            ),
            (
                "health.sensor_lookback_minutes",
                self.health.sensor_lookback_minutes,
                1,
                MAX_LOOK_MINUTES,
            ),
        ];
        for (field, value, min, max) in ranges {
            if !(min..=max).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be between {min} and {max}, got {value}"
                )));
            }
        }
        if self.analysis.default_hot_tolerance < 0.0 || self.analysis.default_cold_tolerance < 0.0
        {
            return Err(ConfigError::Invalid(
                "analysis tolerances must not be negative".into(),
            ));
        }

        for (zone_id, zone) in &self.zones {
            if !(zone.area_m2 > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "zone {zone_id}: area_m2 must be positive"
                )));
            }
            if zone.volume_m3 < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "zone {zone_id}: volume_m3 must not be negative"
                )));
            }
            if zone.cool_rate_c_per_hour < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "zone {zone_id}: cool_rate_c_per_hour must not be negative"
                )));
            }
            for (field, entity) in [
                ("heater_entity", &zone.heater_entity),
                ("temperature_entity", &zone.temperature_entity),
                ("climate_entity", &zone.climate_entity),
            ] {
                if entity.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "zone {zone_id}: {field} must not be empty"
                    )));
                }
            }
        }

        let known: BTreeSet<&str> = self.zones.keys().map(String::as_str).collect();
        for zone_id in &self.health.high_power_exception_zones {
            if !known.contains(zone_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "health.high_power_exception_zones references unknown zone {zone_id}"
                )));
            }
        }
        Ok(())
    }
}

/// Limits every recommended gain set must respect.
#[derive(Debug, Clone, Deserialize)]
pub struct TuningBounds {
    pub kp_min: f64,
    pub kp_max: f64,
    pub ki_min: f64,
    pub ki_max: f64,
    pub kd_slow: f64,
    pub kd_medium: f64,
    pub kd_fast: f64,
    #[serde(default = "default_tau_fallback_hours")]
    pub tau_fallback_hours: f64,
}

fn default_tau_fallback_hours() -> f64 {
    20.0
}

impl TuningBounds {
    pub fn kd_min(&self) -> f64 {
        self.kd_slow.min(self.kd_medium).min(self.kd_fast)
    }

    pub fn kd_max(&self) -> f64 {
        self.kd_slow.max(self.kd_medium).max(self.kd_fast)
    }

    pub fn clamp_kp(&self, kp: f64) -> f64 {
        kp.clamp(self.kp_min, self.kp_max)
    }

    pub fn clamp_ki(&self, ki: f64) -> f64 {
        ki.clamp(self.ki_min, self.ki_max)
    }

    pub fn clamp_kd(&self, kd: f64) -> f64 {
        kd.clamp(self.kd_min(), self.kd_max())
    }

    pub fn contains(&self, gains: &PidGains) -> bool {
        (self.kp_min..=self.kp_max).contains(&gains.kp)
            && (self.ki_min..=self.ki_max).contains(&gains.ki)
            && (self.kd_min()..=self.kd_max()).contains(&gains.kd)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    pub window_hours: i64,
    pub max_events: usize,
    pub look_ahead_minutes: i64,
    pub setpoint_change_buffer_hours: i64,
    pub min_event_samples: usize,
    pub settle_window_samples: usize,
    pub min_analyzed_events: usize,
    pub fallback_setpoint: f64,
    pub default_hot_tolerance: f64,
    pub default_cold_tolerance: f64,
    pub default_gains: PidGains,
}

impl AnalysisSection {
    // Accessors clamp to the validated ranges so an unvalidated section
    // cannot overflow date arithmetic.
    pub fn window(&self) -> Duration {
        Duration::hours(self.window_hours.clamp(1, MAX_WINDOW_HOURS))
    }

    pub fn look_ahead(&self) -> Duration {
        Duration::minutes(self.look_ahead_minutes.clamp(0, MAX_LOOK_MINUTES))
    }

    pub fn setpoint_change_buffer(&self) -> Duration {
        Duration::hours(
            self.setpoint_change_buffer_hours
                .clamp(0, MAX_SETPOINT_BUFFER_HOURS),
        )
    }

    pub fn default_tolerances(&self) -> ToleranceBand {
        ToleranceBand::new(self.default_cold_tolerance, self.default_hot_tolerance)
    }
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            window_hours: 168,
            max_events: 20,
            look_ahead_minutes: 120,
            setpoint_change_buffer_hours: 2,
            min_event_samples: 5,
            settle_window_samples: 10,
            min_analyzed_events: 3,
            fallback_setpoint: 21.0,
            default_hot_tolerance: 0.3,
            default_cold_tolerance: 0.3,
            default_gains: PidGains::new(0.5, 0.01, 5.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PowerSection {
    /// Emitter output per square metre at 100% duty.
    pub reference_w_m2: f64,
}

impl Default for PowerSection {
    fn default() -> Self {
        Self {
            reference_w_m2: 50.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub very_short_cycle_min: f64,
    pub short_cycle_min: f64,
    pub high_power_threshold_w_m2: f64,
    pub high_power_exception_zones: Vec<String>,
    pub sensor_lookback_minutes: i64,
}

impl HealthSection {
    pub fn sensor_lookback(&self) -> Duration {
        Duration::minutes(self.sensor_lookback_minutes.clamp(1, MAX_LOOK_MINUTES))
    }
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            very_short_cycle_min: 5.0,
            short_cycle_min: 15.0,
            high_power_threshold_w_m2: 40.0,
            high_power_exception_zones: Vec::new(),
            sensor_lookback_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnergySection {
    pub gj_price: f64,
    pub gj_to_kwh_factor: f64,
    pub excellent_w_m2: f64,
    pub target_w_m2: f64,
}

impl Default for EnergySection {
    fn default() -> Self {
        Self {
            gj_price: 0.0,
            gj_to_kwh_factor: 277.78,
            excellent_w_m2: 15.0,
            target_w_m2: 25.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub display_name: String,
    pub area_m2: f64,
    #[serde(default)]
    pub volume_m3: f64,
    #[serde(default)]
    pub cool_rate_c_per_hour: f64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub category: Option<ZoneCategory>,
    pub heater_entity: String,
    pub temperature_entity: String,
    pub climate_entity: String,
    #[serde(default)]
    pub default_gains: Option<PidGains>,
}

impl ZoneConfig {
    pub fn category(&self) -> ZoneCategory {
        self.category
            .unwrap_or_else(|| ZoneCategory::infer_from_notes(&self.notes))
    }

    pub fn thermal_profile(&self) -> ThermalProfile {
        ThermalProfile {
            area_m2: self.area_m2,
            volume_m3: self.volume_m3,
            cool_rate_c_per_hour: self.cool_rate_c_per_hour,
            category: self.category(),
        }
    }
}

/// Loads a configuration file, choosing the format from its extension,
/// then classifies zones and validates the result.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<HeatTuneConfig> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let mut config: HeatTuneConfig = match extension.as_deref() {
        Some("toml") => load_toml(path)?,
        Some("yaml") | Some("yml") => load_yaml(path)?,
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };
    config.classify_zones();
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

fn load_yaml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        source,
        path: path.to_path_buf(),
    })
}
