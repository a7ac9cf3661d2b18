use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Proportional, integral and derivative gains of one zone controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

impl fmt::Display for PidGains {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kp={} Ki={} Kd={}", self.kp, self.ki, self.kd)
    }
}

/// Asymmetric deadband around the setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceBand {
    pub cold_tolerance: f64,
    pub hot_tolerance: f64,
}

impl ToleranceBand {
    pub fn new(cold_tolerance: f64, hot_tolerance: f64) -> Self {
        Self {
            cold_tolerance,
            hot_tolerance,
        }
    }

    pub fn symmetric(tolerance: f64) -> Self {
        Self::new(tolerance, tolerance)
    }

    pub fn lower(&self, setpoint: f64) -> f64 {
        setpoint - self.cold_tolerance
    }

    pub fn upper(&self, setpoint: f64) -> f64 {
        setpoint + self.hot_tolerance
    }

    pub fn contains(&self, setpoint: f64, temperature: f64) -> bool {
        temperature >= self.lower(setpoint) && temperature <= self.upper(setpoint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Heat,
    Cool,
    Auto,
    Off,
    Other,
}

impl HvacMode {
    /// Maps a controller mode string; anything unrecognised is `Other`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "heat" => HvacMode::Heat,
            "cool" => HvacMode::Cool,
            "auto" | "heat_cool" => HvacMode::Auto,
            "off" => HvacMode::Off,
            _ => HvacMode::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::Auto => "auto",
            HvacMode::Off => "off",
            HvacMode::Other => "other",
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live view of a zone controller. Every field except the mode may be
/// missing and is then resolved against the configured fallbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub mode: HvacMode,
    pub setpoint: Option<f64>,
    pub tolerances: Option<ToleranceBand>,
    pub gains: Option<PidGains>,
}

impl ControllerState {
    pub fn heating(setpoint: f64) -> Self {
        Self {
            mode: HvacMode::Heat,
            setpoint: Some(setpoint),
            tolerances: None,
            gains: None,
        }
    }

    pub fn with_tolerances(mut self, tolerances: ToleranceBand) -> Self {
        self.tolerances = Some(tolerances);
        self
    }

    pub fn with_gains(mut self, gains: PidGains) -> Self {
        self.gains = Some(gains);
        self
    }

    /// Cooling telemetry must never feed heating gains; only `heat` counts.
    pub fn is_heating(&self) -> bool {
        self.mode == HvacMode::Heat
    }
}

/// Tuning-relevant class of a zone, fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneCategory {
    /// Frequent transient loads (oven, exterior door, terrace access).
    Disturbance,
    Skylight,
    Ventilation,
    /// Open-plan zone thermally coupled to a neighbour.
    Coupled,
    Standard,
}

impl ZoneCategory {
    /// One-time keyword classification of free-text zone notes. Keywords
    /// match whole words only, so "outdoor" is not a door.
    pub fn infer_from_notes(notes: &str) -> Self {
        static PATTERNS: OnceLock<Vec<(ZoneCategory, Regex)>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [
                (ZoneCategory::Disturbance, r"(?i)\b(oven|doors?|terrace)\b"),
                (ZoneCategory::Skylight, r"(?i)\bskylights?\b"),
                (ZoneCategory::Ventilation, r"(?i)\b(windows?|ventilation)\b"),
                (
                    ZoneCategory::Coupled,
                    r"(?i)\b(open\s+space|thermally\s+influenced)\b",
                ),
            ]
            .into_iter()
            .filter_map(|(category, pattern)| {
                Regex::new(pattern).ok().map(|regex| (category, regex))
            })
            .collect()
        });

        patterns
            .iter()
            .find(|(_, regex)| regex.is_match(notes))
            .map(|(category, _)| *category)
            .unwrap_or(ZoneCategory::Standard)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneCategory::Disturbance => "disturbance",
            ZoneCategory::Skylight => "skylight",
            ZoneCategory::Ventilation => "ventilation",
            ZoneCategory::Coupled => "coupled",
            ZoneCategory::Standard => "standard",
        }
    }
}

impl fmt::Display for ZoneCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static thermal description of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalProfile {
    pub area_m2: f64,
    pub volume_m3: f64,
    /// Passive cooling rate in °C per hour with heating off.
    pub cool_rate_c_per_hour: f64,
    pub category: ZoneCategory,
}

/// Rounds half away from zero to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
