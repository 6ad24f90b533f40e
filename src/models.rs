use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named location.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    pub point_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One farm registry entry.
#[derive(Debug, Clone)]
pub struct FarmAsset {
    pub farm_id: String,
    pub farm_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub crop_type: String,
    /// Raw GeoJSON geometry as supplied; validated by the boundary resolver.
    pub boundary: Option<serde_json::Value>,
}

pub const WIND_SPEED: &str = "wind_speed_10m";
pub const TEMPERATURE: &str = "temperature_2m";
pub const RELATIVE_HUMIDITY: &str = "relative_humidity_2m";

/// One hourly weather sample at a source coordinate.
#[derive(Debug, Clone)]
pub struct WeatherRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub event_hour_utc: DateTime<Utc>,
    /// Numeric variables present on the record; nulls are left out.
    pub variables: BTreeMap<String, f64>,
}

impl WeatherRecord {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }
}

/// A satellite thermal-anomaly detection.
#[derive(Debug, Clone, Default)]
pub struct FireDetection {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub acquired_at_utc: Option<DateTime<Utc>>,
    /// Timestamp text exactly as it arrived, echoed on map output.
    pub acquired_at_raw: Option<String>,
    pub frp: Option<f64>,
    pub confidence: Option<f64>,
    pub satellite: Option<String>,
    pub instrument: Option<String>,
    pub daynight: Option<String>,
}

/// A detection accepted for a farm window, with its distance to the farm.
#[derive(Debug, Clone, Copy)]
pub struct MatchedFire<'a> {
    pub detection: &'a FireDetection,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClassShare {
    pub cdl_class_code: i64,
    pub pixel_count: u64,
    pub fraction: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LandCoverRecord {
    pub point_id: String,
    #[serde(default)]
    pub cdl_class_code: Option<i64>,
    #[serde(default)]
    pub top_class_mix: Vec<ClassShare>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const HIGH_THRESHOLD: f64 = 0.67;
    pub const MEDIUM_THRESHOLD: f64 = 0.34;

    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            RiskLevel::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// The four risk sub-scores, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    FireProximity,
    FireIntensity,
    SmokeTransport,
    HeatStress,
}

impl Driver {
    pub const ALL: [Driver; 4] = [
        Driver::FireProximity,
        Driver::FireIntensity,
        Driver::SmokeTransport,
        Driver::HeatStress,
    ];

    pub fn weight(&self) -> f64 {
        match self {
            Driver::FireProximity => 0.35,
            Driver::FireIntensity => 0.25,
            Driver::SmokeTransport => 0.20,
            Driver::HeatStress => 0.20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::FireProximity => "fire_proximity",
            Driver::FireIntensity => "fire_intensity",
            Driver::SmokeTransport => "smoke_transport",
            Driver::HeatStress => "heat_stress",
        }
    }
}

/// Derived risk for one farm at one weather hour.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeatureRow {
    pub farm_id: String,
    pub farm_name: String,
    pub crop_type: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(serialize_with = "crate::time::serialize_iso")]
    pub hour_utc: DateTime<Utc>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub top_driver: Driver,
    pub fire_proximity: f64,
    pub fire_intensity: f64,
    pub smoke_transport: f64,
    pub heat_stress: f64,
    pub fire_count_24h: usize,
    pub frp_sum_24h: f64,
    pub firms_min_distance_km: f64,
    pub wind_speed_10m: f64,
    pub temperature_2m: f64,
    pub relative_humidity_2m: f64,
    pub cdl_class_code: Option<i64>,
}

/// Current-status projection of a [`FeatureRow`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FarmStatus {
    pub farm_id: String,
    pub farm_name: String,
    pub crop_type: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(serialize_with = "crate::time::serialize_iso")]
    pub hour_utc: DateTime<Utc>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub top_driver: Driver,
    pub cdl_class_code: Option<i64>,
}

impl From<&FeatureRow> for FarmStatus {
    fn from(row: &FeatureRow) -> Self {
        Self {
            farm_id: row.farm_id.clone(),
            farm_name: row.farm_name.clone(),
            crop_type: row.crop_type.clone(),
            lat: row.latitude,
            lon: row.longitude,
            hour_utc: row.hour_utc,
            risk_score: row.risk_score,
            risk_level: row.risk_level,
            top_driver: row.top_driver,
            cdl_class_code: row.cdl_class_code,
        }
    }
}

/// A detection laid out for the map layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FirePoint {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub time_utc: Option<String>,
    pub frp: f64,
    pub confidence: f64,
    pub risk_hint: RiskLevel,
}

#[derive(Debug, Clone)]
pub struct DriverSummary {
    pub driver: Driver,
    pub count: usize,
    pub avg_risk: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundarySource {
    RegistrySupplied,
    InferredGridCell,
}

impl BoundarySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundarySource::RegistrySupplied => "registry-supplied",
            BoundarySource::InferredGridCell => "inferred-grid-cell",
        }
    }
}
