use chrono::{DateTime, Duration, Utc};

use crate::geo::{clip01, round_to};
use crate::models::{
    Driver, FarmAsset, FeatureRow, LandCoverRecord, MatchedFire, RiskLevel, WeatherRecord,
    RELATIVE_HUMIDITY, TEMPERATURE, WIND_SPEED,
};

const FRP_SATURATION: f64 = 200.0;
const WIND_SATURATION: f64 = 12.0;
const HEAT_ONSET_C: f64 = 30.0;
const HEAT_SPAN_C: f64 = 12.0;
const DRY_ONSET_PCT: f64 = 60.0;
const DRY_SPAN_PCT: f64 = 40.0;

/// Fire-point hint saturates at a much lower FRP than the farm score.
const HINT_FRP_SATURATION: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
    pub fire_proximity: f64,
    pub fire_intensity: f64,
    pub smoke_transport: f64,
    pub heat_stress: f64,
}

impl SubScores {
    pub fn get(&self, driver: Driver) -> f64 {
        match driver {
            Driver::FireProximity => self.fire_proximity,
            Driver::FireIntensity => self.fire_intensity,
            Driver::SmokeTransport => self.smoke_transport,
            Driver::HeatStress => self.heat_stress,
        }
    }

    pub fn contribution(&self, driver: Driver) -> f64 {
        driver.weight() * self.get(driver)
    }

    pub fn base_risk(&self) -> f64 {
        Driver::ALL.iter().map(|d| self.contribution(*d)).sum()
    }

    /// Driver with the largest weighted contribution; earlier drivers win ties.
    pub fn top_driver(&self) -> Driver {
        let mut top = Driver::ALL[0];
        for driver in Driver::ALL.into_iter().skip(1) {
            if self.contribution(driver) > self.contribution(top) {
                top = driver;
            }
        }
        top
    }
}

pub fn crop_factor(crop_type: &str) -> f64 {
    match crop_type.trim().to_lowercase().as_str() {
        "grape" | "grapes" | "vineyard" => 1.15,
        "almond" | "walnut" | "nuts" | "nut" => 1.05,
        _ => 1.0,
    }
}

/// Start of the fire window. Windows reaching past the representable range
/// start at the earliest instant chrono can hold.
pub fn window_start(event_hour: DateTime<Utc>, window_hours: i64) -> DateTime<Utc> {
    Duration::try_hours(window_hours)
        .and_then(|window| event_hour.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn sub_scores(
    min_distance_km: f64,
    frp_sum: f64,
    radius_km: f64,
    weather: &WeatherInputs,
) -> SubScores {
    let fire_proximity = clip01(1.0 - min_distance_km / radius_km);
    let fire_intensity = clip01(frp_sum / FRP_SATURATION);
    let smoke_transport = fire_proximity * clip01(weather.wind_speed / WIND_SATURATION);
    let heat_stress = clip01((weather.temperature - HEAT_ONSET_C) / HEAT_SPAN_C)
        * clip01((DRY_ONSET_PCT - weather.humidity) / DRY_SPAN_PCT);

    SubScores {
        fire_proximity,
        fire_intensity,
        smoke_transport,
        heat_stress,
    }
}

/// Weather values the scorer reads, with absent values already defaulted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherInputs {
    pub wind_speed: f64,
    pub temperature: f64,
    pub humidity: f64,
}

impl WeatherInputs {
    /// Missing humidity defaults to saturated air so it never adds heat stress.
    pub fn from_record(record: &WeatherRecord) -> Self {
        Self {
            wind_speed: record.value(WIND_SPEED).unwrap_or(0.0),
            temperature: record.value(TEMPERATURE).unwrap_or(0.0),
            humidity: record.value(RELATIVE_HUMIDITY).unwrap_or(100.0),
        }
    }
}

pub fn score(
    farm: &FarmAsset,
    weather: &WeatherRecord,
    event_hour: DateTime<Utc>,
    matched_fires: &[MatchedFire<'_>],
    crop_factor: f64,
    radius_km: f64,
    land_cover: Option<&LandCoverRecord>,
) -> FeatureRow {
    let min_distance_km = matched_fires
        .iter()
        .map(|fire| fire.distance_km)
        .reduce(f64::min)
        .unwrap_or(radius_km);
    let frp_sum: f64 = matched_fires
        .iter()
        .map(|fire| fire.detection.frp.unwrap_or(0.0))
        .sum();

    let inputs = WeatherInputs::from_record(weather);
    let scores = sub_scores(min_distance_km, frp_sum, radius_km, &inputs);
    let risk_score = clip01(scores.base_risk() * crop_factor);

    FeatureRow {
        farm_id: farm.farm_id.clone(),
        farm_name: farm.farm_name.clone(),
        crop_type: farm.crop_type.clone(),
        latitude: farm.latitude,
        longitude: farm.longitude,
        hour_utc: event_hour,
        risk_score: round_to(risk_score, 4),
        risk_level: RiskLevel::from_score(risk_score),
        top_driver: scores.top_driver(),
        fire_proximity: round_to(scores.fire_proximity, 4),
        fire_intensity: round_to(scores.fire_intensity, 4),
        smoke_transport: round_to(scores.smoke_transport, 4),
        heat_stress: round_to(scores.heat_stress, 4),
        fire_count_24h: matched_fires.len(),
        frp_sum_24h: round_to(frp_sum, 3),
        firms_min_distance_km: round_to(min_distance_km, 3),
        wind_speed_10m: inputs.wind_speed,
        temperature_2m: inputs.temperature,
        relative_humidity_2m: inputs.humidity,
        cdl_class_code: land_cover.and_then(|record| record.cdl_class_code),
    }
}

/// Coarse severity of a single detection for the map layer.
pub fn risk_hint(frp: f64, confidence: f64) -> RiskLevel {
    let score = 0.6 * clip01(frp / HINT_FRP_SATURATION) + 0.4 * clip01(confidence);
    RiskLevel::from_score(score)
}
