use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use crate::error::{FusionError, Result};
use crate::geo::is_valid_coordinate;
use crate::models::{FarmAsset, FireDetection, LandCoverRecord, WeatherRecord};
use crate::time::parse_utc;

/// Best-effort numeric coercion: JSON numbers and numeric strings become
/// finite floats, everything else becomes `None`.
pub fn to_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn field_float(record: &Value, key: &str) -> Option<f64> {
    record.get(key).and_then(to_float)
}

fn field_text(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Reads newline-delimited JSON, skipping blank lines.
pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line).map_err(|source| FusionError::MalformedLine {
            line: idx + 1,
            source,
        })?;
        records.push(value);
    }
    Ok(records)
}

pub fn weather_from_value(record: &Value) -> Option<WeatherRecord> {
    let latitude = field_float(record, "latitude")?;
    let longitude = field_float(record, "longitude")?;
    let event_hour_utc = record
        .get("event_hour_utc")
        .and_then(Value::as_str)
        .and_then(parse_utc)?;

    let variables: BTreeMap<String, f64> = record
        .as_object()?
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "latitude" | "longitude" | "event_hour_utc"))
        .filter_map(|(key, value)| to_float(value).map(|v| (key.clone(), v)))
        .collect();

    Some(WeatherRecord {
        latitude,
        longitude,
        event_hour_utc,
        variables,
    })
}

pub fn fire_from_value(record: &Value) -> FireDetection {
    let acquired_at_raw = field_text(record, "acquired_at_utc");
    FireDetection {
        latitude: field_float(record, "latitude"),
        longitude: field_float(record, "longitude"),
        acquired_at_utc: acquired_at_raw.as_deref().and_then(parse_utc),
        acquired_at_raw,
        frp: field_float(record, "frp"),
        confidence: field_float(record, "confidence"),
        satellite: field_text(record, "satellite"),
        instrument: field_text(record, "instrument"),
        daynight: field_text(record, "daynight"),
    }
}

pub fn land_cover_from_value(record: &Value) -> Option<LandCoverRecord> {
    serde_json::from_value(record.clone()).ok()
}

pub fn parse_weather<R: BufRead>(reader: R) -> Result<Vec<WeatherRecord>> {
    let raw = read_jsonl(reader)?;
    let total = raw.len();
    let records: Vec<WeatherRecord> = raw.iter().filter_map(weather_from_value).collect();
    if records.len() < total {
        tracing::debug!(
            dropped = total - records.len(),
            "weather records without usable coordinates or hour"
        );
    }
    Ok(records)
}

pub fn parse_fires<R: BufRead>(reader: R) -> Result<Vec<FireDetection>> {
    Ok(read_jsonl(reader)?.iter().map(fire_from_value).collect())
}

/// Land-cover rows keyed by point id; a repeated id overwrites the earlier row.
pub fn parse_land_cover<R: BufRead>(reader: R) -> Result<HashMap<String, LandCoverRecord>> {
    let mut lookup = HashMap::new();
    for record in read_jsonl(reader)?.iter().filter_map(land_cover_from_value) {
        lookup.insert(record.point_id.clone(), record);
    }
    Ok(lookup)
}

pub fn parse_farms<R: Read>(reader: R) -> Result<Vec<FarmAsset>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        farm_id: String,
        farm_name: String,
        latitude: String,
        longitude: String,
        #[serde(default)]
        crop_type: Option<String>,
        #[serde(default)]
        boundary: Option<String>,
    }

    let mut reader = csv::Reader::from_reader(reader);
    let mut farms = Vec::new();

    for (idx, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let latitude = row.latitude.trim().parse::<f64>().ok();
        let longitude = row.longitude.trim().parse::<f64>().ok();
        let (latitude, longitude) = match (latitude, longitude) {
            (Some(lat), Some(lon)) if is_valid_coordinate(lat, lon) => (lat, lon),
            _ => {
                tracing::warn!(
                    row = idx + 1,
                    farm_id = %row.farm_id,
                    "skipping farm with unusable coordinates"
                );
                continue;
            }
        };

        let boundary = row
            .boundary
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .and_then(|text| match serde_json::from_str::<Value>(text) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::debug!(farm_id = %row.farm_id, %err, "boundary is not valid JSON");
                    None
                }
            });

        farms.push(FarmAsset {
            farm_id: row.farm_id,
            farm_name: row.farm_name,
            latitude,
            longitude,
            crop_type: row.crop_type.unwrap_or_else(|| "other".to_string()),
            boundary,
        });
    }

    Ok(farms)
}

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

pub fn load_farms(path: &Path) -> anyhow::Result<Vec<FarmAsset>> {
    parse_farms(open(path)?).with_context(|| format!("failed to read farms from {}", path.display()))
}

pub fn load_weather(path: &Path) -> anyhow::Result<Vec<WeatherRecord>> {
    parse_weather(open(path)?)
        .with_context(|| format!("failed to read weather from {}", path.display()))
}

pub fn load_fires(path: &Path) -> anyhow::Result<Vec<FireDetection>> {
    parse_fires(open(path)?)
        .with_context(|| format!("failed to read fire detections from {}", path.display()))
}

pub fn load_land_cover(path: &Path) -> anyhow::Result<HashMap<String, LandCoverRecord>> {
    parse_land_cover(open(path)?)
        .with_context(|| format!("failed to read land cover from {}", path.display()))
}
