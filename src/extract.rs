use std::collections::HashMap;
use std::io::Read;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::ingest::to_float;
use crate::time::{parse_utc, to_iso};

pub const FIRMS_SOURCE: &str = "nasa-firms";
pub const OPEN_METEO_SOURCE: &str = "open-meteo";

pub const DEFAULT_HOURLY_VARIABLES: [&str; 6] = [
    "temperature_2m",
    "relative_humidity_2m",
    "wind_speed_10m",
    "wind_direction_10m",
    "cloud_cover",
    "visibility",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExtractionMetadata {
    pub source: &'static str,
    pub request_descriptor: String,
    pub record_count: usize,
    #[serde(serialize_with = "crate::time::serialize_iso")]
    pub ingested_at_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_hourly_variables: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Extraction<T> {
    pub metadata: ExtractionMetadata,
    pub records: Vec<T>,
}

/// A FIRMS detection in the shape the fusion loader reads.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NormalizedDetection {
    pub source: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub acquired_at_utc: Option<String>,
    pub frp: Option<f64>,
    pub confidence: Option<f64>,
    pub satellite: Option<String>,
    pub instrument: Option<String>,
    pub daynight: Option<String>,
    pub ingested_at_utc: String,
}

fn clean(raw: Option<&String>) -> Option<String> {
    let text = raw?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn parse_number(raw: Option<&String>) -> Option<f64> {
    clean(raw).and_then(|text| text.parse::<f64>().ok())
}

/// Maps FIRMS confidence (categorical letters/words or 0-100 percentages)
/// onto `[0, 1]`.
pub fn parse_confidence(raw: &str) -> Option<f64> {
    let value = raw.trim().to_lowercase();
    match value.as_str() {
        "" => None,
        "low" | "l" => Some(0.33),
        "nominal" | "n" | "medium" => Some(0.66),
        "high" | "h" => Some(1.0),
        numeric => {
            let parsed = numeric.parse::<f64>().ok().filter(|v| v.is_finite())?;
            let scaled = if parsed > 1.0 { parsed / 100.0 } else { parsed };
            Some(scaled.clamp(0.0, 1.0))
        }
    }
}

/// Combines FIRMS `acq_date` (YYYY-MM-DD) and `acq_time` (HHMM, possibly
/// without leading zeros) into a UTC timestamp. An out-of-range time of day
/// resets to midnight.
pub fn parse_acquired_at(acq_date: &str, acq_time: Option<&str>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(acq_date.trim(), "%Y-%m-%d").ok()?;

    let mut digits: String = acq_time
        .unwrap_or("0000")
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    while digits.len() < 4 {
        digits.insert(0, '0');
    }
    let hour = digits[..2].parse::<u32>().unwrap_or(0);
    let minute = digits[2..].parse::<u32>().unwrap_or(u32::MAX);
    let (hour, minute) = if hour > 23 || minute > 59 {
        (0, 0)
    } else {
        (hour, minute)
    };

    date.and_hms_opt(hour, minute, 0).map(|naive| naive.and_utc())
}

/// Normalises a downloaded FIRMS CSV. Rows without parseable coordinates are
/// dropped.
pub fn extract_firms_csv<R: Read>(
    reader: R,
    request_descriptor: &str,
    ingested_at: DateTime<Utc>,
) -> Result<Extraction<NormalizedDetection>> {
    let ingested_at_utc = to_iso(&ingested_at);
    let mut reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();

    for result in reader.deserialize::<HashMap<String, String>>() {
        let row = result?;
        let (Some(latitude), Some(longitude)) =
            (parse_number(row.get("latitude")), parse_number(row.get("longitude")))
        else {
            continue;
        };

        let acquired_at_utc = clean(row.get("acq_date")).and_then(|date| {
            let time = clean(row.get("acq_time"));
            parse_acquired_at(&date, time.as_deref()).map(|at| to_iso(&at))
        });

        records.push(NormalizedDetection {
            source: FIRMS_SOURCE,
            latitude,
            longitude,
            acquired_at_utc,
            frp: parse_number(row.get("frp")),
            confidence: row.get("confidence").and_then(|raw| parse_confidence(raw)),
            satellite: clean(row.get("satellite")),
            instrument: clean(row.get("instrument")),
            daynight: clean(row.get("daynight")),
            ingested_at_utc: ingested_at_utc.clone(),
        });
    }

    tracing::info!(records = records.len(), "FIRMS rows normalised");
    Ok(Extraction {
        metadata: ExtractionMetadata {
            source: FIRMS_SOURCE,
            request_descriptor: request_descriptor.to_string(),
            record_count: records.len(),
            ingested_at_utc: ingested_at,
            requested_hourly_variables: None,
        },
        records,
    })
}

/// Flattens an Open-Meteo forecast response (`hourly.time` plus one array per
/// variable) into one weather record per hour. Short variable arrays yield
/// nulls; hours that cannot be parsed are skipped.
pub fn flatten_open_meteo(
    response: &Value,
    variables: &[String],
    fallback_latitude: Option<f64>,
    fallback_longitude: Option<f64>,
    request_descriptor: &str,
    ingested_at: DateTime<Utc>,
) -> Extraction<Map<String, Value>> {
    let latitude = response
        .get("latitude")
        .and_then(to_float)
        .or(fallback_latitude);
    let longitude = response
        .get("longitude")
        .and_then(to_float)
        .or(fallback_longitude);
    let hourly = response.get("hourly");
    let times = hourly
        .and_then(|h| h.get("time"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let ingested_at_utc = to_iso(&ingested_at);

    let mut records = Vec::with_capacity(times.len());
    for (idx, raw_time) in times.iter().enumerate() {
        let Some(event_hour) = raw_time.as_str().and_then(parse_utc) else {
            tracing::warn!(index = idx, time = %raw_time, "skipping unparseable Open-Meteo hour");
            continue;
        };

        let mut record = Map::new();
        record.insert("source".to_string(), Value::from(OPEN_METEO_SOURCE));
        record.insert("latitude".to_string(), latitude.map_or(Value::Null, Value::from));
        record.insert("longitude".to_string(), longitude.map_or(Value::Null, Value::from));
        record.insert("event_hour_utc".to_string(), Value::from(to_iso(&event_hour)));
        record.insert("ingested_at_utc".to_string(), Value::from(ingested_at_utc.clone()));
        for variable in variables {
            let value = hourly
                .and_then(|h| h.get(variable))
                .and_then(|series| series.get(idx))
                .cloned()
                .unwrap_or(Value::Null);
            record.insert(variable.clone(), value);
        }
        records.push(record);
    }

    tracing::info!(records = records.len(), "Open-Meteo hours flattened");
    Extraction {
        metadata: ExtractionMetadata {
            source: OPEN_METEO_SOURCE,
            request_descriptor: request_descriptor.to_string(),
            record_count: records.len(),
            ingested_at_utc: ingested_at,
            requested_hourly_variables: Some(variables.to_vec()),
        },
        records,
    }
}
