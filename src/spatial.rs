use std::collections::HashMap;

use crate::geo::haversine_km;
use crate::models::{FarmAsset, WeatherRecord};

/// Hourly weather for one source coordinate, sorted by hour.
#[derive(Debug, Clone)]
pub struct WeatherSeries {
    pub latitude: f64,
    pub longitude: f64,
    pub records: Vec<WeatherRecord>,
}

/// Weather series grouped by their exact source coordinate.
///
/// Coordinates are not snapped: two values that differ in their last bit are
/// separate series. Series keep the order in which their coordinate was first
/// seen, which is what makes nearest-series ties deterministic.
#[derive(Debug, Clone, Default)]
pub struct WeatherIndex {
    series: Vec<WeatherSeries>,
}

fn coordinate_key(latitude: f64, longitude: f64) -> (u64, u64) {
    // Adding 0.0 folds -0.0 into 0.0 so both share a key.
    ((latitude + 0.0).to_bits(), (longitude + 0.0).to_bits())
}

impl WeatherIndex {
    pub fn build(records: Vec<WeatherRecord>) -> Self {
        let mut positions: HashMap<(u64, u64), usize> = HashMap::new();
        let mut series: Vec<WeatherSeries> = Vec::new();

        for record in records {
            let key = coordinate_key(record.latitude, record.longitude);
            let slot = *positions.entry(key).or_insert_with(|| {
                series.push(WeatherSeries {
                    latitude: record.latitude,
                    longitude: record.longitude,
                    records: Vec::new(),
                });
                series.len() - 1
            });
            series[slot].records.push(record);
        }

        for group in &mut series {
            group.records.sort_by_key(|record| record.event_hour_utc);
        }

        Self { series }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// The series whose coordinate is closest to the farm. On equal distance
    /// the series seen first wins. Empty when the index holds no series.
    pub fn nearest_series(&self, farm: &FarmAsset) -> &[WeatherRecord] {
        let mut best: Option<(f64, &WeatherSeries)> = None;
        for candidate in &self.series {
            let distance = haversine_km(
                farm.latitude,
                farm.longitude,
                candidate.latitude,
                candidate.longitude,
            );
            match best {
                Some((best_distance, _)) if distance >= best_distance => {}
                _ => best = Some((distance, candidate)),
            }
        }
        best.map(|(_, series)| series.records.as_slice())
            .unwrap_or_default()
    }
}
