use std::collections::HashMap;

use chrono::{DateTime, Utc};
use geojson::FeatureCollection;

use crate::boundary::resolve_boundaries;
use crate::config::FusionParams;
use crate::matching::match_fires;
use crate::models::{
    FarmAsset, FarmStatus, FeatureRow, FireDetection, FirePoint, LandCoverRecord, WeatherRecord,
};
use crate::risk;
use crate::spatial::WeatherIndex;

/// Everything a fusion run reads.
#[derive(Debug, Clone, Default)]
pub struct FusionInputs {
    pub farms: Vec<FarmAsset>,
    pub weather: Vec<WeatherRecord>,
    pub fires: Vec<FireDetection>,
    pub land_cover: HashMap<String, LandCoverRecord>,
}

/// The fused output tables.
#[derive(Debug, Clone)]
pub struct PlotTables {
    pub map_fire_points: Vec<FirePoint>,
    /// Sorted by risk score, highest first.
    pub map_farm_status: Vec<FarmStatus>,
    pub map_farm_boundaries: FeatureCollection,
    /// Sorted by farm id, then hour.
    pub chart_farm_timeseries: Vec<FeatureRow>,
}

/// One map point per detection with usable coordinates. Ids follow input
/// position, so skipped detections leave gaps.
pub fn build_fire_points(fires: &[FireDetection]) -> Vec<FirePoint> {
    fires
        .iter()
        .enumerate()
        .filter_map(|(idx, fire)| {
            let (lat, lon) = (fire.latitude?, fire.longitude?);
            let frp = fire.frp.unwrap_or(0.0);
            let confidence = fire.confidence.unwrap_or(0.0);
            Some(FirePoint {
                id: format!("fire_{}", idx + 1),
                lat,
                lon,
                time_utc: fire.acquired_at_raw.clone(),
                frp,
                confidence,
                risk_hint: risk::risk_hint(frp, confidence),
            })
        })
        .collect()
}

/// Feature rows for every hour of the farm's weather series.
pub fn farm_rows(
    farm: &FarmAsset,
    series: &[WeatherRecord],
    fires: &[FireDetection],
    land_cover: Option<&LandCoverRecord>,
    params: &FusionParams,
) -> Vec<FeatureRow> {
    let crop_factor = risk::crop_factor(&farm.crop_type);

    series
        .iter()
        .map(|weather| {
            let event_hour = weather.event_hour_utc;
            let window_start = risk::window_start(event_hour, params.fire_window_hours);
            let matched = match_fires(
                fires,
                farm,
                window_start,
                event_hour,
                params.fire_radius_km,
            );
            risk::score(
                farm,
                weather,
                event_hour,
                &matched,
                crop_factor,
                params.fire_radius_km,
                land_cover,
            )
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct Latest<'a> {
    any: Option<&'a FeatureRow>,
    observed: Option<&'a FeatureRow>,
}

fn later<'a>(current: Option<&'a FeatureRow>, candidate: &'a FeatureRow) -> Option<&'a FeatureRow> {
    match current {
        Some(row) if candidate.hour_utc <= row.hour_utc => Some(row),
        _ => Some(candidate),
    }
}

/// Per farm, the most recent row no later than `now`. When no farm has such a
/// row, every farm falls back to its most recent row overall. Farms come out
/// in the order they first appear in `rows`; on equal hours the earlier row is
/// kept.
pub fn select_current(rows: &[FeatureRow], now: DateTime<Utc>) -> Vec<FarmStatus> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut latest: Vec<Latest<'_>> = Vec::new();

    for row in rows {
        let slot = *slots.entry(row.farm_id.as_str()).or_insert_with(|| {
            latest.push(Latest::default());
            latest.len() - 1
        });
        let entry = &mut latest[slot];
        entry.any = later(entry.any, row);
        if row.hour_utc <= now {
            entry.observed = later(entry.observed, row);
        }
    }

    let any_observed = latest.iter().any(|picked| picked.observed.is_some());
    latest
        .into_iter()
        .filter_map(|picked| {
            if any_observed {
                picked.observed
            } else {
                picked.any
            }
        })
        .map(FarmStatus::from)
        .collect()
}

pub fn build_plot_tables(
    inputs: &FusionInputs,
    params: &FusionParams,
    now: DateTime<Utc>,
) -> PlotTables {
    let index = WeatherIndex::build(inputs.weather.clone());
    if index.is_empty() {
        tracing::warn!("no weather series loaded; every farm will be skipped");
    }
    tracing::info!(
        farms = inputs.farms.len(),
        weather_series = index.len(),
        fire_detections = inputs.fires.len(),
        "fusing sources"
    );

    let mut chart_rows: Vec<FeatureRow> = Vec::new();
    for farm in &inputs.farms {
        let series = index.nearest_series(farm);
        if series.is_empty() {
            tracing::debug!(farm_id = %farm.farm_id, "no weather series; farm skipped");
            continue;
        }
        let land_cover = inputs.land_cover.get(&farm.farm_id);
        chart_rows.extend(farm_rows(farm, series, &inputs.fires, land_cover, params));
    }

    let mut map_farm_status = select_current(&chart_rows, now);
    map_farm_status.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));

    chart_rows.sort_by(|a, b| {
        a.farm_id
            .cmp(&b.farm_id)
            .then_with(|| a.hour_utc.cmp(&b.hour_utc))
    });

    let map_farm_boundaries = resolve_boundaries(&map_farm_status, &inputs.farms);
    let map_fire_points = build_fire_points(&inputs.fires);

    tracing::info!(
        fire_points = map_fire_points.len(),
        farm_status = map_farm_status.len(),
        boundaries = map_farm_boundaries.features.len(),
        timeseries = chart_rows.len(),
        "tables assembled"
    );

    PlotTables {
        map_fire_points,
        map_farm_status,
        map_farm_boundaries,
        chart_farm_timeseries: chart_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Driver, RiskLevel, RELATIVE_HUMIDITY, TEMPERATURE, WIND_SPEED};
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    fn farm(id: &str, lat: f64, lon: f64, crop: &str) -> FarmAsset {
        FarmAsset {
            farm_id: id.to_string(),
            farm_name: format!("Farm {id}"),
            latitude: lat,
            longitude: lon,
            crop_type: crop.to_string(),
            boundary: None,
        }
    }

    fn weather(
        lat: f64,
        lon: f64,
        hour: DateTime<Utc>,
        wind: f64,
        temp: f64,
        hum: f64,
    ) -> WeatherRecord {
        WeatherRecord {
            latitude: lat,
            longitude: lon,
            event_hour_utc: hour,
            variables: [(WIND_SPEED, wind), (TEMPERATURE, temp), (RELATIVE_HUMIDITY, hum)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    fn fire(lat: f64, lon: f64, at: DateTime<Utc>, frp: f64, confidence: f64) -> FireDetection {
        FireDetection {
            latitude: Some(lat),
            longitude: Some(lon),
            acquired_at_utc: Some(at),
            acquired_at_raw: Some(crate::time::to_iso(&at)),
            frp: Some(frp),
            confidence: Some(confidence),
            ..FireDetection::default()
        }
    }

    fn scenario() -> FusionInputs {
        FusionInputs {
            farms: vec![farm("A", 37.0, -120.0, "grape")],
            weather: vec![weather(37.0, -120.0, t0(), 10.0, 35.0, 20.0)],
            fires: vec![fire(37.001, -120.001, t0(), 50.0, 0.8)],
            land_cover: HashMap::new(),
        }
    }

    #[test]
    fn end_to_end_vineyard_scenario() {
        let tables = build_plot_tables(&scenario(), &FusionParams::default(), t0());

        assert_eq!(tables.chart_farm_timeseries.len(), 1);
        let row = &tables.chart_farm_timeseries[0];
        assert_eq!(row.farm_id, "A");
        assert_eq!(row.hour_utc, t0());
        assert_abs_diff_eq!(row.fire_proximity, 0.997, epsilon = 2e-3);
        assert_eq!(row.fire_intensity, 0.25);
        assert_abs_diff_eq!(row.smoke_transport, 0.83, epsilon = 2e-3);
        assert_abs_diff_eq!(row.heat_stress, 0.4167, epsilon = 1e-4);
        assert_abs_diff_eq!(row.risk_score, 0.76, epsilon = 5e-3);
        assert_eq!(row.risk_level, RiskLevel::High);
        assert_eq!(row.top_driver, Driver::FireProximity);
        assert_eq!(row.fire_count_24h, 1);
        assert_eq!(row.cdl_class_code, None);

        assert_eq!(tables.map_farm_status.len(), 1);
        assert_eq!(tables.map_farm_status[0].risk_score, row.risk_score);
        assert_eq!(tables.map_fire_points.len(), 1);
        assert_eq!(tables.map_fire_points[0].id, "fire_1");
        assert_eq!(tables.map_farm_boundaries.features.len(), 1);
    }

    #[test]
    fn farms_without_weather_are_excluded_everywhere() {
        let inputs = FusionInputs {
            farms: vec![farm("A", 37.0, -120.0, "grape")],
            weather: Vec::new(),
            fires: vec![fire(37.0, -120.0, t0(), 10.0, 0.5)],
            land_cover: HashMap::new(),
        };
        let tables = build_plot_tables(&inputs, &FusionParams::default(), t0());
        assert!(tables.chart_farm_timeseries.is_empty());
        assert!(tables.map_farm_status.is_empty());
        assert!(tables.map_farm_boundaries.features.is_empty());
        assert_eq!(tables.map_fire_points.len(), 1);
    }

    #[test]
    fn forecast_hours_are_not_current_status() {
        let mut inputs = scenario();
        inputs.weather = (0..4)
            .map(|h| weather(37.0, -120.0, t0() + Duration::hours(h), 5.0, 25.0, 50.0))
            .collect();
        let now = t0() + Duration::minutes(90);
        let tables = build_plot_tables(&inputs, &FusionParams::default(), now);

        assert_eq!(tables.chart_farm_timeseries.len(), 4);
        assert_eq!(tables.map_farm_status[0].hour_utc, t0() + Duration::hours(1));
    }

    #[test]
    fn forecast_only_farms_leave_status_when_any_farm_is_observed() {
        let mut inputs = scenario();
        inputs.farms.push(farm("B", 40.0, -110.0, "corn"));
        inputs.weather = vec![
            weather(37.0, -120.0, t0() - Duration::hours(1), 5.0, 25.0, 50.0),
            weather(37.0, -120.0, t0(), 5.0, 25.0, 50.0),
            weather(40.0, -110.0, t0() + Duration::hours(5), 5.0, 25.0, 50.0),
        ];
        let tables = build_plot_tables(&inputs, &FusionParams::default(), t0());

        assert_eq!(tables.chart_farm_timeseries.len(), 3);
        let ids: Vec<&str> = tables
            .map_farm_status
            .iter()
            .map(|s| s.farm_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A"]);
        assert_eq!(tables.map_farm_status[0].hour_utc, t0());
        assert_eq!(tables.map_farm_boundaries.features.len(), 1);
    }

    #[test]
    fn all_forecast_table_falls_back_to_latest_rows() {
        let mut inputs = scenario();
        inputs.farms.push(farm("B", 40.0, -110.0, "corn"));
        inputs.weather = vec![
            weather(37.0, -120.0, t0() + Duration::hours(1), 5.0, 25.0, 50.0),
            weather(40.0, -110.0, t0() + Duration::hours(3), 5.0, 25.0, 50.0),
            weather(40.0, -110.0, t0() + Duration::hours(5), 5.0, 25.0, 50.0),
        ];
        let rows = build_plot_tables(&inputs, &FusionParams::default(), t0()).chart_farm_timeseries;
        let status = select_current(&rows, t0());

        assert_eq!(status.len(), 2);
        assert_eq!(status[0].farm_id, "A");
        assert_eq!(status[0].hour_utc, t0() + Duration::hours(1));
        assert_eq!(status[1].farm_id, "B");
        assert_eq!(status[1].hour_utc, t0() + Duration::hours(5));
    }

    #[test]
    fn equal_hours_keep_first_row() {
        let first = farm_rows(
            &farm("A", 0.0, 0.0, "other"),
            &[
                weather(0.0, 0.0, t0(), 0.0, 20.0, 50.0),
                weather(0.0, 0.0, t0(), 0.0, 42.0, 0.0),
            ],
            &[],
            None,
            &FusionParams::default(),
        );
        let status = select_current(&first, t0());
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].risk_score, 0.0);
    }

    #[test]
    fn tied_status_rows_keep_registry_order() {
        let inputs = FusionInputs {
            farms: vec![
                farm("Z", 37.0, -120.0, "other"),
                farm("A", 38.0, -121.0, "other"),
            ],
            weather: vec![
                weather(37.0, -120.0, t0(), 0.0, 10.0, 90.0),
                weather(38.0, -121.0, t0(), 0.0, 10.0, 90.0),
            ],
            fires: Vec::new(),
            land_cover: HashMap::new(),
        };
        let tables = build_plot_tables(&inputs, &FusionParams::default(), t0());

        let ids: Vec<&str> = tables
            .map_farm_status
            .iter()
            .map(|s| s.farm_id.as_str())
            .collect();
        assert_eq!(ids, vec!["Z", "A"]);
        let boundary_ids: Vec<String> = tables
            .map_farm_boundaries
            .features
            .iter()
            .filter_map(|f| f.property("farm_id"))
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        assert_eq!(boundary_ids, vec!["Z", "A"]);
    }

    #[test]
    fn oversized_window_matches_every_earlier_fire() {
        let mut inputs = scenario();
        inputs.fires = vec![fire(37.0, -120.0, t0() - Duration::days(3650), 20.0, 0.5)];
        let params = FusionParams::new(50.0, 10_000_000_000).unwrap();
        let tables = build_plot_tables(&inputs, &params, t0());

        assert_eq!(tables.chart_farm_timeseries[0].fire_count_24h, 1);
    }

    #[test]
    fn status_sorted_by_risk_and_series_by_farm_then_hour() {
        let inputs = FusionInputs {
            farms: vec![
                farm("B", 37.0, -120.0, "other"),
                farm("A", 38.0, -121.0, "grape"),
            ],
            weather: vec![
                weather(37.0, -120.0, t0(), 10.0, 35.0, 20.0),
                weather(37.0, -120.0, t0() - Duration::hours(1), 10.0, 35.0, 20.0),
                weather(38.0, -121.0, t0(), 0.0, 10.0, 90.0),
            ],
            fires: vec![fire(37.0, -120.0, t0(), 100.0, 1.0)],
            land_cover: HashMap::new(),
        };
        let tables = build_plot_tables(&inputs, &FusionParams::default(), t0());

        let status_ids: Vec<&str> = tables
            .map_farm_status
            .iter()
            .map(|s| s.farm_id.as_str())
            .collect();
        assert_eq!(status_ids, vec!["B", "A"]);

        let keys: Vec<(&str, DateTime<Utc>)> = tables
            .chart_farm_timeseries
            .iter()
            .map(|r| (r.farm_id.as_str(), r.hour_utc))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A", t0()),
                ("B", t0() - Duration::hours(1)),
                ("B", t0()),
            ]
        );
    }

    #[test]
    fn fire_points_skip_rows_without_coordinates() {
        let mut missing = fire(0.0, 0.0, t0(), 1.0, 0.1);
        missing.longitude = None;
        let mut bare = fire(1.0, 1.0, t0(), 0.0, 0.0);
        bare.frp = None;
        bare.confidence = None;
        let points = build_fire_points(&[missing, bare, fire(2.0, 2.0, t0(), 30.0, 0.9)]);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, "fire_2");
        assert_eq!(points[0].frp, 0.0);
        assert_eq!(points[0].risk_hint, RiskLevel::Low);
        assert_eq!(points[1].id, "fire_3");
        assert_eq!(points[1].risk_hint, RiskLevel::High);
    }

    #[test]
    fn land_cover_code_flows_into_rows() {
        let mut inputs = scenario();
        inputs.land_cover.insert(
            "A".to_string(),
            LandCoverRecord {
                point_id: "A".to_string(),
                cdl_class_code: Some(69),
                top_class_mix: Vec::new(),
            },
        );
        let tables = build_plot_tables(&inputs, &FusionParams::default(), t0());
        assert_eq!(tables.chart_farm_timeseries[0].cdl_class_code, Some(69));
        assert_eq!(tables.map_farm_status[0].cdl_class_code, Some(69));
    }

    #[test]
    fn levels_match_scores_for_every_row() {
        let mut inputs = scenario();
        inputs.weather = (0..24)
            .map(|h| {
                weather(
                    37.0,
                    -120.0,
                    t0() + Duration::hours(h),
                    h as f64,
                    25.0 + h as f64,
                    80.0 - 3.0 * h as f64,
                )
            })
            .collect();
        inputs.fires = (0..24)
            .map(|h| {
                let at = t0() + Duration::hours(h);
                fire(37.0 + 0.01 * h as f64, -120.0, at, 7.5 * h as f64, 0.5)
            })
            .collect();
        let tables = build_plot_tables(&inputs, &FusionParams::default(), t0());

        for row in &tables.chart_farm_timeseries {
            for value in [
                row.risk_score,
                row.fire_proximity,
                row.fire_intensity,
                row.smoke_transport,
                row.heat_stress,
            ] {
                assert!((0.0..=1.0).contains(&value));
            }
            let expected = RiskLevel::from_score(row.risk_score);
            // Levels come from the unrounded score; only a value sitting on a
            // threshold after rounding could disagree.
            if (row.risk_score - 0.34).abs() > 1e-4 && (row.risk_score - 0.67).abs() > 1e-4 {
                assert_eq!(row.risk_level, expected);
            }
        }
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let mut inputs = scenario();
        inputs.farms.push(farm("B", 37.05, -120.0, "almond"));
        inputs.farms.push(farm("C", 37.0, -120.05, "walnut"));
        inputs.weather.push(weather(37.05, -120.0, t0(), 3.0, 30.0, 40.0));
        let params = FusionParams::default();

        let render = |tables: &PlotTables| {
            serde_json::to_string(&(
                &tables.map_fire_points,
                &tables.map_farm_status,
                &tables.map_farm_boundaries,
                &tables.chart_farm_timeseries,
            ))
            .unwrap()
        };
        let first = render(&build_plot_tables(&inputs, &params, t0()));
        let second = render(&build_plot_tables(&inputs, &params, t0()));
        assert_eq!(first, second);
    }
}
