use std::collections::HashMap;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};

use crate::geo::{is_valid_coordinate, round_to};
use crate::models::{BoundarySource, FarmAsset, FarmStatus, GeoPoint};

pub const DEFAULT_GRID_STEP_DEG: f64 = 0.05;
pub const MIN_GRID_STEP_DEG: f64 = 0.01;
pub const MAX_GRID_STEP_DEG: f64 = 0.1;
/// Just under half a step, so neighbouring inferred cells never touch.
pub const HALF_WIDTH_RATIO: f64 = 0.42;

/// Accepts a registry boundary only if it is a Polygon or MultiPolygon with
/// at least one ring or member.
pub fn registry_geometry(boundary: &serde_json::Value) -> Option<Geometry> {
    let geometry: Geometry = serde_json::from_value(boundary.clone()).ok()?;
    let usable = match &geometry.value {
        GeoValue::Polygon(rings) => !rings.is_empty(),
        GeoValue::MultiPolygon(polygons) => !polygons.is_empty(),
        _ => false,
    };
    usable.then_some(geometry)
}

/// Smallest positive gap between distinct values (rounded to 6 decimals),
/// clamped to the allowed step range. Fewer than two distinct values fall
/// back to the default step.
pub fn grid_step<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut rounded: Vec<f64> = values.into_iter().map(|v| round_to(v, 6)).collect();
    rounded.sort_by(f64::total_cmp);
    rounded.dedup();

    rounded
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|gap| *gap > 0.0)
        .reduce(f64::min)
        .unwrap_or(DEFAULT_GRID_STEP_DEG)
        .clamp(MIN_GRID_STEP_DEG, MAX_GRID_STEP_DEG)
}

/// Closed axis-aligned rectangle around `center`, in `[lon, lat]` order.
pub fn grid_cell(center: &GeoPoint, lat_step: f64, lon_step: f64) -> Geometry {
    let half_lat = lat_step * HALF_WIDTH_RATIO;
    let half_lon = lon_step * HALF_WIDTH_RATIO;
    let south = round_to(center.latitude - half_lat, 6);
    let north = round_to(center.latitude + half_lat, 6);
    let west = round_to(center.longitude - half_lon, 6);
    let east = round_to(center.longitude + half_lon, 6);

    let ring = vec![
        vec![west, south],
        vec![east, south],
        vec![east, north],
        vec![west, north],
        vec![west, south],
    ];
    Geometry::new(GeoValue::Polygon(vec![ring]))
}

fn properties(status: &FarmStatus, source: BoundarySource) -> JsonObject {
    let mut props = match serde_json::to_value(status) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => JsonObject::new(),
    };
    props.insert(
        "boundary_source".to_string(),
        serde_json::Value::from(source.as_str()),
    );
    props
}

/// One map polygon per current-status row: the farm's registry boundary when
/// it is usable, otherwise an inferred grid cell sized from the spacing of
/// all status points. Rows with neither are left out.
pub fn resolve_boundaries(status_rows: &[FarmStatus], farms: &[FarmAsset]) -> FeatureCollection {
    let registry: HashMap<&str, &FarmAsset> = farms
        .iter()
        .map(|farm| (farm.farm_id.as_str(), farm))
        .collect();

    let points: Vec<GeoPoint> = status_rows
        .iter()
        .filter(|row| is_valid_coordinate(row.lat, row.lon))
        .map(|row| GeoPoint {
            point_id: row.farm_id.clone(),
            latitude: row.lat,
            longitude: row.lon,
        })
        .collect();
    let lat_step = grid_step(points.iter().map(|p| p.latitude));
    let lon_step = grid_step(points.iter().map(|p| p.longitude));
    tracing::debug!(lat_step, lon_step, "inferred grid spacing");

    let centers: HashMap<&str, &GeoPoint> = points
        .iter()
        .map(|point| (point.point_id.as_str(), point))
        .collect();

    let mut features = Vec::with_capacity(status_rows.len());
    for row in status_rows {
        let supplied = registry
            .get(row.farm_id.as_str())
            .and_then(|farm| farm.boundary.as_ref())
            .and_then(registry_geometry);

        let (geometry, source) = match (supplied, centers.get(row.farm_id.as_str())) {
            (Some(geometry), _) => (geometry, BoundarySource::RegistrySupplied),
            (None, Some(center)) => (
                grid_cell(center, lat_step, lon_step),
                BoundarySource::InferredGridCell,
            ),
            (None, None) => {
                tracing::debug!(farm_id = %row.farm_id, "no boundary or coordinates to draw");
                continue;
            }
        };

        features.push(Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: Some(properties(row, source)),
            foreign_members: None,
        });
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
