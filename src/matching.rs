use chrono::{DateTime, Utc};

use crate::geo::haversine_km;
use crate::models::{FarmAsset, FireDetection, MatchedFire};

/// Detections acquired within `[window_start, window_end]` (both ends
/// inclusive) and at most `radius_km` from the farm, in input order.
///
/// Detections missing a timestamp or either coordinate are skipped. A
/// non-positive radius matches nothing.
pub fn match_fires<'a>(
    detections: &'a [FireDetection],
    farm: &FarmAsset,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    radius_km: f64,
) -> Vec<MatchedFire<'a>> {
    if radius_km <= 0.0 || window_end < window_start {
        return Vec::new();
    }

    detections
        .iter()
        .filter_map(|detection| {
            let acquired = detection.acquired_at_utc?;
            if acquired < window_start || acquired > window_end {
                return None;
            }
            let (lat, lon) = (detection.latitude?, detection.longitude?);
            let distance_km = haversine_km(farm.latitude, farm.longitude, lat, lon);
            (distance_km <= radius_km).then_some(MatchedFire {
                detection,
                distance_km,
            })
        })
        .collect()
}
