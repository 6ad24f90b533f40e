use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::assemble::{FusionInputs, PlotTables};
use crate::config::FusionParams;
use crate::models::{DriverSummary, FarmStatus, FireDetection, LandCoverRecord, RiskLevel};
use crate::time::to_iso;

pub fn summarize_by_driver(rows: &[FarmStatus]) -> Vec<DriverSummary> {
    let mut map: BTreeMap<_, (usize, f64)> = BTreeMap::new();

    for row in rows {
        let entry = map.entry(row.top_driver).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += row.risk_score;
    }

    let mut summaries: Vec<DriverSummary> = map
        .into_iter()
        .map(|(driver, (count, total_risk))| DriverSummary {
            driver,
            count,
            avg_risk: if count == 0 {
                0.0
            } else {
                total_risk / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count));
    summaries
}

fn describe_land_cover(record: Option<&LandCoverRecord>) -> String {
    let Some(record) = record else {
        return "no land-cover sample".to_string();
    };
    let code = record
        .cdl_class_code
        .map_or_else(|| "unclassified".to_string(), |code| format!("class {code}"));
    if record.top_class_mix.is_empty() {
        return code;
    }
    let mix: Vec<String> = record
        .top_class_mix
        .iter()
        .map(|share| {
            format!(
                "{} {:.0}% ({} px)",
                share.cdl_class_code,
                share.fraction * 100.0,
                share.pixel_count
            )
        })
        .collect();
    format!("{code}; mix {}", mix.join(", "))
}

fn describe_sensor(fire: &FireDetection) -> String {
    let parts: Vec<&str> = [&fire.satellite, &fire.instrument, &fire.daynight]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .collect();
    if parts.is_empty() {
        "unknown sensor".to_string()
    } else {
        parts.join("/")
    }
}

pub fn build_report(
    as_of: DateTime<Utc>,
    params: &FusionParams,
    inputs: &FusionInputs,
    tables: &PlotTables,
    limit: usize,
) -> String {
    let summaries = summarize_by_driver(&tables.map_farm_status);

    let mut output = String::new();

    let _ = writeln!(output, "# Farm Fire Risk Report");
    let _ = writeln!(
        output,
        "Status as of {} (fires within {} km over the trailing {} h)",
        to_iso(&as_of),
        params.fire_radius_km,
        params.fire_window_hours
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Farms");

    if tables.map_farm_status.is_empty() {
        let _ = writeln!(output, "No farms had nearby weather data.");
    } else {
        for status in tables.map_farm_status.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) score {:.2} [{}] driven by {} at {}",
                status.farm_name,
                status.farm_id,
                status.crop_type,
                status.risk_score,
                status.risk_level.as_str(),
                status.top_driver.as_str(),
                to_iso(&status.hour_utc)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Driver Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No farm status rows to summarise.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} farms (avg risk {:.2})",
                summary.driver.as_str(),
                summary.count,
                summary.avg_risk
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Land Cover");

    if tables.map_farm_status.is_empty() {
        let _ = writeln!(output, "No farms to describe.");
    } else {
        for status in tables.map_farm_status.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {}: {}",
                status.farm_name,
                describe_land_cover(inputs.land_cover.get(&status.farm_id))
            );
        }
    }

    let mut intense: Vec<&FireDetection> = inputs
        .fires
        .iter()
        .filter(|fire| fire.latitude.is_some() && fire.longitude.is_some())
        .collect();
    intense.sort_by(|a, b| b.frp.unwrap_or(0.0).total_cmp(&a.frp.unwrap_or(0.0)));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Intense Detections");

    if intense.is_empty() {
        let _ = writeln!(output, "No fire detections in this snapshot.");
    } else {
        let hint_count = |level: RiskLevel| {
            tables
                .map_fire_points
                .iter()
                .filter(|point| point.risk_hint == level)
                .count()
        };
        let _ = writeln!(
            output,
            "{} detections: {} high, {} medium, {} low",
            tables.map_fire_points.len(),
            hint_count(RiskLevel::High),
            hint_count(RiskLevel::Medium),
            hint_count(RiskLevel::Low)
        );
        for fire in intense.iter().take(5) {
            let _ = writeln!(
                output,
                "- ({:.4}, {:.4}) on {}: FRP {:.1}, confidence {:.2}, {}",
                fire.latitude.unwrap_or_default(),
                fire.longitude.unwrap_or_default(),
                fire.acquired_at_raw.as_deref().unwrap_or("unknown time"),
                fire.frp.unwrap_or(0.0),
                fire.confidence.unwrap_or(0.0),
                describe_sensor(fire)
            );
        }
    }

    output
}
