use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::assemble::PlotTables;
use crate::time::serialize_iso;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableEntry {
    pub path: PathBuf,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    #[serde(serialize_with = "serialize_iso")]
    pub built_at_utc: DateTime<Utc>,
    pub tables: BTreeMap<String, TableEntry>,
}

pub fn write_jsonl_to<W: Write, T: Serialize>(
    mut writer: W,
    records: &[T],
) -> anyhow::Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

pub fn write_jsonl<T: Serialize>(records: &[T], path: &Path) -> anyhow::Result<()> {
    write_jsonl_to(create(path)?, records)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_json<T: Serialize>(value: &T, path: &Path) -> anyhow::Result<()> {
    let mut writer = create(path)?;
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Writes every table under `output_dir` plus a `manifest.json` describing them.
pub fn write_tables(
    tables: &PlotTables,
    output_dir: &Path,
    built_at: DateTime<Utc>,
) -> anyhow::Result<Manifest> {
    let mut entries = BTreeMap::new();

    let fire_points = output_dir.join("map_fire_points.jsonl");
    write_jsonl(&tables.map_fire_points, &fire_points)?;
    entries.insert(
        "map_fire_points".to_string(),
        TableEntry {
            path: fire_points,
            record_count: tables.map_fire_points.len(),
        },
    );

    let farm_status = output_dir.join("map_farm_status.jsonl");
    write_jsonl(&tables.map_farm_status, &farm_status)?;
    entries.insert(
        "map_farm_status".to_string(),
        TableEntry {
            path: farm_status,
            record_count: tables.map_farm_status.len(),
        },
    );

    let timeseries = output_dir.join("chart_farm_timeseries.jsonl");
    write_jsonl(&tables.chart_farm_timeseries, &timeseries)?;
    entries.insert(
        "chart_farm_timeseries".to_string(),
        TableEntry {
            path: timeseries,
            record_count: tables.chart_farm_timeseries.len(),
        },
    );

    let boundaries = output_dir.join("map_farm_boundaries.geojson");
    write_json(&tables.map_farm_boundaries, &boundaries)?;
    entries.insert(
        "map_farm_boundaries".to_string(),
        TableEntry {
            path: boundaries,
            record_count: tables.map_farm_boundaries.features.len(),
        },
    );

    let manifest = Manifest {
        built_at_utc: built_at,
        tables: entries,
    };
    write_json(&manifest, &output_dir.join("manifest.json"))?;
    Ok(manifest)
}
