use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod assemble;
mod boundary;
mod config;
mod error;
mod extract;
mod geo;
mod ingest;
mod matching;
mod models;
mod output;
mod report;
mod risk;
mod spatial;
mod time;

use assemble::{FusionInputs, PlotTables};
use config::{FusionParams, DEFAULT_FIRE_RADIUS_KM, DEFAULT_FIRE_WINDOW_HOURS};

#[derive(Parser)]
#[command(name = "farm-fire-risk")]
#[command(about = "Fuse fire detections, weather and land cover into per-farm risk tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FusionArgs {
    /// Farm registry CSV
    #[arg(long, default_value = "samples/farms.csv")]
    farms_csv: PathBuf,
    /// Normalised FIRMS detections (JSONL)
    #[arg(long)]
    firms_jsonl: PathBuf,
    /// Hourly Open-Meteo records (JSONL)
    #[arg(long)]
    open_meteo_jsonl: PathBuf,
    /// Optional land-cover point samples (JSONL)
    #[arg(long)]
    cdl_jsonl: Option<PathBuf>,
    #[arg(long, env = "FIRE_RADIUS_KM", default_value_t = DEFAULT_FIRE_RADIUS_KM)]
    fire_radius_km: f64,
    #[arg(long, env = "FIRE_WINDOW_HOURS", default_value_t = DEFAULT_FIRE_WINDOW_HOURS)]
    fire_window_hours: i64,
    /// Evaluation instant; defaults to now
    #[arg(long, value_parser = parse_instant)]
    as_of: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine sources into map and chart tables
    BuildPlotDataset {
        #[command(flatten)]
        fusion: FusionArgs,
        #[arg(long, default_value = "data/processed/plot")]
        output_dir: PathBuf,
    },
    /// Generate a markdown risk report
    Report {
        #[command(flatten)]
        fusion: FusionArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Normalise a downloaded FIRMS CSV into detection JSONL
    ExtractFirms {
        #[arg(long)]
        input_csv: PathBuf,
        #[arg(long, default_value = "data/raw/firms/firms_snapshot.jsonl")]
        output: PathBuf,
    },
    /// Flatten a saved Open-Meteo forecast response into hourly JSONL
    ExtractOpenMeteo {
        #[arg(long)]
        input_json: PathBuf,
        /// Latitude used when the response omits one
        #[arg(long)]
        lat: Option<f64>,
        /// Longitude used when the response omits one
        #[arg(long)]
        lon: Option<f64>,
        /// Comma-separated hourly variables
        #[arg(long, default_value_t = extract::DEFAULT_HOURLY_VARIABLES.join(","))]
        hourly: String,
        #[arg(long, default_value = "data/raw/open_meteo/open_meteo_snapshot.jsonl")]
        output: PathBuf,
    },
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    time::parse_utc(raw).ok_or_else(|| format!("not an ISO-8601 timestamp: {raw}"))
}

fn metadata_path(output: &Path) -> PathBuf {
    output.with_extension("metadata.json")
}

struct FusionRun {
    params: FusionParams,
    now: DateTime<Utc>,
    inputs: FusionInputs,
    tables: PlotTables,
}

fn run_fusion(args: &FusionArgs) -> anyhow::Result<FusionRun> {
    let params = FusionParams::new(args.fire_radius_km, args.fire_window_hours)
        .context("invalid fusion parameters")?;
    let now = args.as_of.unwrap_or_else(Utc::now);

    let inputs = FusionInputs {
        farms: ingest::load_farms(&args.farms_csv)?,
        weather: ingest::load_weather(&args.open_meteo_jsonl)?,
        fires: ingest::load_fires(&args.firms_jsonl)?,
        land_cover: match &args.cdl_jsonl {
            Some(path) => ingest::load_land_cover(path)?,
            None => Default::default(),
        },
    };

    let tables = assemble::build_plot_tables(&inputs, &params, now);
    Ok(FusionRun {
        params,
        now,
        inputs,
        tables,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "farm_fire_risk=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::BuildPlotDataset { fusion, output_dir } => {
            let run = run_fusion(&fusion)?;
            let manifest = output::write_tables(&run.tables, &output_dir, Utc::now())?;
            let counts: Vec<String> = manifest
                .tables
                .iter()
                .map(|(name, entry)| format!("{name}={}", entry.record_count))
                .collect();
            println!("Plot dataset complete: {}", counts.join(", "));
            println!("Manifest: {}", output_dir.join("manifest.json").display());
        }
        Commands::Report { fusion, out, limit } => {
            let run = run_fusion(&fusion)?;
            let report =
                report::build_report(run.now, &run.params, &run.inputs, &run.tables, limit);
            fs::write(&out, report).with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::ExtractFirms { input_csv, output } => {
            let file = fs::File::open(&input_csv)
                .with_context(|| format!("failed to open {}", input_csv.display()))?;
            let extraction = extract::extract_firms_csv(
                file,
                &format!("local_csv:{}", input_csv.display()),
                Utc::now(),
            )
            .with_context(|| format!("failed to read FIRMS CSV {}", input_csv.display()))?;
            output::write_jsonl(&extraction.records, &output)?;
            output::write_json(&extraction.metadata, &metadata_path(&output))?;
            println!(
                "FIRMS extraction complete: {} records",
                extraction.metadata.record_count
            );
        }
        Commands::ExtractOpenMeteo {
            input_json,
            lat,
            lon,
            hourly,
            output,
        } => {
            let text = fs::read_to_string(&input_json)
                .with_context(|| format!("failed to read {}", input_json.display()))?;
            let response: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", input_json.display()))?;
            let variables: Vec<String> = hourly
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect();
            let extraction = extract::flatten_open_meteo(
                &response,
                &variables,
                lat,
                lon,
                &format!("local_json:{}", input_json.display()),
                Utc::now(),
            );
            output::write_jsonl(&extraction.records, &output)?;
            output::write_json(&extraction.metadata, &metadata_path(&output))?;
            println!(
                "Open-Meteo extraction complete: {} records",
                extraction.metadata.record_count
            );
        }
    }

    Ok(())
}
