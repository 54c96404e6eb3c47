//! `poleplan` - export job geodata, assemble permit summaries, look up targets.
//!
//! Usage:
//!   poleplan export job.json --format kmz --out exports/
//!   poleplan summary permit-input.json --profile wv.json
//!   poleplan target road --segment road:40 --segment nonResidentialDriveway:60

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use poleplan_cli::commands;
use poleplan_cli::load_job;
use poleplan_core::{AutofillOptions, ExportFormat, Exporter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "PolePlan geodata and permit tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a job's poles and spans as GeoJSON
    Geojson {
        /// Job file: `{poles, spans, job}` records or a GeoJSON FeatureCollection
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Export a job as GeoJSON, KML, KMZ or a zipped shapefile
    Export {
        input: PathBuf,
        /// geojson, kml, kmz or shapefile
        #[arg(long, short, value_parser = parse_format)]
        format: ExportFormat,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Assemble a permit summary and print it as JSON
    Summary {
        /// Permit input: `{env, results, job, cachedMidspans, store}`
        input: PathBuf,
        /// Clearance profile overrides, layered on the built-in profile
        #[arg(long)]
        profile: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
    /// Print the clearance target for an environment
    Target {
        /// Environment key, also the fallback when segments are given
        env: String,
        /// Crossed environment as `env` or `env:portion`; repeatable
        #[arg(long = "segment")]
        segments: Vec<String>,
        #[arg(long)]
        profile: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Output directory
    #[arg(long, short, default_value = ".")]
    out: PathBuf,
    /// Output file name; defaults to the job id
    #[arg(long)]
    filename: Option<String>,
    /// Fill missing bearings and pulls before export
    #[arg(long)]
    autofill: bool,
    /// Leg length for pull autofill, in feet
    #[arg(long, default_value_t = 100.0)]
    pull_reference_ft: f64,
}

fn parse_format(value: &str) -> Result<ExportFormat, String> {
    ExportFormat::parse(value).ok_or_else(|| format!("unsupported export format '{value}'"))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("poleplan_cli=info".parse()?)
            .add_directive("poleplan_core=info".parse()?))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Geojson { input, output } => run_export(input, ExportFormat::GeoJson, output),
        Command::Export {
            input,
            format,
            output,
        } => run_export(input, format, output),
        Command::Summary {
            input,
            profile,
            pretty,
        } => {
            let profile = match profile {
                Some(path) => Some(commands::load_profile(Some(&path))?),
                None => None,
            };
            let summary = commands::permit_summary(&input, profile)?;
            let json = if pretty {
                serde_json::to_string_pretty(&summary)?
            } else {
                serde_json::to_string(&summary)?
            };
            println!("{json}");
            Ok(())
        }
        Command::Target {
            env,
            segments,
            profile,
        } => {
            let profile = commands::load_profile(profile.as_deref())?;
            let segments = segments
                .iter()
                .map(|s| commands::parse_segment(s))
                .collect::<Result<Vec<_>>>()?;
            let target = commands::resolve_target(&profile, &env, &segments)?;
            println!("{}", serde_json::to_string(&target)?);
            Ok(())
        }
    }
}

fn run_export(input: PathBuf, format: ExportFormat, output: OutputArgs) -> Result<()> {
    if !(output.pull_reference_ft.is_finite() && output.pull_reference_ft > 0.0) {
        return Err(anyhow!("--pull-reference-ft must be a positive number"));
    }
    let job = load_job(&input)?;
    let options = AutofillOptions {
        pull_reference_ft: output.pull_reference_ft,
    };
    let autofill = output.autofill.then_some(&options);

    let outcome = commands::export_job(
        &Exporter::default(),
        job,
        format,
        &output.out,
        output.filename.as_deref(),
        autofill,
    )?;

    match &outcome.fallback {
        Some(reason) => tracing::warn!(
            requested = %outcome.requested,
            reason = %reason,
            "wrote GeoJSON fallback {}",
            outcome.filename
        ),
        None => tracing::info!(bytes = outcome.bytes, "wrote {}", outcome.filename),
    }
    Ok(())
}
