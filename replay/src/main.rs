//! # Parking Replay
//!
//! Replays feature records through the pricing engine and writes one priced
//! record per line.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use instrument::{ColumnLayer, RunCapture};
use pricing_core::{
    FeatureRecord, JsonLinesSink, JsonLinesSource, PricingConfig, PricingEngine, RunReport,
    StrategyKind, SyntheticFeed, Unit, sites_from_records,
};

/// Tracing targets that carry tick data rather than progress lines.
const TICK_TARGETS: [&str; 3] = ["price", "reroute", "unit_failure"];

#[derive(Parser, Debug)]
#[command(name = "parking-replay")]
#[command(about = "Replay parking feature records through the pricing strategies")]
#[command(group(ArgGroup::new("source").required(true).args(["input", "synthetic_units"])))]
struct Cli {
    /// Feature records as JSON lines
    #[arg(long)]
    input: Option<PathBuf>,

    /// Generate records for this many units instead of reading a file
    #[arg(long)]
    synthetic_units: Option<usize>,

    /// Ticks to generate in synthetic mode
    #[arg(long, default_value_t = 24)]
    ticks: u64,

    /// Seed for synthetic mode
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Pricing configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output JSON lines path (defaults to stdout)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Process at most this many records
    #[arg(long)]
    limit: Option<usize>,

    /// Write tick tables as parquet under this directory
    #[arg(long)]
    capture_dir: Option<PathBuf>,
}

fn init_logging(capture: bool) {
    // Tick events go to the column tables, not the console.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,price=off,reroute=off"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(filter);
    let column_layer = capture.then(|| ColumnLayer::for_targets(TICK_TARGETS));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(column_layer)
        .init();
}

fn load_config(cli: &Cli) -> Result<PricingConfig> {
    let Some(path) = &cli.config else {
        return Ok(PricingConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    PricingConfig::from_toml_str(&text)
        .with_context(|| format!("loading config {}", path.display()))
}

/// Records to replay, the units to initialize from, and the count of undecodable lines.
fn load_records(cli: &Cli) -> Result<(Vec<FeatureRecord>, Vec<Unit>, u64)> {
    let limit = cli.limit.unwrap_or(usize::MAX);

    if let Some(units) = cli.synthetic_units {
        if units == 0 {
            bail!("--synthetic-units must be at least 1");
        }
        let feed = SyntheticFeed::new(units, cli.ticks, cli.seed);
        let sites = feed.units().to_vec();
        let records: Vec<FeatureRecord> = feed.take(limit).collect();
        info!(
            units,
            ticks = cli.ticks,
            seed = cli.seed,
            records = records.len(),
            "generated synthetic feed"
        );
        return Ok((records, sites, 0));
    }

    let Some(path) = &cli.input else {
        bail!("either --input or --synthetic-units is required");
    };
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

    let mut records = Vec::new();
    let mut skipped = 0u64;
    for item in JsonLinesSource::new(BufReader::new(file)) {
        if records.len() >= limit {
            break;
        }
        match item {
            Ok(record) => records.push(record),
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "skipping record");
                skipped += 1;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        }
    }
    let sites = sites_from_records(&records);
    info!(
        path = %path.display(),
        records = records.len(),
        units = sites.len(),
        skipped,
        "loaded feature records"
    );
    Ok((records, sites, skipped))
}

fn run_name(cli: &Cli) -> String {
    match (&cli.input, cli.synthetic_units) {
        (Some(path), _) => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string()),
        (None, Some(units)) => format!("synthetic_{units}u_{}t_seed_{}", cli.ticks, cli.seed),
        (None, None) => "run".to_string(),
    }
}

fn log_summary(report: &RunReport, skipped_on_load: u64) {
    let summary = &report.summary;
    info!(
        processed = report.processed,
        failed = report.failed,
        skipped = report.skipped + skipped_on_load,
        units = summary.distinct_units(),
        first = summary.first_timestamp().unwrap_or("-"),
        last = summary.last_timestamp().unwrap_or("-"),
        "replay summary"
    );

    for (kind, stats) in summary.strategies() {
        info!(
            strategy = %kind,
            count = stats.count,
            mean = stats.mean,
            std = stats.std_dev(),
            min = stats.min,
            max = stats.max,
            "price statistics"
        );
        if stats.bound_violations > 0 {
            warn!(
                strategy = %kind,
                violations = stats.bound_violations,
                min = summary.bounds().min,
                max = summary.bounds().max,
                "prices outside bounds"
            );
        }
    }
    if summary.within_bounds() {
        info!(
            min = summary.bounds().min,
            max = summary.bounds().max,
            "all prices within bounds"
        );
    }

    for (unit, u) in summary.units() {
        tracing::debug!(
            unit_id = unit.0,
            records = u.records,
            mean_occupancy = u.mean_occupancy(),
            baseline = u.mean_price(StrategyKind::Baseline),
            demand = u.mean_price(StrategyKind::Demand),
            competitive = u.mean_price(StrategyKind::Competitive),
            "unit summary"
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.capture_dir.is_some());

    let config = load_config(&cli)?;
    let mut engine = PricingEngine::new(config).context("building pricing engine")?;
    for kind in engine.strategies() {
        if let Some(model) = engine.model_info(kind) {
            info!(
                strategy = %kind,
                model = %model.model_name,
                base_price = model.base_price,
                "strategy active"
            );
        }
    }

    let (records, sites, skipped_on_load) = load_records(&cli)?;
    engine.initialize(sites);

    let capture = cli
        .capture_dir
        .as_ref()
        .map(|dir| RunCapture::new(dir, &run_name(&cli)));

    let writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut sink = JsonLinesSink::new(writer);

    let report = engine
        .run(records.into_iter().map(Ok), &mut sink)
        .context("replaying records")?;
    log_summary(&report, skipped_on_load);

    if let Some(capture) = capture {
        info!(run_dir = %capture.run_dir().display(), "writing capture");
        drop(capture);
    }
    Ok(())
}
