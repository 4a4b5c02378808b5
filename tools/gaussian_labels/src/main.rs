//! Convert SpaceNet road linestrings into gaussian road labels.
//!
//! For every country under the base directory this writes
//! `gaussian_roads/label_tif` (rasterized centerlines), `gaussian_roads/label_png`
//! (8-bit gaussian soft labels) and `gaussian_roads/vis` (QA overlays).
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use roadlabel_core::labels::threshold_radius;
use roadlabel_core::paths::TilePaths;
use roadlabel_core::{
    CountryReport, CountrySpec, CountryStatus, LineRasterizer, Pipeline, PipelineConfig,
    ProgressObserver, RunReport, TileOutcome,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "gaussian_labels",
    about = "Create gaussian road labels from SpaceNet linestring annotations"
)]
struct Args {
    /// Base directory of the SpaceNet dataset (contains one folder per AOI).
    #[arg(short = 'd', long)]
    base_dir: PathBuf,

    /// JSON config file; any field left out takes its default.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process only these countries (repeatable). Overrides the config list.
    #[arg(long = "country")]
    countries: Vec<String>,

    /// Gaussian bandwidth in pixels.
    #[arg(long)]
    sigma: Option<f32>,

    /// Hard-label threshold on the soft label.
    #[arg(long)]
    threshold: Option<f32>,

    /// Overlay blend ratio for road pixels.
    #[arg(long)]
    alpha: Option<f32>,

    /// Worker threads (default: available parallelism).
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Write the run report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Hide the per-country progress bar.
    #[arg(long)]
    no_progress: bool,
}

impl Args {
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if !self.countries.is_empty() {
            cfg.countries = self.countries.iter().map(CountrySpec::new).collect();
        }
        if let Some(v) = self.sigma {
            cfg.label.sigma = v;
        }
        if let Some(v) = self.threshold {
            cfg.label.threshold = v;
        }
        if let Some(v) = self.alpha {
            cfg.label.alpha = v;
        }
        if self.workers.is_some() {
            cfg.workers = self.workers;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

// ── Progress ──────────────────────────────────────────────────────────────────

/// The bar currently on screen, shared with the log writer so log lines are
/// printed above it instead of through it.
#[derive(Clone, Default)]
struct BarSlot(Arc<Mutex<Option<ProgressBar>>>);

impl BarSlot {
    fn current(&self) -> Option<ProgressBar> {
        self.0.lock().ok().and_then(|guard| guard.clone())
    }

    fn replace(&self, bar: Option<ProgressBar>) -> Option<ProgressBar> {
        match self.0.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, bar),
            Err(_) => None,
        }
    }
}

/// stderr writer for tracing that hides the progress bar while it writes.
struct LogWriter(Option<ProgressBar>);

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.0 {
            Some(bar) => bar.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// One progress bar per country, replaced when the next country starts.
struct BarProgress {
    slot: BarSlot,
}

impl BarProgress {
    fn new(slot: BarSlot) -> Self {
        Self { slot }
    }
}

impl ProgressObserver for BarProgress {
    fn country_started(&self, country: &str, tiles: usize) {
        let bar = ProgressBar::new(tiles as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{prefix:.bold} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_prefix(country.to_owned());
        if let Some(old) = self.slot.replace(Some(bar)) {
            old.finish_and_clear();
        }
    }

    fn tile_finished(&self, tile: &TilePaths, _outcome: &TileOutcome) {
        if let Some(bar) = self.slot.current() {
            bar.set_message(format!("Creating: {}", tile.name));
            bar.inc(1);
        }
    }

    fn country_finished(&self, _report: &CountryReport) {
        if let Some(bar) = self.slot.replace(None) {
            bar.finish_and_clear();
        }
    }
}

// ── Summary ───────────────────────────────────────────────────────────────────

fn print_summary(report: &RunReport) {
    for c in &report.countries {
        match &c.status {
            CountryStatus::Processed => {
                println!(
                    "{:<16} {} tiles: {} labeled, {} without overlay. Not able to convert {} files ({} unreadable masks, {} errors).",
                    c.country,
                    c.tiles,
                    c.labeled,
                    c.visualization_skipped,
                    c.rasterize_failures,
                    c.unreadable_masks,
                    c.errors,
                );
                if c.cancelled > 0 {
                    println!("{:<16} {} tiles cancelled.", "", c.cancelled);
                }
            }
            CountryStatus::Skipped(reason) => println!("{:<16} skipped ({reason})", c.country),
            CountryStatus::SetupFailed(reason) => {
                println!("{:<16} setup failed ({reason})", c.country)
            }
        }
    }
    println!("Finished Creating Labels, time {:.2}s", report.elapsed_secs);
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn run(args: &Args, slot: &BarSlot) -> Result<RunReport> {
    let cfg = args.resolve_config()?;
    if !args.base_dir.is_dir() {
        anyhow::bail!("base directory {} does not exist", args.base_dir.display());
    }
    info!(
        base_dir = %args.base_dir.display(),
        countries = cfg.countries.len(),
        sigma = cfg.label.sigma,
        threshold = cfg.label.threshold,
        hard_radius_px = threshold_radius(cfg.label.sigma, cfg.label.threshold),
        "creating gaussian road labels"
    );

    let pipeline = Pipeline::new(cfg, LineRasterizer::default());
    let report = if args.no_progress {
        pipeline.run(&args.base_dir)?
    } else {
        pipeline.run_with_progress(&args.base_dir, &BarProgress::new(slot.clone()))?
    };

    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Write failed: {}", path.display()))?;
    }
    Ok(report)
}

fn main() -> Result<ExitCode> {
    let slot = BarSlot::default();
    let log_slot = slot.clone();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(move || LogWriter(log_slot.current()))
        .init();

    let args = Args::parse();
    let report = run(&args, &slot)?;
    print_summary(&report);

    if report.has_setup_failures() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
