//! Dataset-level orchestration: countries → tiles → label artifacts.
//!
//! Countries run one after another. Within a country, tiles run on a rayon
//! pool when the `threading` feature is on; each tile returns a
//! [`TileOutcome`] and the per-country counters are a fold over those
//! outcomes, so workers share nothing but the read-only pipeline and the
//! cancellation flag.
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::error::{ParameterError, ParameterErrorKind};
use image::{GrayImage, ImageError};
#[cfg(feature = "threading")]
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{CountrySpec, LabelParams, PipelineConfig};
use crate::distance::distance_field;
use crate::geotiff;
use crate::grid::{BinaryMask, Grid, HardLabel, SoftLabel};
use crate::labels::{gaussian_label, hard_label};
use crate::overlay::{overlay, Palette};
use crate::paths::{CountryDirs, TilePaths};
use crate::rasterize::Rasterizer;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot build worker pool: {0}")]
    ThreadPool(String),
}

/// Tile executor: a rayon pool with the `threading` feature, the calling
/// thread otherwise.
struct Workers {
    #[cfg(feature = "threading")]
    pool: rayon::ThreadPool,
}

impl Workers {
    #[cfg(feature = "threading")]
    fn new(threads: Option<usize>) -> Result<Self, PipelineError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;
        Ok(Self { pool })
    }

    #[cfg(not(feature = "threading"))]
    fn new(_threads: Option<usize>) -> Result<Self, PipelineError> {
        Ok(Self {})
    }

    #[cfg(feature = "threading")]
    fn map<T, F>(&self, items: &[T], f: F) -> Vec<TileOutcome>
    where
        T: Sync,
        F: Fn(&T) -> TileOutcome + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }

    #[cfg(not(feature = "threading"))]
    fn map<T, F>(&self, items: &[T], f: F) -> Vec<TileOutcome>
    where
        F: Fn(&T) -> TileOutcome,
    {
        items.iter().map(f).collect()
    }
}

/// Cooperative stop flag, checked before each tile starts. Tiles already in
/// flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TileOutcome {
    /// Mask, soft label and overlay written.
    Labeled,
    /// Mask and soft label written; the overlay base was missing or unusable.
    VisualizationSkipped(String),
    /// Rasterizer reported failure; an all-zero soft label was written.
    RasterizeFailed(String),
    /// Rasterizer reported success but its output could not be read; nothing
    /// else was written for this tile.
    UnreadableMask(String),
    /// An output could not be written, or the tile name was unusable.
    Error(String),
    /// Skipped because the run was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CountryStatus {
    Processed,
    /// Reference-imagery directory absent; nothing was touched.
    Skipped(String),
    /// Output tree could not be created; no tiles were attempted.
    SetupFailed(String),
}

/// Per-country tally of tile outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryReport {
    pub country: String,
    pub status: CountryStatus,
    pub tiles: usize,
    pub labeled: usize,
    pub visualization_skipped: usize,
    pub rasterize_failures: usize,
    pub unreadable_masks: usize,
    pub errors: usize,
    pub cancelled: usize,
}

impl CountryReport {
    pub fn new(country: &str, status: CountryStatus) -> Self {
        Self {
            country: country.to_owned(),
            status,
            tiles: 0,
            labeled: 0,
            visualization_skipped: 0,
            rasterize_failures: 0,
            unreadable_masks: 0,
            errors: 0,
            cancelled: 0,
        }
    }

    pub fn record(&mut self, outcome: &TileOutcome) {
        self.tiles += 1;
        match outcome {
            TileOutcome::Labeled => self.labeled += 1,
            TileOutcome::VisualizationSkipped(_) => self.visualization_skipped += 1,
            TileOutcome::RasterizeFailed(_) => self.rasterize_failures += 1,
            TileOutcome::UnreadableMask(_) => self.unreadable_masks += 1,
            TileOutcome::Error(_) => self.errors += 1,
            TileOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Whole-run summary, serialisable for `--report`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub countries: Vec<CountryReport>,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn total_rasterize_failures(&self) -> usize {
        self.countries.iter().map(|c| c.rasterize_failures).sum()
    }

    pub fn total_unreadable_masks(&self) -> usize {
        self.countries.iter().map(|c| c.unreadable_masks).sum()
    }

    /// True if any country aborted during setup. Per-tile failures never
    /// count as fatal.
    pub fn has_setup_failures(&self) -> bool {
        self.countries
            .iter()
            .any(|c| matches!(c.status, CountryStatus::SetupFailed(_)))
    }
}

/// Hooks for progress display. All methods default to no-ops.
pub trait ProgressObserver: Sync {
    fn country_started(&self, _country: &str, _tiles: usize) {}
    fn tile_finished(&self, _tile: &TilePaths, _outcome: &TileOutcome) {}
    fn country_finished(&self, _report: &CountryReport) {}
}

pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Distance field → soft label → hard label for one mask.
pub fn synthesize_labels(mask: &BinaryMask, params: &LabelParams) -> (SoftLabel, HardLabel) {
    let soft = gaussian_label(&distance_field(mask), params.sigma);
    let hard = hard_label(&soft, params.threshold);
    (soft, hard)
}

fn write_gray_png(path: &Path, grid: &Grid<u8>) -> Result<(), ImageError> {
    let img = GrayImage::from_raw(grid.width as u32, grid.height as u32, grid.data.clone())
        .ok_or_else(|| {
            ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            ))
        })?;
    img.save(path)
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Drop artifacts an earlier run left for a tile that is no longer labeled.
fn clear_stale(tile: &TilePaths, paths: &[&Path]) {
    for path in paths {
        if let Err(e) = remove_stale(path) {
            warn!(tile = %tile.name, file = %path.display(), error = %e, "cannot remove stale artifact");
        }
    }
}

pub struct Pipeline<R: Rasterizer> {
    config: PipelineConfig,
    rasterizer: R,
    palette: Palette,
    cancel: CancelToken,
}

impl<R: Rasterizer> Pipeline<R> {
    pub fn new(config: PipelineConfig, rasterizer: R) -> Self {
        Self {
            config,
            rasterizer,
            palette: Palette::voc(2),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, base: &Path) -> Result<RunReport, PipelineError> {
        self.run_with_progress(base, &NoProgress)
    }

    pub fn run_with_progress(
        &self,
        base: &Path,
        progress: &dyn ProgressObserver,
    ) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let workers = Workers::new(self.config.workers)?;

        let mut countries = Vec::with_capacity(self.config.countries.len());
        for country in &self.config.countries {
            let report = self.process_country(base, country, &workers, progress);
            progress.country_finished(&report);
            countries.push(report);
        }

        Ok(RunReport {
            countries,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// Run every tile of one country. Never fails: problems are reflected in
    /// the returned report.
    fn process_country(
        &self,
        base: &Path,
        country: &CountrySpec,
        workers: &Workers,
        progress: &dyn ProgressObserver,
    ) -> CountryReport {
        let layout = &self.config.layout;
        let dirs = CountryDirs::new(base, &country.name, layout);

        if !dirs.reference.is_dir() {
            warn!(
                country = %country.name,
                dir = %dirs.reference.display(),
                "reference imagery folder does not exist; skipping country"
            );
            return CountryReport::new(
                &country.name,
                CountryStatus::Skipped(format!("missing {}", dirs.reference.display())),
            );
        }

        if let Err(e) = dirs.create_outputs() {
            error!(country = %country.name, error = %e, "cannot create output directories");
            return CountryReport::new(
                &country.name,
                CountryStatus::SetupFailed(format!("{}: {e}", dirs.output.display())),
            );
        }

        let annotations = match dirs.annotations(layout) {
            Ok(a) => a,
            Err(e) => {
                error!(country = %country.name, error = %e, "cannot list annotations");
                return CountryReport::new(
                    &country.name,
                    CountryStatus::SetupFailed(format!("{}: {e}", dirs.annotation.display())),
                );
            }
        };
        if annotations.is_empty() {
            warn!(
                country = %country.name,
                dir = %dirs.annotation.display(),
                "no annotation files found"
            );
        }

        info!(country = %country.name, tiles = annotations.len(), "processing country");
        progress.country_started(&country.name, annotations.len());

        let outcomes = workers.map(&annotations, |ann| match TilePaths::derive(ann, &dirs, layout) {
            Some(tile) => {
                let outcome = self.process_tile(&tile);
                progress.tile_finished(&tile, &outcome);
                outcome
            }
            None => {
                warn!(file = %ann.display(), "annotation name is not valid UTF-8");
                TileOutcome::Error(format!("unusable file name {}", ann.display()))
            }
        });

        let mut report = CountryReport::new(&country.name, CountryStatus::Processed);
        for outcome in &outcomes {
            report.record(outcome);
        }
        info!(
            country = %country.name,
            failures = report.rasterize_failures,
            unreadable = report.unreadable_masks,
            "Not able to convert {} files.",
            report.rasterize_failures
        );
        report
    }

    /// Produce every artifact for one tile.
    pub fn process_tile(&self, tile: &TilePaths) -> TileOutcome {
        if self.cancel.is_cancelled() {
            return TileOutcome::Cancelled;
        }
        let params = &self.config.label;

        if let Err(e) = self
            .rasterizer
            .rasterize(&tile.reference, &tile.annotation, &tile.mask_out)
        {
            warn!(tile = %tile.name, error = %e, "not able to convert; writing empty label");
            return self.write_empty_label(tile, e.to_string());
        }

        let mask = match geotiff::read_mask(&tile.mask_out) {
            Ok(m) => m,
            Err(e) => {
                warn!(tile = %tile.name, error = %e, "rasterized mask unreadable; skipping tile");
                clear_stale(tile, &[tile.soft_label_out.as_path(), tile.vis_out.as_path()]);
                return TileOutcome::UnreadableMask(e.to_string());
            }
        };

        let (soft, hard) = synthesize_labels(&mask, params);
        if let Err(e) = write_gray_png(&tile.soft_label_out, &soft.to_u8_scaled()) {
            warn!(tile = %tile.name, error = %e, "cannot write soft label");
            return TileOutcome::Error(format!("{}: {e}", tile.soft_label_out.display()));
        }

        let base = match image::open(&tile.visual) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!(tile = %tile.name, error = %e, "overlay base unreadable; skipping visualization");
                clear_stale(tile, &[tile.vis_out.as_path()]);
                return TileOutcome::VisualizationSkipped(e.to_string());
            }
        };
        let vis = match overlay(&base, &hard, &self.palette, params.alpha) {
            Ok(v) => v,
            Err(e) => {
                warn!(tile = %tile.name, error = %e, "cannot compose overlay");
                clear_stale(tile, &[tile.vis_out.as_path()]);
                return TileOutcome::VisualizationSkipped(e.to_string());
            }
        };
        if let Err(e) = vis.save(&tile.vis_out) {
            warn!(tile = %tile.name, error = %e, "cannot write visualization");
            return TileOutcome::Error(format!("{}: {e}", tile.vis_out.display()));
        }

        debug!(tile = %tile.name, road_pixels = mask.count_on(), "labeled");
        TileOutcome::Labeled
    }

    /// Failure path: all-zero soft label shaped like the reference raster (or
    /// the configured fallback), no overlay.
    fn write_empty_label(&self, tile: &TilePaths, reason: String) -> TileOutcome {
        let (w, h) = match geotiff::read_info(&tile.reference) {
            Ok(info) if info.width > 0 && info.height > 0 => (info.width, info.height),
            _ => self.config.fallback_shape,
        };
        if let Err(e) = write_gray_png(&tile.soft_label_out, &Grid::new(w, h, 0u8)) {
            warn!(tile = %tile.name, error = %e, "cannot write empty soft label");
            return TileOutcome::Error(format!("{}: {e}", tile.soft_label_out.display()));
        }
        clear_stale(tile, &[tile.vis_out.as_path()]);
        TileOutcome::RasterizeFailed(reason)
    }
}
