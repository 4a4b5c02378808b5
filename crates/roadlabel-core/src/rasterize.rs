//! Vector → raster conversion of road centerlines.
//!
//! The pipeline only depends on the [`Rasterizer`] trait: one call taking a
//! reference raster, an annotation file and a destination, reporting success
//! or failure. [`LineRasterizer`] is the built-in backend; other backends
//! (for example a GDAL wrapper) plug in by implementing the trait.
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::geojson::{self, GeoJsonError, Polyline};
use crate::geotiff::{self, GeoTiffError, GeoTransform};
use crate::grid::{BinaryMask, Grid};

/// Any nonzero rasterization status. When one of these is returned the
/// destination file must not be trusted.
#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("reference raster unusable: {0}")]
    Reference(#[source] GeoTiffError),
    #[error("reference raster {0} has no usable geotransform")]
    NotGeoreferenced(PathBuf),
    #[error("annotation {path} unusable: {source}")]
    Annotation {
        path: PathBuf,
        #[source]
        source: GeoJsonError,
    },
    #[error("annotation {0} contains no line geometry")]
    NoLineGeometry(PathBuf),
    #[error("cannot write mask: {0}")]
    Write(#[source] GeoTiffError),
    #[error("{0}")]
    Backend(String),
}

/// Burns road centerlines into a single-band raster aligned with a reference
/// image. `Ok(())` is status 0.
pub trait Rasterizer: Send + Sync {
    fn rasterize(
        &self,
        reference: &Path,
        annotation: &Path,
        destination: &Path,
    ) -> Result<(), RasterizeError>;
}

/// Pure-Rust rasterizer for `LineString`/`MultiLineString` annotations.
///
/// Annotation coordinates must be in the reference raster's CRS. Segments are
/// clipped to the raster footprint and burned with Bresenham's algorithm
/// (8-connected, one pixel wide).
#[derive(Debug, Clone)]
pub struct LineRasterizer {
    /// Value stored for road pixels in the written raster.
    pub burn_value: u8,
}

impl Default for LineRasterizer {
    fn default() -> Self {
        Self { burn_value: 255 }
    }
}

impl Rasterizer for LineRasterizer {
    fn rasterize(
        &self,
        reference: &Path,
        annotation: &Path,
        destination: &Path,
    ) -> Result<(), RasterizeError> {
        let info = geotiff::read_info(reference).map_err(RasterizeError::Reference)?;
        let gt = info
            .geotransform()
            .ok_or_else(|| RasterizeError::NotGeoreferenced(reference.to_path_buf()))?;

        let lines = geojson::read_lines(annotation).map_err(|source| RasterizeError::Annotation {
            path: annotation.to_path_buf(),
            source,
        })?;
        if lines.is_empty() {
            return Err(RasterizeError::NoLineGeometry(annotation.to_path_buf()));
        }

        let mask = burn_lines(info.width, info.height, &gt, &lines)
            .ok_or_else(|| RasterizeError::NotGeoreferenced(reference.to_path_buf()))?;
        debug!(
            annotation = %annotation.display(),
            lines = lines.len(),
            pixels = mask.count_on(),
            "rasterized"
        );
        geotiff::write_mask(destination, &mask, self.burn_value, &info.tags)
            .map_err(RasterizeError::Write)
    }
}

/// Burn polylines into a fresh `width`×`height` mask. Returns None if the
/// geotransform cannot be inverted.
pub fn burn_lines(
    width: usize,
    height: usize,
    gt: &GeoTransform,
    lines: &[Polyline],
) -> Option<BinaryMask> {
    let mut mask = Grid::new(width, height, 0u8);
    for line in lines {
        let mut pixels = Vec::with_capacity(line.len());
        for &(x, y) in line {
            pixels.push(gt.world_to_pixel(x, y)?);
        }
        if let [single] = pixels.as_slice() {
            burn_point(&mut mask, *single);
            continue;
        }
        for seg in pixels.windows(2) {
            let (w, h) = (width as f64, height as f64);
            if let Some((a, b)) = clip_segment(seg[0], seg[1], w, h) {
                burn_segment(&mut mask, a, b);
            }
        }
    }
    Some(mask)
}

fn burn_point(mask: &mut BinaryMask, (col, row): (f64, f64)) {
    let (c, r) = (col.floor(), row.floor());
    if c >= 0.0 && r >= 0.0 && (c as usize) < mask.width && (r as usize) < mask.height {
        mask.set(r as usize, c as usize, 1);
    }
}

/// Liang–Barsky clip of segment `a`→`b` to the box `[0, w] × [0, h]`.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    w: f64,
    h: f64,
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [(-dx, a.0), (dx, w - a.0), (-dy, a.1), (dy, h - a.1)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

/// Bresenham walk between the pixels containing `a` and `b`. Endpoints on the
/// far box edge (`col == w`) are pulled back into the last pixel.
fn burn_segment(mask: &mut BinaryMask, a: (f64, f64), b: (f64, f64)) {
    let max_c = mask.width as i64 - 1;
    let max_r = mask.height as i64 - 1;
    let to_px = |(c, r): (f64, f64)| {
        (
            (c.floor() as i64).clamp(0, max_c),
            (r.floor() as i64).clamp(0, max_r),
        )
    };
    let (mut x0, mut y0) = to_px(a);
    let (x1, y1) = to_px(b);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        mask.set(y0 as usize, x0 as usize, 1);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
