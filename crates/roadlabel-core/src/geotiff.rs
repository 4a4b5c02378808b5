//! Minimal GeoTIFF access: georeferencing tags of a reference raster, and
//! single-band 8-bit mask rasters.
//!
//! Only the affine part of GeoTIFF is interpreted (tiepoint + pixel scale, or
//! a full model transformation). The GeoKey directory is carried through to
//! written masks verbatim so they keep the reference CRS.
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::grid::{BinaryMask, Grid};

#[derive(Debug, Error)]
pub enum GeoTiffError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TIFF error in {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },
    #[error("{path}: unsupported sample layout for a mask ({detail})")]
    UnsupportedLayout { path: PathBuf, detail: String },
}

/// Affine pixel→world transform, GDAL coefficient order:
/// `x = c[0] + col·c[1] + row·c[2]`, `y = c[3] + col·c[4] + row·c[5]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform from a tiepoint `(i, j) → (x, y)` and pixel scale.
    pub fn from_tiepoint(tiepoint: &[f64], scale: &[f64]) -> Option<Self> {
        if tiepoint.len() < 6 || scale.len() < 2 {
            return None;
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let (sx, sy) = (scale[0], scale[1]);
        Some(Self([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy]))
    }

    /// From a row-major 4×4 ModelTransformation matrix.
    pub fn from_model_transformation(m: &[f64]) -> Option<Self> {
        if m.len() < 16 {
            return None;
        }
        Some(Self([m[3], m[0], m[1], m[7], m[4], m[5]]))
    }

    #[cfg(test)]
    fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.0;
        (c[0] + col * c[1] + row * c[2], c[3] + col * c[4] + row * c[5])
    }

    /// Inverse mapping; returns fractional (col, row). None if the transform
    /// is singular.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let c = &self.0;
        let det = c[1] * c[5] - c[2] * c[4];
        if det.abs() < f64::EPSILON * (c[1].abs() + c[5].abs()).max(1e-300) {
            return None;
        }
        let dx = x - c[0];
        let dy = y - c[3];
        let col = (c[5] * dx - c[2] * dy) / det;
        let row = (-c[4] * dx + c[1] * dy) / det;
        Some((col, row))
    }
}

/// GeoTIFF tags copied from a reference raster onto derived masks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoTags {
    pub pixel_scale: Option<Vec<f64>>,
    pub tiepoint: Option<Vec<f64>>,
    pub transformation: Option<Vec<f64>>,
    pub key_directory: Option<Vec<u16>>,
    pub double_params: Option<Vec<f64>>,
    pub ascii_params: Option<String>,
}

impl GeoTags {
    pub fn geotransform(&self) -> Option<GeoTransform> {
        if let Some(m) = &self.transformation {
            return GeoTransform::from_model_transformation(m);
        }
        match (&self.tiepoint, &self.pixel_scale) {
            (Some(t), Some(s)) => GeoTransform::from_tiepoint(t, s),
            _ => None,
        }
    }
}

/// Shape and georeferencing of a raster, without its pixels.
#[derive(Debug, Clone)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub tags: GeoTags,
}

impl RasterInfo {
    pub fn geotransform(&self) -> Option<GeoTransform> {
        self.tags.geotransform()
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, GeoTiffError> {
    let file = File::open(path).map_err(|source| GeoTiffError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Decoder::new(BufReader::new(file)).map_err(|source| GeoTiffError::Tiff {
        path: path.to_path_buf(),
        source,
    })
}

fn tiff_err(path: &Path) -> impl FnOnce(tiff::TiffError) -> GeoTiffError + '_ {
    move |source| GeoTiffError::Tiff {
        path: path.to_path_buf(),
        source,
    }
}

/// Read dimensions and GeoTIFF tags. Pixel data is not decoded.
pub fn read_info(path: &Path) -> Result<RasterInfo, GeoTiffError> {
    let mut decoder = open_decoder(path)?;
    let (w, h) = decoder.dimensions().map_err(tiff_err(path))?;

    let mut f64_tag = |tag: Tag| -> Result<Option<Vec<f64>>, GeoTiffError> {
        decoder
            .find_tag(tag)
            .and_then(|v| v.map(|v| v.into_f64_vec()).transpose())
            .map_err(tiff_err(path))
    };
    let pixel_scale = f64_tag(Tag::ModelPixelScaleTag)?;
    let tiepoint = f64_tag(Tag::ModelTiepointTag)?;
    let transformation = f64_tag(Tag::ModelTransformationTag)?;
    let double_params = f64_tag(Tag::GeoDoubleParamsTag)?;

    let key_directory = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)
        .and_then(|v| v.map(|v| v.into_u16_vec()).transpose())
        .map_err(tiff_err(path))?;
    let ascii_params = decoder
        .find_tag(Tag::GeoAsciiParamsTag)
        .and_then(|v| v.map(|v| v.into_string()).transpose())
        .map_err(tiff_err(path))?;

    Ok(RasterInfo {
        width: w as usize,
        height: h as usize,
        tags: GeoTags {
            pixel_scale,
            tiepoint,
            transformation,
            key_directory,
            double_params,
            ascii_params,
        },
    })
}

/// Read the first band of a raster as a {0, 1} mask (any nonzero sample → 1).
pub fn read_mask(path: &Path) -> Result<BinaryMask, GeoTiffError> {
    let mut decoder = open_decoder(path)?;
    let (w, h) = decoder.dimensions().map_err(tiff_err(path))?;
    let (w, h) = (w as usize, h as usize);
    let image = decoder.read_image().map_err(tiff_err(path))?;

    let samples: Vec<u8> = match image {
        DecodingResult::U8(v) => v.into_iter().map(|s| u8::from(s != 0)).collect(),
        DecodingResult::U16(v) => v.into_iter().map(|s| u8::from(s != 0)).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|s| u8::from(s != 0)).collect(),
        DecodingResult::F32(v) => v.into_iter().map(|s| u8::from(s != 0.0)).collect(),
        _ => {
            return Err(GeoTiffError::UnsupportedLayout {
                path: path.to_path_buf(),
                detail: "signed or 64-bit samples".into(),
            })
        }
    };

    let n = w * h;
    if n == 0 || samples.len() % n != 0 {
        return Err(GeoTiffError::UnsupportedLayout {
            path: path.to_path_buf(),
            detail: format!("{} samples for {}x{} pixels", samples.len(), w, h),
        });
    }
    let bands = samples.len() / n;
    let data = if bands == 1 {
        samples
    } else {
        samples.into_iter().step_by(bands).collect()
    };
    Grid::from_vec(w, h, data).ok_or_else(|| GeoTiffError::UnsupportedLayout {
        path: path.to_path_buf(),
        detail: "band extraction produced wrong length".into(),
    })
}

/// Write an 8-bit single-band raster. `burn` is the stored value for mask
/// cells equal to 1 (255 for the label_tif convention); 0 stays 0.
pub fn write_mask(
    path: &Path,
    mask: &BinaryMask,
    burn: u8,
    tags: &GeoTags,
) -> Result<(), GeoTiffError> {
    let file = File::create(path).map_err(|source| GeoTiffError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_err(path))?;
    let mut image = encoder
        .new_image::<colortype::Gray8>(mask.width as u32, mask.height as u32)
        .map_err(tiff_err(path))?;

    {
        let dir = image.encoder();
        if let Some(v) = &tags.pixel_scale {
            dir.write_tag(Tag::ModelPixelScaleTag, &v[..]).map_err(tiff_err(path))?;
        }
        if let Some(v) = &tags.tiepoint {
            dir.write_tag(Tag::ModelTiepointTag, &v[..]).map_err(tiff_err(path))?;
        }
        if let Some(v) = &tags.transformation {
            dir.write_tag(Tag::ModelTransformationTag, &v[..]).map_err(tiff_err(path))?;
        }
        if let Some(v) = &tags.key_directory {
            dir.write_tag(Tag::GeoKeyDirectoryTag, &v[..]).map_err(tiff_err(path))?;
        }
        if let Some(v) = &tags.double_params {
            dir.write_tag(Tag::GeoDoubleParamsTag, &v[..]).map_err(tiff_err(path))?;
        }
        if let Some(s) = &tags.ascii_params {
            dir.write_tag(Tag::GeoAsciiParamsTag, s.as_str()).map_err(tiff_err(path))?;
        }
    }

    let data: Vec<u8> = mask.data.iter().map(|&v| if v != 0 { burn } else { 0 }).collect();
    image.write_data(&data).map_err(tiff_err(path))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Tags for a north-up raster whose top-left corner is `(x0, y0)` with
    /// square pixels of `size` world units.
    pub fn north_up_tags(x0: f64, y0: f64, size: f64) -> GeoTags {
        GeoTags {
            pixel_scale: Some(vec![size, size, 0.0]),
            tiepoint: Some(vec![0.0, 0.0, 0.0, x0, y0, 0.0]),
            key_directory: Some(vec![1, 1, 0, 1, 2048, 0, 1, 4326]),
            ..GeoTags::default()
        }
    }

    /// Write a blank georeferenced reference raster.
    pub fn write_reference(path: &Path, width: usize, height: usize, tags: &GeoTags) {
        write_mask(path, &Grid::new(width, height, 0u8), 255, tags).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tiepoint_transform_round_trips_pixels() {
        let gt = GeoTransform::from_tiepoint(&[0.0, 0.0, 0.0, -115.3, 36.2, 0.0], &[0.5, 0.25, 0.0])
            .unwrap();
        let (x, y) = gt.pixel_to_world(10.0, 4.0);
        assert_relative_eq!(x, -110.3, epsilon = 1e-9);
        assert_relative_eq!(y, 35.2, epsilon = 1e-9);
        let (c, r) = gt.world_to_pixel(x, y).unwrap();
        assert_relative_eq!(c, 10.0, epsilon = 1e-9);
        assert_relative_eq!(r, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn model_transformation_takes_precedence() {
        let tags = GeoTags {
            transformation: Some(vec![
                2.0, 0.0, 0.0, 100.0, //
                0.0, -2.0, 0.0, 50.0, //
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ]),
            ..north_up_tags(0.0, 0.0, 1.0)
        };
        assert_eq!(
            tags.geotransform(),
            Some(GeoTransform([100.0, 2.0, 0.0, 50.0, 0.0, -2.0]))
        );
    }

    #[test]
    fn written_mask_keeps_shape_values_and_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tif");
        let mut mask = Grid::new(7, 5, 0u8);
        mask.set(2, 3, 1);
        mask.set(4, 6, 1);
        let tags = north_up_tags(10.0, 20.0, 0.5);
        write_mask(&path, &mask, 255, &tags).unwrap();

        let info = read_info(&path).unwrap();
        assert_eq!((info.width, info.height), (7, 5));
        assert_eq!(info.tags.key_directory, tags.key_directory);
        assert_eq!(
            info.geotransform(),
            Some(GeoTransform([10.0, 0.5, 0.0, 20.0, 0.0, -0.5]))
        );

        let back = read_mask(&path).unwrap();
        assert_eq!(back, mask);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_mask(Path::new("/nonexistent/mask.tif")).unwrap_err();
        assert!(matches!(err, GeoTiffError::Io { .. }));
    }

    #[test]
    fn garbage_file_is_a_tiff_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.tif");
        std::fs::write(&path, b"definitely not a tiff").unwrap();
        assert!(matches!(read_mask(&path), Err(GeoTiffError::Tiff { .. })));
    }
}
