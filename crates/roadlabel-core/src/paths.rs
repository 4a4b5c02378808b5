//! Per-country directories and per-tile file names.
//!
//! Output and reference names are derived from the annotation file name by
//! plain substring substitution: every occurrence of the annotation directory
//! role (`geojson_roads`) becomes the reference role (`PS-RGB`), then every
//! occurrence of the annotation extension (`geojson`) becomes the target
//! extension. SpaceNet embeds both tokens in its file names, e.g.
//! `SN3_roads_train_AOI_2_Vegas_geojson_roads_img1.geojson` →
//! `SN3_roads_train_AOI_2_Vegas_PS-RGB_img1.tif`.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::DatasetLayout;

/// Input and output directories of one country.
#[derive(Debug, Clone)]
pub struct CountryDirs {
    pub reference: PathBuf,
    pub annotation: PathBuf,
    pub visual: PathBuf,
    pub output: PathBuf,
    pub masks: PathBuf,
    pub soft_labels: PathBuf,
    pub vis: PathBuf,
}

impl CountryDirs {
    pub fn new(base: &Path, country: &str, layout: &DatasetLayout) -> Self {
        let root = base.join(country);
        let output = root.join(&layout.output_dir);
        Self {
            reference: root.join(&layout.reference_dir),
            annotation: root.join(&layout.annotation_dir),
            visual: root.join(&layout.visual_dir),
            masks: output.join(&layout.mask_subdir),
            soft_labels: output.join(&layout.soft_label_subdir),
            vis: output.join(&layout.vis_subdir),
            output,
        }
    }

    /// Create the output tree (idempotent).
    pub fn create_outputs(&self) -> io::Result<()> {
        for dir in [&self.masks, &self.soft_labels, &self.vis] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Annotation files with the layout's extension, sorted by name so runs
    /// are reproducible. A missing directory yields an empty list.
    pub fn annotations(&self, layout: &DatasetLayout) -> io::Result<Vec<PathBuf>> {
        if !self.annotation.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.annotation)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) == Some(layout.annotation_ext.as_str()) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Every path touched while processing one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePaths {
    /// Annotation file name, used in logs.
    pub name: String,
    pub annotation: PathBuf,
    pub reference: PathBuf,
    pub visual: PathBuf,
    pub mask_out: PathBuf,
    pub soft_label_out: PathBuf,
    pub vis_out: PathBuf,
}

/// Swap the directory-role token, then the extension token.
fn substitute(file_name: &str, layout: &DatasetLayout, ext: &str) -> String {
    file_name
        .replace(&layout.annotation_dir, &layout.reference_dir)
        .replace(&layout.annotation_ext, ext)
}

impl TilePaths {
    /// Derive all tile paths from an annotation file inside `dirs.annotation`.
    /// Returns None if the path has no UTF-8 file name.
    pub fn derive(annotation: &Path, dirs: &CountryDirs, layout: &DatasetLayout) -> Option<Self> {
        let name = annotation.file_name()?.to_str()?.to_owned();
        let tif = substitute(&name, layout, &layout.reference_ext);
        let png = substitute(&name, layout, &layout.image_ext);
        Some(Self {
            annotation: dirs.annotation.join(&name),
            reference: dirs.reference.join(&tif),
            visual: dirs.visual.join(&png),
            mask_out: dirs.masks.join(&tif),
            soft_label_out: dirs.soft_labels.join(&png),
            vis_out: dirs.vis.join(&png),
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacenet_names_are_substituted() {
        let layout = DatasetLayout::default();
        let dirs = CountryDirs::new(Path::new("/data"), "AOI_2_Vegas", &layout);
        let ann = dirs
            .annotation
            .join("SN3_roads_train_AOI_2_Vegas_geojson_roads_img1.geojson");
        let tile = TilePaths::derive(&ann, &dirs, &layout).unwrap();

        assert_eq!(
            tile.reference,
            Path::new("/data/AOI_2_Vegas/PS-RGB/SN3_roads_train_AOI_2_Vegas_PS-RGB_img1.tif")
        );
        assert_eq!(
            tile.visual,
            Path::new("/data/AOI_2_Vegas/RGB_8bit/SN3_roads_train_AOI_2_Vegas_PS-RGB_img1.png")
        );
        assert_eq!(
            tile.mask_out,
            Path::new(
                "/data/AOI_2_Vegas/gaussian_roads/label_tif/SN3_roads_train_AOI_2_Vegas_PS-RGB_img1.tif"
            )
        );
        assert_eq!(
            tile.soft_label_out,
            Path::new(
                "/data/AOI_2_Vegas/gaussian_roads/label_png/SN3_roads_train_AOI_2_Vegas_PS-RGB_img1.png"
            )
        );
        assert_eq!(
            tile.vis_out,
            Path::new("/data/AOI_2_Vegas/gaussian_roads/vis/SN3_roads_train_AOI_2_Vegas_PS-RGB_img1.png")
        );
    }

    #[test]
    fn plain_names_only_swap_extension() {
        let layout = DatasetLayout::default();
        let dirs = CountryDirs::new(Path::new("base"), "X", &layout);
        let tile = TilePaths::derive(Path::new("img7.geojson"), &dirs, &layout).unwrap();
        assert_eq!(tile.reference, Path::new("base/X/PS-RGB/img7.tif"));
        assert_eq!(tile.name, "img7.geojson");
    }

    #[test]
    fn annotations_are_filtered_and_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DatasetLayout::default();
        let dirs = CountryDirs::new(tmp.path(), "AOI", &layout);
        fs::create_dir_all(&dirs.annotation).unwrap();
        for name in ["b.geojson", "a.geojson", "notes.txt"] {
            fs::write(dirs.annotation.join(name), "{}").unwrap();
        }
        let files = dirs.annotations(&layout).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.geojson", "b.geojson"]);
    }

    #[test]
    fn missing_annotation_dir_is_empty() {
        let layout = DatasetLayout::default();
        let dirs = CountryDirs::new(Path::new("/nonexistent"), "AOI", &layout);
        assert!(dirs.annotations(&layout).unwrap().is_empty());
    }
}
