//! Run configuration. Every field has a default matching the SpaceNet road
//! dataset layout, so an empty JSON object `{}` is a complete config.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Label synthesis parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelParams {
    /// Gaussian bandwidth in pixels, default 15.
    pub sigma: f32,
    /// Hard-label cutoff on the soft label (strict `>`), default 0.76.
    pub threshold: f32,
    /// Overlay blend ratio for road pixels, default 0.5.
    pub alpha: f32,
}

impl Default for LabelParams {
    fn default() -> Self {
        Self {
            sigma: 15.0,
            threshold: 0.76,
            alpha: 0.5,
        }
    }
}

/// Directory-role names and extensions inside each country directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetLayout {
    /// Georeferenced reference rasters.
    pub reference_dir: String,
    /// Road annotations.
    pub annotation_dir: String,
    /// 8-bit RGB renderings used as overlay base.
    pub visual_dir: String,
    /// Output root, created if absent.
    pub output_dir: String,
    pub mask_subdir: String,
    pub soft_label_subdir: String,
    pub vis_subdir: String,
    pub annotation_ext: String,
    pub reference_ext: String,
    pub image_ext: String,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            reference_dir: "PS-RGB".into(),
            annotation_dir: "geojson_roads".into(),
            visual_dir: "RGB_8bit".into(),
            output_dir: "gaussian_roads".into(),
            mask_subdir: "label_tif".into(),
            soft_label_subdir: "label_png".into(),
            vis_subdir: "vis".into(),
            annotation_ext: "geojson".into(),
            reference_ext: "tif".into(),
            image_ext: "png".into(),
        }
    }
}

/// One dataset partition (an "AOI") living at `<base>/<name>/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountrySpec {
    pub name: String,
}

impl CountrySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The four SpaceNet-3 road AOIs.
pub fn spacenet_countries() -> Vec<CountrySpec> {
    ["AOI_2_Vegas", "AOI_3_Paris", "AOI_4_Shanghai", "AOI_5_Khartoum"]
        .into_iter()
        .map(CountrySpec::new)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub label: LabelParams,
    pub layout: DatasetLayout,
    pub countries: Vec<CountrySpec>,
    /// Worker threads per country; None = available parallelism.
    pub workers: Option<usize>,
    /// (width, height) of the all-zero soft label written when the reference
    /// raster itself cannot be read. SpaceNet tiles are 1300×1300.
    pub fallback_shape: (usize, usize),
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label: LabelParams::default(),
            layout: DatasetLayout::default(),
            countries: spacenet_countries(),
            workers: None,
            fallback_shape: (1300, 1300),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.label;
        if !(l.sigma.is_finite() && l.sigma > 0.0) {
            return Err(ConfigError::Invalid(format!("sigma must be > 0, got {}", l.sigma)));
        }
        if !(0.0..=1.0).contains(&l.threshold) {
            return Err(ConfigError::Invalid(format!(
                "threshold must be in [0, 1], got {}",
                l.threshold
            )));
        }
        if !(0.0..=1.0).contains(&l.alpha) {
            return Err(ConfigError::Invalid(format!("alpha must be in [0, 1], got {}", l.alpha)));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.fallback_shape.0 == 0 || self.fallback_shape.1 == 0 {
            return Err(ConfigError::Invalid("fallback_shape must be non-empty".into()));
        }
        let l = &self.layout;
        for (field, value) in [
            ("reference_dir", &l.reference_dir),
            ("annotation_dir", &l.annotation_dir),
            ("visual_dir", &l.visual_dir),
            ("output_dir", &l.output_dir),
            ("mask_subdir", &l.mask_subdir),
            ("soft_label_subdir", &l.soft_label_subdir),
            ("vis_subdir", &l.vis_subdir),
            ("reference_ext", &l.reference_ext),
            ("image_ext", &l.image_ext),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("layout.{field} must be non-empty")));
            }
        }
        let ann = &l.annotation_ext;
        if ann.is_empty() || ann == &self.layout.reference_ext || ann == &self.layout.image_ext {
            return Err(ConfigError::Invalid(format!(
                "annotation_ext {ann:?} must be non-empty and differ from output extensions"
            )));
        }
        if self.countries.iter().any(|c| c.name.is_empty()) {
            return Err(ConfigError::Invalid("country names must be non-empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_the_default_config() {
        let cfg: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.countries.len(), 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{"label": {"sigma": 8.0}, "countries": ["AOI_9_Test"]}"#,
        )
        .unwrap();
        assert_eq!(cfg.label.sigma, 8.0);
        assert_eq!(cfg.label.threshold, 0.76);
        assert_eq!(cfg.countries, vec![CountrySpec::new("AOI_9_Test")]);
        assert_eq!(cfg.layout.reference_dir, "PS-RGB");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        cfg.label.sigma = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.label.threshold = 1.5;
        assert!(cfg.validate().is_err());

        let cfg = PipelineConfig {
            workers: Some(0),
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.layout.annotation_ext = "png".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_empty_layout_names() {
        let mut cfg = PipelineConfig::default();
        cfg.layout.annotation_dir.clear();
        assert!(cfg.validate().is_err());

        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"layout": {"reference_dir": ""}}"#).unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("reference_dir"), "{err}");

        let mut cfg = PipelineConfig::default();
        cfg.layout.vis_subdir.clear();
        assert!(cfg.validate().is_err());
    }
}
