//! Road label synthesis for SpaceNet-style imagery datasets.
//!
//! Vector road centerlines are burned into a raster mask, turned into a
//! Euclidean distance field, and mapped through a gaussian falloff to give a
//! soft training label. A thresholded copy of that label is blended onto the
//! 8-bit imagery for visual QA.
pub mod config;
pub mod distance;
pub mod geojson;
pub mod geotiff;
pub mod grid;
pub mod labels;
pub mod overlay;
pub mod paths;
pub mod pipeline;
pub mod rasterize;

pub use config::{CountrySpec, DatasetLayout, LabelParams, PipelineConfig};
pub use distance::distance_field;
pub use grid::{BinaryMask, DistanceField, Grid, HardLabel, SoftLabel};
pub use labels::{gaussian_label, hard_label};
pub use overlay::{overlay, Palette};
pub use pipeline::{
    CancelToken, CountryReport, CountryStatus, Pipeline, ProgressObserver, RunReport, TileOutcome,
};
pub use rasterize::{LineRasterizer, RasterizeError, Rasterizer};
