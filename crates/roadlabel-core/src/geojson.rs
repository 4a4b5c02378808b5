//! Road centerlines from GeoJSON.
//!
//! Accepts a `FeatureCollection`, a single `Feature`, or a bare geometry.
//! `LineString` and `MultiLineString` geometries are returned as polylines;
//! everything else (points, polygons, null geometry) is ignored. Positions may
//! carry extra ordinates (z, m), which are dropped.
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoJsonError {
    #[error("cannot read annotation: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed GeoJSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("position with fewer than two ordinates")]
    ShortPosition,
}

/// One polyline in world coordinates, as (x, y) = (lon, lat) pairs.
pub type Polyline = Vec<(f64, f64)>;

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    LineString { coordinates: Vec<Vec<f64>> },
    MultiLineString { coordinates: Vec<Vec<Vec<f64>>> },
    GeometryCollection { geometries: Vec<Geometry> },
    #[serde(other)]
    Other,
}

fn to_polyline(coords: Vec<Vec<f64>>) -> Result<Polyline, GeoJsonError> {
    coords
        .into_iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok((*x, *y)),
            _ => Err(GeoJsonError::ShortPosition),
        })
        .collect()
}

fn collect(geometry: Geometry, out: &mut Vec<Polyline>) -> Result<(), GeoJsonError> {
    match geometry {
        Geometry::LineString { coordinates } => out.push(to_polyline(coordinates)?),
        Geometry::MultiLineString { coordinates } => {
            for line in coordinates {
                out.push(to_polyline(line)?);
            }
        }
        Geometry::GeometryCollection { geometries } => {
            for g in geometries {
                collect(g, out)?;
            }
        }
        Geometry::Other => {}
    }
    Ok(())
}

/// Parse GeoJSON text into polylines. Empty lines are dropped; a
/// single-position line is kept and burns one pixel.
pub fn parse_lines(text: &str) -> Result<Vec<Polyline>, GeoJsonError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default().to_owned();
    let mut lines = Vec::new();
    match kind.as_str() {
        "FeatureCollection" => {
            let fc: FeatureCollection = serde_json::from_value(value)?;
            for g in fc.features.into_iter().filter_map(|f| f.geometry) {
                collect(g, &mut lines)?;
            }
        }
        "Feature" => {
            let f: Feature = serde_json::from_value(value)?;
            if let Some(g) = f.geometry {
                collect(g, &mut lines)?;
            }
        }
        _ => collect(serde_json::from_value(value)?, &mut lines)?,
    }
    lines.retain(|l| !l.is_empty());
    Ok(lines)
}

pub fn read_lines(path: &Path) -> Result<Vec<Polyline>, GeoJsonError> {
    parse_lines(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_collection_with_mixed_geometries() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"road_type": 5},
                 "geometry": {"type": "LineString", "coordinates": [[1.0, 2.0, 0.0], [3.0, 4.0, 0.0]]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "MultiLineString", "coordinates": [[[0, 0], [1, 1]], [[5, 5], [6, 6], [7, 7]]]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Point", "coordinates": [9, 9]}},
                {"type": "Feature", "properties": {}, "geometry": null}
            ]
        }"#;
        let lines = parse_lines(text).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], vec![(1.0, 2.0), (3.0, 4.0)]);
        assert_eq!(lines[2].len(), 3);
    }

    #[test]
    fn empty_collection_has_no_lines() {
        let text = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(parse_lines(text).unwrap().is_empty());
    }

    #[test]
    fn bare_geometry_is_accepted() {
        let text = r#"{"type": "LineString", "coordinates": [[0, 0], [2, 0]]}"#;
        assert_eq!(parse_lines(text).unwrap(), vec![vec![(0.0, 0.0), (2.0, 0.0)]]);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(parse_lines("{ nope"), Err(GeoJsonError::Parse(_))));
    }

    #[test]
    fn one_dimensional_position_is_rejected() {
        let text = r#"{"type": "LineString", "coordinates": [[0], [2, 0]]}"#;
        assert!(matches!(parse_lines(text), Err(GeoJsonError::ShortPosition)));
    }
}
