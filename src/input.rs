//! Coordinate input formats
//!
//! Free-form text typed by the user and GeoJSON route files both end up as an
//! ordered list of [`Coordinate`]s. Text input is `lat,lng` ordered; GeoJSON
//! positions are `[lng, lat]` ordered and are swapped on the way in.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::{
    error::{Result, RideError},
    types::Coordinate,
};

/// Parse user input into coordinates
///
/// Supported formats:
///
/// 1. `lat,lng`, e.g. `25.033,121.564`
/// 2. `[lat,lng]`, e.g. `[25.033,121.564]`
/// 3. `[[lat,lng], ...]`, e.g. `[[25.033,121.564], [24.137,120.686]]`
///
/// # Errors
///
/// Returns [`RideError::Parse`] for malformed input and
/// [`RideError::InvalidArgument`] for out-of-range coordinates.
pub fn parse_coordinates(input: &str) -> Result<Vec<Coordinate>> {
    let input = input.trim();

    if input.starts_with('[') {
        parse_json_format(input)
    } else {
        parse_simple_format(input).map(|coord| vec![coord])
    }
}

fn parse_json_format(input: &str) -> Result<Vec<Coordinate>> {
    if let Ok(pairs) = serde_json::from_str::<Vec<Vec<f64>>>(input) {
        if pairs.is_empty() {
            return Err(RideError::Parse("coordinate list is empty".to_string()));
        }
        return pairs
            .iter()
            .enumerate()
            .map(|(i, pair)| match pair.as_slice() {
                [lat, lng] => Coordinate::try_new(*lat, *lng),
                _ => Err(RideError::Parse(format!(
                    "invalid coordinate format at index {i}: expected [lat,lng]"
                ))),
            })
            .collect();
    }

    if let Ok(single) = serde_json::from_str::<Vec<f64>>(input) {
        return match single.as_slice() {
            [lat, lng] => Ok(vec![Coordinate::try_new(*lat, *lng)?]),
            _ => Err(RideError::Parse(
                "invalid coordinate format: expected [lat,lng]".to_string(),
            )),
        };
    }

    Err(RideError::Parse("invalid JSON format".to_string()))
}

fn parse_simple_format(input: &str) -> Result<Coordinate> {
    let parts: Vec<&str> = input.split(',').collect();
    let [lat, lng] = parts.as_slice() else {
        return Err(RideError::Parse(
            "invalid format: expected 'lat,lng'".to_string(),
        ));
    };

    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| RideError::Parse(format!("invalid latitude: {e}")))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|e| RideError::Parse(format!("invalid longitude: {e}")))?;

    Coordinate::try_new(lat, lng)
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type", default)]
    kind: String,
    coordinates: Vec<Value>,
}

/// Accepted top-level GeoJSON shapes
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document {
    FeatureCollection { features: Vec<Feature> },
    Feature(Feature),
    Geometry(Geometry),
}

/// Read a route from a GeoJSON file
///
/// # Errors
///
/// Returns [`RideError::Io`] if the file cannot be read, plus every error
/// [`parse_geojson`] can return.
pub async fn load_geojson(path: impl AsRef<Path>) -> Result<Vec<Coordinate>> {
    let path = path.as_ref();
    debug!("Reading GeoJSON route from {}", path.display());
    let data = tokio::fs::read_to_string(path).await?;
    parse_geojson(&data)
}

/// Extract a route from GeoJSON text
///
/// Accepts a `Feature`, a bare geometry, or a `FeatureCollection` (its first
/// feature is used). Entries of `coordinates` that are not `[lng, lat, ...]`
/// positions are skipped. A `Point` geometry yields a single coordinate.
///
/// # Errors
///
/// Returns [`RideError::Json`] for invalid JSON, [`RideError::Parse`] when no
/// coordinates are found, and [`RideError::InvalidArgument`] for out-of-range
/// positions.
pub fn parse_geojson(data: &str) -> Result<Vec<Coordinate>> {
    let geometry = match serde_json::from_str::<Document>(data)? {
        Document::FeatureCollection { features } => {
            if features.len() > 1 {
                warn!(
                    "GeoJSON has {} features, using the first one",
                    features.len()
                );
            }
            features
                .into_iter()
                .next()
                .ok_or_else(|| RideError::Parse("feature collection is empty".to_string()))?
                .geometry
        }
        Document::Feature(feature) => feature.geometry,
        Document::Geometry(geometry) => geometry,
    };

    if geometry.coordinates.is_empty() {
        return Err(RideError::Parse("no coordinates found".to_string()));
    }

    let coordinates = match position(&geometry.coordinates) {
        Some(point) => vec![point],
        None => geometry
            .coordinates
            .iter()
            .filter_map(|value| value.as_array().and_then(|array| position(array)))
            .collect(),
    };

    if coordinates.is_empty() {
        return Err(RideError::Parse(format!(
            "no usable positions in {} geometry",
            geometry.kind
        )));
    }

    coordinates
        .into_iter()
        .map(|coord| Coordinate::try_new(coord.lat, coord.lng))
        .collect()
}

/// Interpret `[lng, lat, ...]` as a coordinate
fn position(values: &[Value]) -> Option<Coordinate> {
    match values {
        [lng, lat, ..] => Some(Coordinate::new(lat.as_f64()?, lng.as_f64()?)),
        _ => None,
    }
}
