use std::collections::HashMap;
use std::fs;
use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub type AoiId = String;

/// A named area of interest. The id keys the AOI's ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    pub id: AoiId,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl Aoi {
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        let name = name.into();
        Self {
            id: snake_case_name(&name),
            name,
            geometry,
        }
    }
}

#[derive(Debug, Error)]
pub enum AoiError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("feature {index}: {reason}")]
    InvalidFeature { index: usize, reason: String },
    #[error("features {first} and {index} both map to AOI id '{id}'")]
    DuplicateId {
        id: AoiId,
        first: usize,
        index: usize,
    },
}

/// Lowercases `name` and maps every non-alphanumeric character to `_`, so the
/// id is always a single path component.
pub fn snake_case_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Debug, Deserialize)]
struct FeatureCollectionDoc {
    features: Vec<FeatureDoc>,
}

#[derive(Debug, Deserialize)]
struct FeatureDoc {
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
    geometry: GeometryDoc,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeometryDoc {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
}

/// Splits a GeoJSON FeatureCollection into one AOI per feature, named by
/// `name_property`.
pub fn load_aois(path: impl AsRef<Path>, name_property: &str) -> Result<Vec<Aoi>, AoiError> {
    let raw = fs::read_to_string(path)?;
    parse_aois(&raw, name_property)
}

pub fn parse_aois(raw: &str, name_property: &str) -> Result<Vec<Aoi>, AoiError> {
    let collection: FeatureCollectionDoc = serde_json::from_str(raw)?;

    let aois: Vec<Aoi> = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let invalid = |reason: String| AoiError::InvalidFeature { index, reason };

            let name = feature
                .properties
                .as_ref()
                .and_then(|properties| properties.get(name_property))
                .and_then(property_as_name)
                .ok_or_else(|| invalid(format!("missing name property '{name_property}'")))?;

            let geometry = match feature.geometry {
                GeometryDoc::Polygon { coordinates } => {
                    MultiPolygon::new(vec![polygon(coordinates).map_err(invalid)?])
                }
                GeometryDoc::MultiPolygon { coordinates } => MultiPolygon::new(
                    coordinates
                        .into_iter()
                        .map(polygon)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(invalid)?,
                ),
            };

            Ok(Aoi::new(name, geometry))
        })
        .collect::<Result<_, AoiError>>()?;

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (index, aoi) in aois.iter().enumerate() {
        if let Some(&first) = seen.get(aoi.id.as_str()) {
            return Err(AoiError::DuplicateId {
                id: aoi.id.clone(),
                first,
                index,
            });
        }
        seen.insert(&aoi.id, index);
    }
    Ok(aois)
}

fn property_as_name(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn polygon(rings: Vec<Vec<Vec<f64>>>) -> Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter().map(ring);
    let exterior = rings
        .next()
        .ok_or_else(|| "polygon has no exterior ring".to_owned())??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring(positions: Vec<Vec<f64>>) -> Result<LineString<f64>, String> {
    if positions.len() < 3 {
        return Err(format!("ring has {} positions, expected at least 3", positions.len()));
    }

    positions
        .into_iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err("position needs at least two coordinates".to_owned()),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}
