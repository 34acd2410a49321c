//! Loading networks from GeoJSON, and the candidate acquisition seam.

use crate::error::{DeviationError, Result};
use crate::geometry;
use crate::progress::Dataset;
use crate::store::{Attributes, FeatureIdSequence, LineCollection, LineFeature, Relation};
use crate::validation;
use geo_types::{Coord, LineString};
use geojson::{GeoJson, Geometry, Value};
use log::{debug, info};
use rstar::{AABB, Envelope};
use std::fs;
use std::path::Path;

/// Attribute carrying the category tag that candidate filtering looks at.
pub const DEFAULT_CATEGORY_KEY: &str = "highway";

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| DeviationError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn to_line(dataset: Dataset, points: &[Vec<f64>]) -> Result<LineString<f64>> {
    let mut coords = Vec::with_capacity(points.len());
    for p in points {
        let (Some(&x), Some(&y)) = (p.first(), p.get(1)) else {
            return Err(DeviationError::invalid_input(
                dataset.to_string(),
                "position with fewer than two ordinates",
            ));
        };
        coords.push(Coord { x, y });
    }
    Ok(LineString::new(coords))
}

fn geometry_parts(dataset: Dataset, geometry: &Geometry) -> Result<Vec<LineString<f64>>> {
    match &geometry.value {
        Value::LineString(points) => Ok(vec![to_line(dataset, points)?]),
        Value::MultiLineString(lines) => lines.iter().map(|l| to_line(dataset, l)).collect(),
        Value::GeometryCollection(_) => Err(DeviationError::invalid_input(
            dataset.to_string(),
            "geometry collections (multi-layer input) are not supported",
        )),
        Value::Point(_) | Value::MultiPoint(_) => Err(DeviationError::invalid_input(
            dataset.to_string(),
            "point geometries are not supported",
        )),
        Value::Polygon(_) | Value::MultiPolygon(_) => Err(DeviationError::invalid_input(
            dataset.to_string(),
            "polygon geometries are not supported",
        )),
    }
}

/// Parse a GeoJSON document into a validated line collection. Multi-part lines
/// are exploded into one feature per part, each with a fresh id and the
/// properties of its parent.
pub fn read_lines(dataset: Dataset, raw: &str) -> Result<LineCollection> {
    let parsed: GeoJson = raw.parse()?;
    let mut items: Vec<(Geometry, Attributes)> = Vec::new();

    match parsed {
        GeoJson::FeatureCollection(collection) => {
            for feature in collection.features {
                let Some(geometry) = feature.geometry else {
                    return Err(DeviationError::invalid_input(dataset.to_string(), "feature without geometry"));
                };
                let attrs: Attributes = feature.properties.unwrap_or_default().into_iter().collect();
                items.push((geometry, attrs));
            }
        }
        GeoJson::Feature(feature) => {
            let Some(geometry) = feature.geometry else {
                return Err(DeviationError::invalid_input(dataset.to_string(), "feature without geometry"));
            };
            let attrs: Attributes = feature.properties.unwrap_or_default().into_iter().collect();
            items.push((geometry, attrs));
        }
        GeoJson::Geometry(geometry) => items.push((geometry, Attributes::new())),
    }

    let mut ids = FeatureIdSequence::default();
    let mut features = Vec::new();
    for (geometry, attrs) in items {
        for part in geometry_parts(dataset, &geometry)? {
            features.push(LineFeature::new(ids.next_id(), part, attrs.clone()));
        }
    }

    let lines = LineCollection::new(features);
    validation::validate_network(dataset, &lines)?;
    info!("Read {} {} line features", lines.len(), dataset);
    Ok(lines)
}

pub fn read_lines_file(dataset: Dataset, path: &Path) -> Result<LineCollection> {
    read_lines(dataset, &read_file(path)?)
}

/// Relations are stored as a plain JSON array.
pub fn read_relations(raw: &str) -> Result<Vec<Relation>> {
    let mut relations: Vec<Relation> = serde_json::from_str(raw)?;
    relations.sort_by_key(|r| r.id);
    Ok(relations)
}

pub fn read_relations_file(path: &Path) -> Result<Vec<Relation>> {
    read_relations(&read_file(path)?)
}

/// Region the candidate network is fetched for: the reference extent grown by
/// the search radius.
pub fn query_region(reference: &LineCollection, search_radius: f64) -> Option<AABB<[f64; 2]>> {
    let coords: Vec<Coord<f64>> = reference.iter().flat_map(|f| f.coords().iter().copied()).collect();
    if coords.is_empty() {
        return None;
    }
    let bbox = geometry::envelope(&coords);
    let [lx, ly] = bbox.lower();
    let [ux, uy] = bbox.upper();
    Some(AABB::from_corners(
        [lx - search_radius, ly - search_radius],
        [ux + search_radius, uy + search_radius],
    ))
}

/// Where candidate networks come from.
pub trait CandidateSource {
    /// Candidate lines intersecting `region`, minus those whose category is in `excluded`.
    fn candidates(&self, region: &AABB<[f64; 2]>, excluded: &[String]) -> Result<LineCollection>;
}

/// Candidate source backed by an already loaded GeoJSON network.
pub struct GeoJsonCandidateSource {
    lines: LineCollection,
    category_key: String,
}

impl GeoJsonCandidateSource {
    pub fn new(lines: LineCollection, category_key: impl Into<String>) -> Self {
        Self {
            lines,
            category_key: category_key.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(
            read_lines_file(Dataset::Candidate, path)?,
            DEFAULT_CATEGORY_KEY,
        ))
    }
}

impl CandidateSource for GeoJsonCandidateSource {
    fn candidates(&self, region: &AABB<[f64; 2]>, excluded: &[String]) -> Result<LineCollection> {
        let kept: LineCollection = self
            .lines
            .iter()
            .filter(|f| geometry::envelope(f.coords()).intersects(region))
            .filter(|f| {
                let category = f.text_attribute(&self.category_key);
                let drop = category.is_some_and(|c| excluded.iter().any(|e| e == c));
                if drop {
                    debug!("Excluding {} ({}={:?})", f.id, self.category_key, category);
                }
                !drop
            })
            .cloned()
            .collect();

        if kept.is_empty() {
            return Err(DeviationError::invalid_input(
                Dataset::Candidate.to_string(),
                "no candidate lines in the query region",
            ));
        }
        info!("Candidate source returned {} of {} lines", kept.len(), self.lines.len());
        Ok(kept)
    }
}
