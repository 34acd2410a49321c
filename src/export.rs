//! GeoJSON rendering of stored collections.

use crate::error::{DeviationError, Result};
use crate::harmonize::JunctionOffset;
use crate::matching::MatchResult;
use crate::results::{DeviationSegment, GridCell};
use crate::store::{LineCollection, LineFeature, StoredCollection};
use geo_types::Coord;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use std::fs;
use std::path::Path;

fn position(c: Coord<f64>) -> Vec<f64> {
    vec![c.x, c.y]
}

fn feature(value: geojson::Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry {
            bbox: None,
            value,
            foreign_members: None,
        }),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn line_value(line: &LineFeature) -> geojson::Value {
    geojson::Value::LineString(line.coords().iter().copied().map(position).collect())
}

pub fn lines_to_geojson(lines: &LineCollection) -> FeatureCollection {
    let features = lines
        .iter()
        .map(|line| {
            let mut properties: JsonObject = line.attributes.clone().into_iter().collect();
            properties.insert(String::from("id"), JsonValue::from(line.id.0));
            properties.insert(String::from("source_id"), JsonValue::from(line.lineage.source_id.0));
            properties.insert(String::from("sub_index"), JsonValue::from(line.lineage.sub_index));
            if let Some(direction) = line.direction {
                properties.insert(String::from("direction"), JsonValue::from(direction));
            }
            feature(line_value(line), properties)
        })
        .collect();
    collection(features)
}

/// Matches drawn with the geometry of their reference segment.
pub fn matches_to_geojson(matches: &[MatchResult], reference: &LineCollection) -> Result<FeatureCollection> {
    let mut features = Vec::with_capacity(matches.len());
    for m in matches {
        let Some(line) = reference.get(m.ref_id) else {
            continue;
        };
        let properties = match serde_json::to_value(m)? {
            JsonValue::Object(map) => map,
            _ => JsonObject::new(),
        };
        features.push(feature(line_value(line), properties));
    }
    Ok(collection(features))
}

pub fn segments_to_geojson(segments: &[DeviationSegment]) -> FeatureCollection {
    let features = segments
        .iter()
        .map(|s| {
            let mut properties = JsonObject::new();
            properties.insert(String::from("length"), JsonValue::from(s.length));
            properties.insert(String::from("reference"), JsonValue::from(s.reference));
            properties.insert(String::from("candidate"), JsonValue::from(s.candidate));
            feature(
                geojson::Value::LineString(vec![position(s.start), position(s.end)]),
                properties,
            )
        })
        .collect();
    collection(features)
}

pub fn junction_offsets_to_geojson(offsets: &[JunctionOffset]) -> FeatureCollection {
    let features = offsets
        .iter()
        .map(|o| {
            let mut properties = JsonObject::new();
            properties.insert(String::from("length"), JsonValue::from(o.length));
            properties.insert(String::from("reference_junction"), JsonValue::from(o.reference_junction.0));
            properties.insert(String::from("candidate_junction"), JsonValue::from(o.candidate_junction.0));
            feature(
                geojson::Value::LineString(vec![position(o.start), position(o.end)]),
                properties,
            )
        })
        .collect();
    collection(features)
}

pub fn grid_to_geojson(cells: &[GridCell]) -> FeatureCollection {
    let features = cells
        .iter()
        .map(|cell| {
            let ring = vec![
                vec![cell.min.x, cell.min.y],
                vec![cell.max.x, cell.min.y],
                vec![cell.max.x, cell.max.y],
                vec![cell.min.x, cell.max.y],
                vec![cell.min.x, cell.min.y],
            ];
            let mut properties = JsonObject::new();
            properties.insert(String::from("column"), JsonValue::from(cell.column));
            properties.insert(String::from("row"), JsonValue::from(cell.row));
            properties.insert(String::from("value"), JsonValue::from(cell.value));
            feature(geojson::Value::Polygon(vec![ring]), properties)
        })
        .collect();
    collection(features)
}

/// GeoJSON for any stored collection. Matches need the reference segments for
/// their geometry; relations have none and render as `None`.
pub fn stored_to_geojson(stored: &StoredCollection, reference: &LineCollection) -> Result<Option<FeatureCollection>> {
    Ok(match stored {
        StoredCollection::Lines(lines) => Some(lines_to_geojson(lines)),
        StoredCollection::Matches(matches) => Some(matches_to_geojson(matches, reference)?),
        StoredCollection::Segments(segments) => Some(segments_to_geojson(segments)),
        StoredCollection::JunctionOffsets(offsets) => Some(junction_offsets_to_geojson(offsets)),
        StoredCollection::Grid(cells) => Some(grid_to_geojson(cells)),
        StoredCollection::Relations(_) => None,
    })
}

pub fn write_geojson(path: &Path, features: FeatureCollection) -> Result<()> {
    let serialized = GeoJson::from(features).to_string();
    fs::write(path, serialized).map_err(|source| DeviationError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmonize::JunctionId;
    use crate::store::{Attributes, FeatureId};
    use geo_types::LineString;

    #[test]
    fn test_lines_carry_lineage_properties() {
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), serde_json::json!("Ring"));
        let lines = LineCollection::new(vec![LineFeature::new(
            FeatureId(3),
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
            attrs,
        )]);
        let fc = lines_to_geojson(&lines);
        assert_eq!(fc.features.len(), 1);
        let props = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(props["name"], serde_json::json!("Ring"));
        assert_eq!(props["source_id"], serde_json::json!(3));
        assert_eq!(props["sub_index"], serde_json::json!(1));
    }

    #[test]
    fn test_junction_offsets_use_junction_properties() {
        let offsets = vec![JunctionOffset {
            start: Coord { x: 0.0, y: 0.0 },
            end: Coord { x: 0.0, y: 3.0 },
            length: 3.0,
            reference_junction: JunctionId(4),
            candidate_junction: JunctionId(9),
        }];
        let fc = junction_offsets_to_geojson(&offsets);
        let props = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(props["reference_junction"], serde_json::json!(4));
        assert_eq!(props["candidate_junction"], serde_json::json!(9));
        assert!(!props.contains_key("reference"));
        assert!(!props.contains_key("candidate"));

        let stored = StoredCollection::JunctionOffsets(offsets);
        let rendered = stored_to_geojson(&stored, &LineCollection::default()).unwrap().unwrap();
        assert_eq!(rendered.features.len(), 1);
    }

    #[test]
    fn test_grid_cells_are_closed_polygons() {
        let cells = vec![GridCell {
            column: 0,
            row: 1,
            min: Coord { x: 0.0, y: 1.0 },
            max: Coord { x: 1.0, y: 2.0 },
            value: 0.5,
        }];
        let fc = grid_to_geojson(&cells);
        let Some(geometry) = &fc.features[0].geometry else {
            panic!("cell without geometry");
        };
        match &geometry.value {
            geojson::Value::Polygon(rings) => assert_eq!(rings[0].first(), rings[0].last()),
            other => panic!("unexpected geometry {other:?}"),
        }
    }
}
