use super::cutpoints::Cutpoint;
use super::junctions::JUNCTION_TOLERANCE;
use crate::geometry::{self, Cut};
use crate::store::{FeatureId, LineCollection};
use log::info;
use std::collections::BTreeMap;

/// Cut every line at its cutpoints. Lines without cutpoints pass through as a
/// single piece; coincident cutpoints collapse into one cut.
pub fn resegment(lines: &LineCollection, cutpoints: &[Cutpoint]) -> LineCollection {
    let mut per_line: BTreeMap<FeatureId, Vec<&Cutpoint>> = BTreeMap::new();
    for cut in cutpoints {
        per_line.entry(cut.parent_line).or_default().push(cut);
    }

    let mut pieces = Vec::with_capacity(lines.len() + cutpoints.len());
    for feature in lines.iter() {
        let mut cuts: Vec<Cut> = Vec::new();
        if let Some(line_cuts) = per_line.get_mut(&feature.id) {
            line_cuts.sort_by(|a, b| a.locus.total_cmp(&b.locus));
            for cp in line_cuts.iter() {
                let duplicate = cuts
                    .last()
                    .is_some_and(|prev| geometry::distance(prev.point, cp.geometry) <= JUNCTION_TOLERANCE);
                if !duplicate {
                    cuts.push(Cut {
                        segment: cp.segment,
                        fraction: cp.fraction,
                        point: cp.geometry,
                    });
                }
            }
        }
        for coords in geometry::split_polyline(feature.coords(), &cuts) {
            pieces.push(feature.piece(coords));
        }
    }

    let out = LineCollection::from_pieces(pieces);
    info!(
        "Resegmented {} lines at {} cutpoints into {} segments",
        lines.len(),
        cutpoints.len(),
        out.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Attributes, LineFeature};
    use geo_types::{Coord, LineString};

    fn cutpoint(parent: u64, locus: f64, at: (f64, f64), segment: usize, fraction: f64) -> Cutpoint {
        Cutpoint {
            id: 0,
            parent_line: FeatureId(parent),
            source_point: crate::harmonize::junctions::JunctionPointId(0),
            source_line: FeatureId(99),
            locus,
            geometry: Coord { x: at.0, y: at.1 },
            segment,
            fraction,
            azimuth: None,
            distance: 0.0,
            is_curved: false,
        }
    }

    #[test]
    fn test_resegment_preserves_lineage_and_length() {
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), serde_json::json!("High Road"));
        let lines = LineCollection::new(vec![
            LineFeature::new(FeatureId(1), LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]), attrs),
            LineFeature::new(FeatureId(2), LineString::from(vec![(0.0, 5.0), (5.0, 5.0)]), Attributes::new()),
        ]);
        let cuts = vec![
            cutpoint(1, 0.75, (10.0, 5.0), 1, 0.5),
            cutpoint(1, 0.25, (5.0, 0.0), 0, 0.5),
            // same spot reached from another source point
            cutpoint(1, 0.25, (5.0, 0.0), 0, 0.5),
        ];
        let out = resegment(&lines, &cuts);
        assert_eq!(out.len(), 4);

        let first: Vec<_> = out.iter().filter(|f| f.lineage.source_id == FeatureId(1)).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].end(), Some(Coord { x: 5.0, y: 0.0 }));
        assert_eq!(first[1].coords().len(), 3, "middle piece keeps the corner vertex");
        assert_eq!(first[2].lineage.sub_index, 3);
        assert!(first.iter().all(|f| f.text_attribute("name") == Some("High Road")));

        let by_source = out.length_by_source();
        assert!((by_source[&FeatureId(1)] - 20.0).abs() < 1e-9);
        assert!((by_source[&FeatureId(2)] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_uncut_lines_pass_through() {
        let lines = LineCollection::new(vec![LineFeature::new(
            FeatureId(4),
            LineString::from(vec![(0.0, 0.0), (3.0, 4.0)]),
            Attributes::new(),
        )]);
        let out = resegment(&lines, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out.features()[0].coords(), lines.features()[0].coords());
        assert_eq!(out.features()[0].lineage.sub_index, 1);
        assert!(out.features()[0].direction.is_some());
    }
}
