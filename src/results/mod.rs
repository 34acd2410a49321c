//! Result layers derived from the harmonized networks and the match results.
//!
//! Everything here is a pure function of its inputs; the job decides which
//! layers to build from [`ResultOptions`] and publishes them.

pub mod grid;

pub use grid::{Grid, GridCell, clip_segment, completeness_grid, matching_rate_grid, max_deviation_grid};

use crate::config::ResultOptions;
use crate::geometry;
use crate::matching::MatchResult;
use crate::store::{FeatureId, LineCollection};
use geo::{Distance, Haversine};
use geo_types::{Coord, Point};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A deviation vector from a reference segment to its matched candidate segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationSegment {
    pub start: Coord<f64>,
    pub end: Coord<f64>,
    pub length: f64,
    pub reference: u64,
    pub candidate: u64,
}

/// Optional layers; `None` means the layer was not requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultLayers {
    pub deviation_vectors: Option<Vec<DeviationSegment>>,
    pub matched_reference: Option<LineCollection>,
    pub matched_candidate: Option<LineCollection>,
    pub unmatched_reference: Option<LineCollection>,
    pub unmatched_candidate: Option<LineCollection>,
    pub name_agreement: Option<Vec<MatchResult>>,
    pub name_disagreement: Option<Vec<MatchResult>>,
    pub max_deviation_grid: Option<Vec<GridCell>>,
    pub matching_rate_grid: Option<Vec<GridCell>>,
    pub completeness_grid: Option<Vec<GridCell>>,
}

/// Lines from the matched candidate segment to sample points along each
/// matched reference segment.
pub fn deviation_vectors(
    reference: &LineCollection,
    candidate: &LineCollection,
    matches: &[MatchResult],
    interval: f64,
    geographic: bool,
) -> Vec<DeviationSegment> {
    let mut out = Vec::new();
    for m in matches {
        let (Some(r), Some(c)) = (reference.get(m.ref_id), candidate.get(m.cand_id)) else {
            continue;
        };
        for sample in geometry::densify(r.coords(), interval) {
            let Some(proj) = geometry::project(sample, c.coords()) else {
                continue;
            };
            let length = if geographic {
                Haversine.distance(Point::from(proj.point), Point::from(sample))
            } else {
                proj.distance
            };
            out.push(DeviationSegment {
                start: proj.point,
                end: sample,
                length,
                reference: m.ref_id.0,
                candidate: m.cand_id.0,
            });
        }
    }
    out
}

/// Features whose id is (or is not) in `ids` and that are longer than `min_length`.
pub fn subset(lines: &LineCollection, ids: &BTreeSet<FeatureId>, matched: bool, min_length: f64) -> LineCollection {
    lines
        .iter()
        .filter(|f| ids.contains(&f.id) == matched && f.length() > min_length)
        .cloned()
        .collect()
}

/// Matches with both names present whose name distance is below `threshold`.
pub fn name_agreement(matches: &[MatchResult], threshold: usize) -> Vec<MatchResult> {
    named_matches(matches, |d| d < threshold)
}

/// Matches with both names present whose name distance is above `threshold`.
pub fn name_disagreement(matches: &[MatchResult], threshold: usize) -> Vec<MatchResult> {
    named_matches(matches, |d| d > threshold)
}

fn named_matches(matches: &[MatchResult], keep: impl Fn(usize) -> bool) -> Vec<MatchResult> {
    matches
        .iter()
        .filter(|m| m.ref_name.is_some() && m.cand_name.is_some())
        .filter(|m| m.name_similarity.is_some_and(&keep))
        .cloned()
        .collect()
}

pub fn build_results(
    reference: &LineCollection,
    candidate: &LineCollection,
    matches: &[MatchResult],
    options: &ResultOptions,
    geographic: bool,
) -> ResultLayers {
    let mut layers = ResultLayers::default();
    let matched_ref: BTreeSet<FeatureId> = matches.iter().map(|m| m.ref_id).collect();
    let matched_cand: BTreeSet<FeatureId> = matches.iter().map(|m| m.cand_id).collect();

    let vectors = if options.deviation_vectors || options.max_deviation_grid {
        Some(deviation_vectors(
            reference,
            candidate,
            matches,
            options.deviation_vector_interval,
            geographic,
        ))
    } else {
        None
    };

    if options.matched_reference {
        layers.matched_reference = Some(subset(reference, &matched_ref, true, options.matched_reference_min_length));
    }
    if options.matched_candidate {
        layers.matched_candidate = Some(subset(candidate, &matched_cand, true, options.matched_candidate_min_length));
    }
    if options.unmatched_reference {
        layers.unmatched_reference =
            Some(subset(reference, &matched_ref, false, options.unmatched_reference_min_length));
    }
    if options.unmatched_candidate {
        layers.unmatched_candidate =
            Some(subset(candidate, &matched_cand, false, options.unmatched_candidate_min_length));
    }
    if let Some(threshold) = options.min_levenshtein {
        layers.name_agreement = Some(name_agreement(matches, threshold));
    }
    if let Some(threshold) = options.max_levenshtein {
        layers.name_disagreement = Some(name_disagreement(matches, threshold));
    }

    let grid = if options.max_deviation_grid || options.matching_rate_grid || options.completeness_grid {
        let grid = Grid::for_lines(reference, options.grid_cell_size);
        if grid.is_none() && !reference.is_empty() {
            warn!(
                "Skipping grid layers: cell size {} is too small for the reference extent",
                options.grid_cell_size
            );
        }
        grid
    } else {
        None
    };
    if let Some(grid) = &grid {
        if options.max_deviation_grid {
            let empty = Vec::new();
            let v = vectors.as_ref().unwrap_or(&empty);
            layers.max_deviation_grid = Some(max_deviation_grid(grid, v));
        }
        if options.matching_rate_grid {
            layers.matching_rate_grid = Some(matching_rate_grid(grid, reference, |f| matched_ref.contains(&f.id)));
        }
        if options.completeness_grid {
            layers.completeness_grid = Some(completeness_grid(grid, reference, candidate));
        }
    }

    if options.deviation_vectors {
        layers.deviation_vectors = vectors;
    }

    info!(
        "Built result layers for {} matches ({} reference, {} candidate segments)",
        matches.len(),
        reference.len(),
        candidate.len()
    );
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Attributes, LineFeature};
    use geo_types::LineString;

    fn lines(items: Vec<(u64, Vec<(f64, f64)>)>) -> LineCollection {
        LineCollection::new(
            items
                .into_iter()
                .map(|(id, coords)| LineFeature::new(FeatureId(id), LineString::from(coords), Attributes::new()))
                .collect(),
        )
    }

    fn matched(ref_id: u64, cand_id: u64, names: Option<(&str, &str, usize)>) -> MatchResult {
        MatchResult {
            ref_id: FeatureId(ref_id),
            cand_id: FeatureId(cand_id),
            ref_source_id: FeatureId(ref_id),
            cand_source_id: FeatureId(cand_id),
            fit: 0.4,
            deviation: 0.1,
            positional_deviation: 0.5,
            length_diff: 0.0,
            ref_name: names.map(|n| n.0.to_string()),
            cand_name: names.map(|n| n.1.to_string()),
            relation_name: None,
            name_similarity: names.map(|n| n.2),
            relation_name_similarity: None,
        }
    }

    #[test]
    fn test_deviation_vectors_run_from_candidate_to_reference() {
        let reference = lines(vec![(1, vec![(0.0, 0.0), (2.0, 0.0)])]);
        let candidate = lines(vec![(5, vec![(0.0, 0.5), (2.0, 0.5)])]);
        let vectors = deviation_vectors(&reference, &candidate, &[matched(1, 5, None)], 1.0, false);
        assert_eq!(vectors.len(), 3);
        for v in &vectors {
            assert!((v.start.y - 0.5).abs() < 1e-12);
            assert!(v.end.y.abs() < 1e-12);
            assert!((v.length - 0.5).abs() < 1e-12);
            assert_eq!((v.reference, v.candidate), (1, 5));
        }
    }

    #[test]
    fn test_matched_and_unmatched_subsets() {
        let reference = lines(vec![
            (1, vec![(0.0, 0.0), (2.0, 0.0)]),
            (2, vec![(0.0, 1.0), (2.0, 1.0)]),
            (3, vec![(0.0, 2.0), (0.000001, 2.0)]),
        ]);
        let candidate = lines(vec![(1, vec![(0.0, 0.1), (2.0, 0.1)])]);
        let options = ResultOptions {
            matched_reference: true,
            unmatched_reference: true,
            unmatched_candidate: true,
            ..ResultOptions::default()
        };
        let layers = build_results(&reference, &candidate, &[matched(1, 1, None)], &options, false);
        let matched_ids: Vec<u64> = layers.matched_reference.unwrap().iter().map(|f| f.id.0).collect();
        assert_eq!(matched_ids, vec![1]);
        let unmatched_ids: Vec<u64> = layers.unmatched_reference.unwrap().iter().map(|f| f.id.0).collect();
        assert_eq!(unmatched_ids, vec![2], "the tiny line is below the minimum length");
        assert!(layers.unmatched_candidate.unwrap().is_empty());
        assert!(layers.matched_candidate.is_none());
        assert!(layers.deviation_vectors.is_none());
    }

    #[test]
    fn test_name_subsets() {
        let matches = vec![
            matched(1, 1, Some(("Main Street", "Main Street", 0))),
            matched(2, 2, Some(("Main Street", "Elm Road", 9))),
            matched(3, 3, None),
        ];
        let agree: Vec<u64> = name_agreement(&matches, 3).iter().map(|m| m.ref_id.0).collect();
        let disagree: Vec<u64> = name_disagreement(&matches, 3).iter().map(|m| m.ref_id.0).collect();
        assert_eq!(agree, vec![1]);
        assert_eq!(disagree, vec![2]);
    }
}
