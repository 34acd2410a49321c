use super::junctions::{JunctionId, JunctionPointId, JunctionSet};
use crate::config::HarmonizeOptions;
use crate::geometry;
use crate::store::PointIndex;
use geo_types::Coord;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A reference/candidate junction pair that survived matching.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionMatch {
    pub reference: JunctionId,
    pub candidate: JunctionId,
    pub distance: f64,
    /// Sub-point pairs backing the match.
    pub point_pairs: Vec<(JunctionPointId, JunctionPointId, f64)>,
    pub azimuth_term: f64,
    pub distance_term: f64,
    pub count_term: f64,
    pub junction_diff: f64,
}

/// Two-point line from a matched reference junction to its candidate junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionOffset {
    pub start: Coord<f64>,
    pub end: Coord<f64>,
    pub length: f64,
    pub reference_junction: JunctionId,
    pub candidate_junction: JunctionId,
}

/// Best sub-point correspondence between two junctions: per reference point the
/// closest-azimuth candidate point, then per candidate point the closest survivors.
fn point_correspondence(
    reference: &JunctionSet,
    a: JunctionId,
    candidate: &JunctionSet,
    b: JunctionId,
    tolerance: f64,
) -> Vec<(JunctionPointId, JunctionPointId, f64)> {
    let mut best_per_a: Vec<(JunctionPointId, JunctionPointId, f64)> = Vec::new();
    for &pa in &reference.junction(a).points {
        let Some(az_a) = reference.point(pa).azimuth else {
            continue;
        };
        let mut best: Option<(JunctionPointId, f64)> = None;
        for &pb in &candidate.junction(b).points {
            let Some(az_b) = candidate.point(pb).azimuth else {
                continue;
            };
            let diff = geometry::circular_diff(az_a, az_b);
            if diff >= tolerance {
                continue;
            }
            if best.is_none_or(|(_, d)| diff < d) {
                best = Some((pb, diff));
            }
        }
        if let Some((pb, diff)) = best {
            best_per_a.push((pa, pb, diff));
        }
    }

    let mut min_per_b: BTreeMap<JunctionPointId, f64> = BTreeMap::new();
    for &(_, pb, diff) in &best_per_a {
        let entry = min_per_b.entry(pb).or_insert(diff);
        if diff < *entry {
            *entry = diff;
        }
    }
    best_per_a.retain(|(_, pb, diff)| min_per_b.get(pb).is_some_and(|m| diff <= m));
    best_per_a
}

/// Keep, per key, only the single minimal pair; a tie at the minimum drops all
/// of that key's pairs.
fn resolve_ambiguity<K: Ord + Copy>(pairs: Vec<JunctionMatch>, key: impl Fn(&JunctionMatch) -> K) -> Vec<JunctionMatch> {
    let mut groups: BTreeMap<K, Vec<JunctionMatch>> = BTreeMap::new();
    for pair in pairs {
        groups.entry(key(&pair)).or_default().push(pair);
    }

    let mut out = Vec::new();
    for (_, mut group) in groups {
        if group.len() == 1 {
            out.append(&mut group);
            continue;
        }
        let min = group
            .iter()
            .map(|m| m.junction_diff)
            .fold(f64::INFINITY, f64::min);
        let at_min: Vec<JunctionMatch> = group.into_iter().filter(|m| m.junction_diff == min).collect();
        if at_min.len() == 1 {
            out.extend(at_min);
        } else {
            debug!("Discarding {} tied junction pairs", at_min.len());
        }
    }
    out
}

/// Match junctions across datasets and flag the points of matched junctions on
/// both sides.
pub fn match_junctions(
    reference: &mut JunctionSet,
    candidate: &mut JunctionSet,
    options: &HarmonizeOptions,
) -> Vec<JunctionMatch> {
    let radius = options.search_radius;
    let index = PointIndex::build(candidate.junctions.iter().map(|j| (j.geometry, j.id)));

    let mut pairs = Vec::new();
    for a in &reference.junctions {
        for b_id in index.within(a.geometry, radius) {
            let b = candidate.junction(b_id);
            let distance = geometry::distance(a.geometry, b.geometry);
            if distance >= radius {
                continue;
            }
            let point_pairs = point_correspondence(reference, a.id, candidate, b_id, options.azimuth_tolerance);
            if point_pairs.is_empty() {
                continue;
            }

            let mean_az = point_pairs.iter().map(|p| p.2).sum::<f64>() / point_pairs.len() as f64;
            let azimuth_term = mean_az / options.max_azimuth_diff;
            let distance_term = distance / options.max_distance_diff;
            let count_term = a.incident_count.abs_diff(b.incident_count) as f64 / options.max_count_diff;
            if azimuth_term >= 1.0 || distance_term >= 1.0 || count_term >= 1.0 {
                continue;
            }

            pairs.push(JunctionMatch {
                reference: a.id,
                candidate: b_id,
                distance,
                point_pairs,
                azimuth_term,
                distance_term,
                count_term,
                junction_diff: (2.0 * azimuth_term + 3.0 * distance_term + count_term) / 6.0,
            });
        }
    }
    let potential = pairs.len();

    let pairs = resolve_ambiguity(pairs, |m| m.reference);
    let mut matches = resolve_ambiguity(pairs, |m| m.candidate);
    matches.sort_by_key(|m| (m.reference, m.candidate));

    for m in &matches {
        reference.mark_matched(m.reference);
        candidate.mark_matched(m.candidate);
    }

    info!(
        "Matched {} junction pairs out of {} potential pairs ({} reference / {} candidate junctions)",
        matches.len(),
        potential,
        reference.junctions.len(),
        candidate.junctions.len()
    );
    matches
}

/// Two-point lines joining each matched reference junction to its candidate.
pub fn junction_deviation_lines(
    matches: &[JunctionMatch],
    reference: &JunctionSet,
    candidate: &JunctionSet,
) -> Vec<JunctionOffset> {
    matches
        .iter()
        .map(|m| {
            let start = reference.junction(m.reference).geometry;
            let end = candidate.junction(m.candidate).geometry;
            JunctionOffset {
                start,
                end,
                length: m.distance,
                reference_junction: m.reference,
                candidate_junction: m.candidate,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmonize::junctions::build_junctions;
    use crate::store::{Attributes, FeatureId, LineCollection, LineFeature};
    use geo_types::{Coord, LineString};

    fn network(lines: Vec<Vec<(f64, f64)>>) -> LineCollection {
        LineCollection::new(
            lines
                .into_iter()
                .enumerate()
                .map(|(i, c)| LineFeature::new(FeatureId(i as u64 + 1), LineString::from(c), Attributes::new()))
                .collect(),
        )
    }

    fn options() -> HarmonizeOptions {
        HarmonizeOptions {
            search_radius: 10.0,
            max_distance_diff: 10.0,
            ..HarmonizeOptions::default()
        }
    }

    #[test]
    fn test_offset_corner_matches() {
        let reference = network(vec![
            vec![(0.0, 0.0), (100.0, 0.0)],
            vec![(100.0, 0.0), (100.0, 100.0)],
        ]);
        let candidate = network(vec![
            vec![(0.0, 3.0), (100.0, 3.0)],
            vec![(100.0, 3.0), (100.0, 100.0)],
        ]);
        let mut ref_j = build_junctions(&reference);
        let mut cand_j = build_junctions(&candidate);
        let matches = match_junctions(&mut ref_j, &mut cand_j, &options());

        let corner = matches
            .iter()
            .find(|m| ref_j.junction(m.reference).geometry == Coord { x: 100.0, y: 0.0 })
            .expect("corner junction should match");
        assert_eq!(cand_j.junction(corner.candidate).geometry, Coord { x: 100.0, y: 3.0 });
        assert_eq!(corner.point_pairs.len(), 2);
        assert!((corner.distance_term - 0.3).abs() < 1e-12);
        assert!(ref_j.points.iter().all(|p| p.matched));
        assert!(cand_j.points.iter().all(|p| p.matched));
    }

    #[test]
    fn test_opposing_azimuths_do_not_match() {
        // reference line heads east from the shared node, candidate heads west
        let reference = network(vec![vec![(0.0, 0.0), (50.0, 0.0)]]);
        let candidate = network(vec![vec![(1.0, 0.0), (-50.0, 0.0)]]);
        let mut ref_j = build_junctions(&reference);
        let mut cand_j = build_junctions(&candidate);
        let matches = match_junctions(&mut ref_j, &mut cand_j, &options());
        assert!(matches.is_empty());
        assert_eq!(ref_j.matched_point_count(), 0);
    }

    #[test]
    fn test_tied_candidates_discard_the_junction() {
        // one reference end, two candidate ends at the same distance and heading
        let reference = network(vec![vec![(0.0, 0.0), (0.0, 50.0)]]);
        let candidate = network(vec![
            vec![(-2.0, 0.0), (-2.0, 50.0)],
            vec![(2.0, 0.0), (2.0, 50.0)],
        ]);
        let mut ref_j = build_junctions(&reference);
        let mut cand_j = build_junctions(&candidate);
        let matches = match_junctions(&mut ref_j, &mut cand_j, &options());
        assert!(matches.is_empty(), "ties are dropped rather than guessed");
    }

    #[test]
    fn test_matching_is_injective() {
        let reference = network(vec![vec![(0.0, 0.0), (0.0, 50.0)]]);
        let candidate = network(vec![
            vec![(-1.0, 0.0), (-1.0, 50.0)],
            vec![(3.0, 0.0), (3.0, 50.0)],
        ]);
        let mut ref_j = build_junctions(&reference);
        let mut cand_j = build_junctions(&candidate);
        let matches = match_junctions(&mut ref_j, &mut cand_j, &options());
        assert_eq!(matches.len(), 2, "both ends of the reference line match once");
        for m in &matches {
            assert!((cand_j.junction(m.candidate).geometry.x + 1.0).abs() < 1e-12);
        }
        let lines = junction_deviation_lines(&matches, &ref_j, &cand_j);
        assert!(lines.iter().all(|l| (l.length - 1.0).abs() < 1e-12));
        for (line, m) in lines.iter().zip(&matches) {
            assert_eq!(line.reference_junction, m.reference);
            assert_eq!(line.candidate_junction, m.candidate);
            assert_eq!(line.start, ref_j.junction(m.reference).geometry);
        }
    }
}
