use super::junctions::{JunctionPoint, JunctionPointId, JunctionSet};
use crate::config::HarmonizeOptions;
use crate::geometry::{self, Projection};
use crate::store::{FeatureId, LineCollection, LineFeature, LineIndex};
use geo_types::Coord;
use log::{debug, info};
use std::collections::BTreeMap;

/// Cutpoints and checkpoints must land this far inside their line, as a locus.
pub const LOCUS_MARGIN: f64 = 1e-4;

/// Checkpoints have to beat the source point distance by this factor to veto a cutpoint.
const CHECKPOINT_FACTOR: f64 = 1.1;

/// A position on a line of one dataset where it should be cut to mirror an
/// unmatched junction point of the other.
#[derive(Debug, Clone, PartialEq)]
pub struct Cutpoint {
    pub id: usize,
    pub parent_line: FeatureId,
    pub source_point: JunctionPointId,
    pub source_line: FeatureId,
    pub locus: f64,
    pub geometry: Coord<f64>,
    pub segment: usize,
    pub fraction: f64,
    /// Local tangent of the parent line, turned to agree with the source point.
    pub azimuth: Option<f64>,
    /// Distance between the source point and the cutpoint.
    pub distance: f64,
    pub is_curved: bool,
}

fn inside_margin(locus: f64) -> bool {
    locus > LOCUS_MARGIN && locus < 1.0 - LOCUS_MARGIN
}

/// Tangent at a projection, flipped by π when it disagrees with `reference`
/// beyond `tolerance`. `None` means the orientation-free disagreement is still
/// beyond `tolerance`.
fn aligned_tangent(line: &LineFeature, proj: &Projection, reference: Option<f64>, tolerance: f64) -> Option<Option<f64>> {
    let tangent = geometry::tangent_azimuth(line.coords(), proj.locus);
    let (Some(tangent), Some(reference)) = (tangent, reference) else {
        return Some(tangent);
    };
    if geometry::orientation_free_diff(tangent, reference) > tolerance {
        return None;
    }
    if geometry::circular_diff(tangent, reference) > tolerance {
        Some(Some(geometry::flip(tangent)))
    } else {
        Some(Some(tangent))
    }
}

fn place_on(line: &LineFeature, point: &JunctionPoint, tolerance: f64) -> Option<Cutpoint> {
    let proj = geometry::project(point.geometry, line.coords())?;
    if !inside_margin(proj.locus) {
        return None;
    }
    let Some(azimuth) = aligned_tangent(line, &proj, point.azimuth, tolerance) else {
        debug!("Cutpoint for {} on {} rejected by azimuth", point.id, line.id);
        return None;
    };
    let is_curved = match (azimuth, line.direction.or_else(|| geometry::direction(line.coords()))) {
        (Some(a), Some(d)) => geometry::orientation_free_diff(a, d) > tolerance,
        _ => false,
    };

    Some(Cutpoint {
        id: 0,
        parent_line: line.id,
        source_point: point.id,
        source_line: point.parent_line,
        locus: proj.locus,
        geometry: proj.point,
        segment: proj.segment,
        fraction: proj.fraction,
        azimuth,
        distance: proj.distance,
        is_curved,
    })
}

/// Project a cutpoint back onto the source dataset. The cutpoint survives
/// unless a line other than its source line is clearly closer to it than the
/// source point is.
fn passes_checkpoints(cut: &Cutpoint, source_index: &LineIndex<'_>, radius: f64, tolerance: f64) -> bool {
    let source_lines = source_index.collection().features();
    let mut closest: Option<(f64, FeatureId)> = None;

    for i in source_index.within_of_point(cut.geometry, radius) {
        let line = &source_lines[i];
        let Some(proj) = geometry::project(cut.geometry, line.coords()) else {
            continue;
        };
        if !inside_margin(proj.locus) {
            continue;
        }
        if aligned_tangent(line, &proj, cut.azimuth, tolerance).is_none() {
            continue;
        }
        let better = closest.is_none_or(|(d, id)| proj.distance < d || (proj.distance == d && line.id < id));
        if better {
            closest = Some((proj.distance, line.id));
        }
    }

    match closest {
        Some((d, line)) if line != cut.source_line && CHECKPOINT_FACTOR * d < cut.distance => {
            debug!(
                "Cutpoint on {} for {} vetoed by checkpoint on {}",
                cut.parent_line, cut.source_point, line
            );
            false
        }
        _ => true,
    }
}

/// Cutpoints on `target` derived from the unmatched junction points of the
/// other dataset (`source_lines`, `source_junctions`). The result is sorted by
/// parent line and locus.
pub fn generate_cutpoints(
    target: &LineCollection,
    source_lines: &LineCollection,
    source_junctions: &JunctionSet,
    options: &HarmonizeOptions,
) -> Vec<Cutpoint> {
    let radius = options.search_radius;
    let target_index = LineIndex::build(target);
    let source_index = LineIndex::build(source_lines);

    let mut placed = 0usize;
    let mut best: BTreeMap<JunctionPointId, Cutpoint> = BTreeMap::new();

    for point in source_junctions.unmatched_points() {
        for i in target_index.within_of_point(point.geometry, radius) {
            let Some(cut) = place_on(&target.features()[i], point, options.azimuth_tolerance) else {
                continue;
            };
            placed += 1;
            if !passes_checkpoints(&cut, &source_index, radius, options.checkpoint_angle_tolerance) {
                continue;
            }
            let keep = best.get(&cut.source_point).is_none_or(|current| {
                cut.distance < current.distance
                    || (cut.distance == current.distance && cut.parent_line < current.parent_line)
            });
            if keep {
                best.insert(cut.source_point, cut);
            }
        }
    }

    let mut cutpoints: Vec<Cutpoint> = best.into_values().collect();
    cutpoints.sort_by(|a, b| {
        a.parent_line
            .cmp(&b.parent_line)
            .then(a.locus.total_cmp(&b.locus))
            .then(a.source_point.cmp(&b.source_point))
    });
    for (i, cut) in cutpoints.iter_mut().enumerate() {
        cut.id = i;
    }

    info!(
        "Kept {} of {} cutpoints from {} unmatched junction points",
        cutpoints.len(),
        placed,
        source_junctions.unmatched_points().count()
    );
    cutpoints
}
