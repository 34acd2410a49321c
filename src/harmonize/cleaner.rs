use super::junctions::{JUNCTION_TOLERANCE, cluster_points};
use super::splitter::{self, LineMetrics};
use crate::geometry::{self, Cut};
use crate::store::{LineCollection, LineFeature, LineIndex, PointIndex};
use geo_types::Coord;
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Start,
    End,
}

/// Counters reported by [`clean_network`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub snapped_to_junctions: usize,
    pub snapped_to_lines: usize,
    pub stubs_removed: usize,
}

fn endpoint(feature: &LineFeature, end: End) -> Option<Coord<f64>> {
    match end {
        End::Start => feature.start(),
        End::End => feature.end(),
    }
}

fn set_endpoint(coords: &mut [Coord<f64>], end: End, to: Coord<f64>) {
    let slot = match end {
        End::Start => coords.first_mut(),
        End::End => coords.last_mut(),
    };
    if let Some(c) = slot {
        *c = to;
    }
}

/// Snap dangling endpoints onto nearby junctions and lines, split at the new
/// crossings and drop every piece shorter than `radius`.
pub fn clean_network(lines: &LineCollection, radius: f64) -> (LineCollection, CleanReport) {
    let mut report = CleanReport::default();
    let features = lines.features();

    // endpoint junctions of the untouched input
    let mut ends: Vec<(usize, End, Coord<f64>)> = Vec::with_capacity(features.len() * 2);
    for (i, f) in features.iter().enumerate() {
        for end in [End::Start, End::End] {
            if let Some(c) = endpoint(f, end) {
                ends.push((i, end, c));
            }
        }
    }
    let coords: Vec<Coord<f64>> = ends.iter().map(|e| e.2).collect();
    let (junctions, assignment) = cluster_points(&coords, JUNCTION_TOLERANCE);
    let mut counts = vec![0usize; junctions.len()];
    for &cluster in &assignment {
        counts[cluster] += 1;
    }
    let shared: Vec<(Coord<f64>, usize)> = junctions
        .iter()
        .enumerate()
        .filter(|(i, _)| counts[*i] > 1)
        .map(|(i, c)| (*c, i))
        .collect();
    let shared_index = PointIndex::build(shared);

    let mut geometries: Vec<Vec<Coord<f64>>> = features.iter().map(|f| f.coords().to_vec()).collect();
    // endpoints sitting on a multi-line junction, before or after snapping
    let mut anchored = vec![false; ends.len()];

    for (k, &(line, end, c)) in ends.iter().enumerate() {
        if counts[assignment[k]] > 1 {
            anchored[k] = true;
            continue;
        }
        match shared_index.nearest_within(c, radius) {
            Some((junction, d)) if d > 0.0 => {
                set_endpoint(&mut geometries[line], end, junctions[junction]);
                anchored[k] = true;
                report.snapped_to_junctions += 1;
            }
            _ => {}
        }
    }

    // line snapping sees the junction-snapped state of every line at once
    let snapped: LineCollection = features
        .iter()
        .zip(&geometries)
        .map(|(f, g)| {
            let mut f = f.clone();
            f.geometry = g.clone().into();
            f
        })
        .collect();
    let index = LineIndex::build(&snapped);

    let mut line_snaps: Vec<(usize, Coord<f64>)> = Vec::new();
    for (k, &(line, end, _)) in ends.iter().enumerate() {
        if anchored[k] {
            continue;
        }
        let Some(c) = endpoint(&snapped.features()[line], end) else {
            continue;
        };
        let best = index
            .within_of_point(c, radius)
            .into_iter()
            .filter(|&other| other != line)
            .filter_map(|other| {
                let proj = geometry::project(c, snapped.features()[other].coords())?;
                Some((other, proj))
            })
            .min_by(|a, b| a.1.distance.total_cmp(&b.1.distance).then(a.0.cmp(&b.0)));

        match best {
            Some((target, proj)) if proj.distance > 0.0 => {
                debug!(
                    "Snapping {:?} of {} onto {} ({:.3e} away)",
                    end, features[line].id, features[target].id, proj.distance
                );
                set_endpoint(&mut geometries[line], end, proj.point);
                line_snaps.push((target, proj.point));
                report.snapped_to_lines += 1;
            }
            _ => {}
        }
    }

    let corrected: Vec<LineFeature> = features
        .iter()
        .zip(geometries)
        .map(|(f, g)| {
            let mut f = f.clone();
            f.geometry = g.into();
            f
        })
        .collect();

    let mut cuts = splitter::interior_crossings(&corrected);
    // snap targets get a node exactly at the snapped endpoint
    for (target, point) in line_snaps {
        let feature = &corrected[target];
        let Some(proj) = geometry::project(point, feature.coords()) else {
            continue;
        };
        if LineMetrics::new(feature).is_interior(proj.segment, proj.fraction) {
            cuts[target].push(Cut {
                segment: proj.segment,
                fraction: proj.fraction,
                point,
            });
        }
    }

    let pieces = splitter::cut_features(&corrected, &cuts);
    let before = pieces.len();
    let kept: Vec<LineFeature> = pieces.into_iter().filter(|p| p.length() >= radius).collect();
    report.stubs_removed = before - kept.len();

    let out = LineCollection::from_pieces(kept);
    info!(
        "Cleaned {} lines into {} ({} junction snaps, {} line snaps, {} stubs removed)",
        lines.len(),
        out.len(),
        report.snapped_to_junctions,
        report.snapped_to_lines,
        report.stubs_removed
    );
    (out, report)
}
