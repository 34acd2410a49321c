use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Distance, Euclidean, Haversine, InterpolateLine};
use geo_types::{Coord, Line, LineString, Point};
use rstar::AABB;
use std::f64::consts::{PI, TAU};

/// Step used to sample a local tangent along a polyline, as a fraction of its length.
pub const TANGENT_STEP: f64 = 1e-6;

// --- Planar primitives ---

pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Euclidean.distance(a, b)
}

/// Planar length of a polyline in coordinate units.
pub fn polyline_length(coords: &[Coord<f64>]) -> f64 {
    coords.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Geodesic length in metres, treating coordinates as lon/lat.
pub fn haversine_length(coords: &[Coord<f64>]) -> f64 {
    coords
        .windows(2)
        .map(|w| Haversine.distance(Point::from(w[0]), Point::from(w[1])))
        .sum()
}

/// Compass azimuth from `from` to `to`: clockwise from north (+y), in `[0, 2π)`.
/// `None` for coincident points.
pub fn azimuth(from: Coord<f64>, to: Coord<f64>) -> Option<f64> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    Some(normalize_angle(dx.atan2(dy)))
}

pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if a >= TAU { 0.0 } else { a }
}

/// Circular difference of two azimuths in `[0, π]`.
pub fn circular_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % TAU;
    d.min(TAU - d)
}

/// Orientation-insensitive difference of two azimuths in `[0, π/2]`.
/// Opposite directions compare as equal.
pub fn orientation_free_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % PI;
    d.min(PI - d)
}

pub fn flip(azimuth: f64) -> f64 {
    normalize_angle(azimuth + PI)
}

pub fn envelope(coords: &[Coord<f64>]) -> AABB<[f64; 2]> {
    let points: Vec<[f64; 2]> = coords.iter().map(|c| [c.x, c.y]).collect();
    AABB::from_points(points.iter())
}

// --- Projection ---

/// Closest point of a polyline to some query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Index of the polyline segment holding the closest point.
    pub segment: usize,
    /// Position on that segment, 0 at its start vertex.
    pub fraction: f64,
    /// Distance travelled from the polyline start.
    pub offset: f64,
    /// `offset` divided by the polyline length.
    pub locus: f64,
    pub point: Coord<f64>,
    /// Distance from the query point to `point`.
    pub distance: f64,
}

fn project_onto_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (f64, Coord<f64>) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return (0.0, a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    (
        t,
        Coord {
            x: a.x + t * dx,
            y: a.y + t * dy,
        },
    )
}

/// Project a point onto a polyline. The first segment wins on equal distances.
pub fn project(p: Coord<f64>, coords: &[Coord<f64>]) -> Option<Projection> {
    if coords.len() < 2 {
        return None;
    }
    let total = polyline_length(coords);
    let mut travelled = 0.0;
    let mut best: Option<Projection> = None;

    for (i, w) in coords.windows(2).enumerate() {
        let seg_len = distance(w[0], w[1]);
        let (t, point) = project_onto_segment(p, w[0], w[1]);
        let d = distance(p, point);
        if best.as_ref().is_none_or(|b| d < b.distance) {
            let offset = travelled + t * seg_len;
            best = Some(Projection {
                segment: i,
                fraction: t,
                offset,
                locus: if total > 0.0 { offset / total } else { 0.0 },
                point,
                distance: d,
            });
        }
        travelled += seg_len;
    }
    best
}

fn line_string(coords: &[Coord<f64>]) -> LineString<f64> {
    LineString::new(coords.to_vec())
}

/// Shortest distance from a point to a polyline.
pub fn point_line_distance(p: Coord<f64>, coords: &[Coord<f64>]) -> f64 {
    match coords {
        [] => f64::INFINITY,
        [only] => distance(p, *only),
        _ => Euclidean.distance(&Point::from(p), &line_string(coords)),
    }
}

/// Minimum distance between two polylines.
pub fn line_line_distance(a: &[Coord<f64>], b: &[Coord<f64>]) -> f64 {
    let segments_b: Vec<Line<f64>> = b.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    a.windows(2)
        .map(|w| Line::new(w[0], w[1]))
        .flat_map(|sa| segments_b.iter().map(move |sb| Euclidean.distance(&sa, sb)))
        .fold(f64::INFINITY, f64::min)
}

// --- Interpolation ---

/// Point at a fraction of the polyline length, clamped to its ends.
pub fn interpolate(coords: &[Coord<f64>], locus: f64) -> Option<Coord<f64>> {
    if coords.len() < 2 {
        return None;
    }
    // zero-length segments make the per-segment step divide by zero
    let mut line = line_string(coords);
    line.0.dedup();
    Euclidean
        .point_at_ratio_from_start(&line, locus.clamp(0.0, 1.0))
        .map(Coord::from)
}

/// Local tangent azimuth at a locus, sampled towards the line end.
pub fn tangent_azimuth(coords: &[Coord<f64>], locus: f64) -> Option<f64> {
    let here = interpolate(coords, locus)?;
    let ahead = interpolate(coords, locus + TANGENT_STEP)?;
    azimuth(here, ahead)
}

/// Outward azimuth at the start of a polyline, towards the first vertex that
/// differs from the start point.
pub fn start_azimuth(coords: &[Coord<f64>]) -> Option<f64> {
    let (first, rest) = coords.split_first()?;
    let next = rest.iter().find(|c| *c != first)?;
    azimuth(*first, *next)
}

/// Outward azimuth at the end of a polyline, towards the last vertex before
/// it that differs from the end point.
pub fn end_azimuth(coords: &[Coord<f64>]) -> Option<f64> {
    let (last, rest) = coords.split_last()?;
    let before = rest.iter().rev().find(|c| *c != last)?;
    azimuth(*last, *before)
}

/// Start to end azimuth of a whole polyline.
pub fn direction(coords: &[Coord<f64>]) -> Option<f64> {
    match (coords.first(), coords.last()) {
        (Some(first), Some(last)) => azimuth(*first, *last),
        _ => None,
    }
}

// --- Densification and sampling ---

/// Insert vertices so that no segment is longer than `max_spacing`.
/// Original vertices are kept.
pub fn densify(coords: &[Coord<f64>], max_spacing: f64) -> Vec<Coord<f64>> {
    if coords.len() < 2 || max_spacing <= 0.0 {
        return coords.to_vec();
    }
    let mut result = Vec::with_capacity(coords.len() * 2);
    result.push(coords[0]);

    for w in coords.windows(2) {
        let (p1, p2) = (w[0], w[1]);
        let dist = distance(p1, p2);
        if dist > max_spacing {
            let steps = (dist / max_spacing).ceil() as usize;
            for j in 1..steps {
                let t = j as f64 / steps as f64;
                result.push(Coord {
                    x: p1.x + (p2.x - p1.x) * t,
                    y: p1.y + (p2.y - p1.y) * t,
                });
            }
        }
        result.push(p2);
    }
    result
}

/// Mean distance from the densified vertices of `from` to the polyline `to`.
pub fn mean_sampled_distance(from: &[Coord<f64>], to: &[Coord<f64>], interval: f64) -> f64 {
    let distances = sample_distances(from, to, interval);
    if distances.is_empty() {
        return 0.0;
    }
    distances.iter().sum::<f64>() / distances.len() as f64
}

/// Sampled Hausdorff approximation: the largest vertex-to-line distance in either direction.
pub fn sampled_hausdorff(a: &[Coord<f64>], b: &[Coord<f64>], interval: f64) -> f64 {
    let one_way = |from: &[Coord<f64>], to: &[Coord<f64>]| {
        sample_distances(from, to, interval)
            .into_iter()
            .fold(0.0, f64::max)
    };
    one_way(a, b).max(one_way(b, a))
}

fn sample_distances(from: &[Coord<f64>], to: &[Coord<f64>], interval: f64) -> Vec<f64> {
    let samples = densify(from, interval);
    if to.len() < 2 {
        return samples.iter().map(|p| point_line_distance(*p, to)).collect();
    }
    let target = line_string(to);
    samples
        .iter()
        .map(|p| Euclidean.distance(&Point::from(*p), &target))
        .collect()
}

// --- Splitting ---

/// A cut position on a polyline, addressed by segment so that the cut vertex is
/// placed exactly at `point` without re-interpolation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cut {
    pub segment: usize,
    pub fraction: f64,
    pub point: Coord<f64>,
}

fn push_distinct(piece: &mut Vec<Coord<f64>>, c: Coord<f64>) {
    if piece.last() != Some(&c) {
        piece.push(c);
    }
}

/// Cut a polyline at the given positions. Pieces come back in line order;
/// zero-length pieces (repeated cuts, cuts at the ends) are dropped.
pub fn split_polyline(coords: &[Coord<f64>], cuts: &[Cut]) -> Vec<Vec<Coord<f64>>> {
    if coords.len() < 2 {
        return Vec::new();
    }
    let mut ordered = cuts.to_vec();
    ordered.sort_by(|a, b| {
        a.segment
            .cmp(&b.segment)
            .then(a.fraction.total_cmp(&b.fraction))
    });

    let mut pieces = Vec::with_capacity(ordered.len() + 1);
    let mut current = vec![coords[0]];
    let mut next_cut = 0;

    for (i, w) in coords.windows(2).enumerate() {
        while next_cut < ordered.len() && ordered[next_cut].segment == i {
            let cut = ordered[next_cut];
            push_distinct(&mut current, cut.point);
            pieces.push(std::mem::replace(&mut current, vec![cut.point]));
            next_cut += 1;
        }
        push_distinct(&mut current, w[1]);
    }
    pieces.push(current);

    pieces.retain(|p| p.len() >= 2 && polyline_length(p) > 0.0);
    pieces
}

// --- Intersections ---

/// A point where two polyline segments cross.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentCrossing {
    pub point: Coord<f64>,
    /// Position along the first segment.
    pub fraction_a: f64,
    /// Position along the second segment.
    pub fraction_b: f64,
}

/// Point intersection of two segments. Collinear overlaps yield `None`.
pub fn segment_crossing(a: Line<f64>, b: Line<f64>) -> Option<SegmentCrossing> {
    match line_intersection(a, b)? {
        LineIntersection::SinglePoint { intersection, .. } => Some(SegmentCrossing {
            point: intersection,
            fraction_a: fraction_on(a, intersection),
            fraction_b: fraction_on(b, intersection),
        }),
        LineIntersection::Collinear { .. } => None,
    }
}

fn fraction_on(line: Line<f64>, p: Coord<f64>) -> f64 {
    let len = distance(line.start, line.end);
    if len == 0.0 {
        0.0
    } else {
        (distance(line.start, p) / len).clamp(0.0, 1.0)
    }
}
