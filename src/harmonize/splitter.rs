use crate::geometry::{self, Cut};
use crate::store::{LineCollection, LineFeature};
use geo_types::Line;
use log::info;
use rstar::{AABB, RTree, RTreeObject};

/// Loci closer than this to either end do not count as interior.
pub const INTERIOR_EPSILON: f64 = 1e-9;

struct LineSegment {
    line: usize,
    segment: usize,
    geom: Line<f64>,
}

impl RTreeObject for LineSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.geom.start.x, self.geom.start.y],
            [self.geom.end.x, self.geom.end.y],
        )
    }
}

/// Cumulative offsets of every vertex along a polyline.
pub(crate) struct LineMetrics {
    offsets: Vec<f64>,
    total: f64,
}

impl LineMetrics {
    pub(crate) fn new(feature: &LineFeature) -> Self {
        let mut offsets = Vec::with_capacity(feature.coords().len());
        let mut travelled = 0.0;
        offsets.push(0.0);
        for w in feature.coords().windows(2) {
            travelled += geometry::distance(w[0], w[1]);
            offsets.push(travelled);
        }
        Self {
            offsets,
            total: travelled,
        }
    }

    pub(crate) fn locus(&self, segment: usize, fraction: f64) -> f64 {
        if self.total == 0.0 {
            return 0.0;
        }
        let seg_len = self.offsets[segment + 1] - self.offsets[segment];
        (self.offsets[segment] + fraction * seg_len) / self.total
    }

    pub(crate) fn is_interior(&self, segment: usize, fraction: f64) -> bool {
        let locus = self.locus(segment, fraction);
        locus > INTERIOR_EPSILON && locus < 1.0 - INTERIOR_EPSILON
    }
}

/// For every feature, the point crossings with other features that fall strictly
/// inside it. Both features of a crossing get the identical coordinate.
/// Collinear overlaps are ignored.
pub(crate) fn interior_crossings(features: &[LineFeature]) -> Vec<Vec<Cut>> {
    let metrics: Vec<LineMetrics> = features.iter().map(LineMetrics::new).collect();

    let mut segments = Vec::new();
    for (i, feature) in features.iter().enumerate() {
        for (j, w) in feature.coords().windows(2).enumerate() {
            segments.push(LineSegment {
                line: i,
                segment: j,
                geom: Line::new(w[0], w[1]),
            });
        }
    }
    let tree = RTree::bulk_load(segments);

    let mut cuts: Vec<Vec<Cut>> = vec![Vec::new(); features.len()];
    for segment in tree.iter() {
        for other in tree.locate_in_envelope_intersecting(&segment.envelope()) {
            // each pair once, and never a line against itself
            if other.line <= segment.line {
                continue;
            }
            let Some(crossing) = geometry::segment_crossing(segment.geom, other.geom) else {
                continue;
            };
            for (line, seg, fraction) in [
                (segment.line, segment.segment, crossing.fraction_a),
                (other.line, other.segment, crossing.fraction_b),
            ] {
                if metrics[line].is_interior(seg, fraction) {
                    cuts[line].push(Cut {
                        segment: seg,
                        fraction,
                        point: crossing.point,
                    });
                }
            }
        }
    }
    cuts
}

/// Cut every line at all interior point intersections with other lines.
pub fn split_at_intersections(lines: &LineCollection) -> LineCollection {
    let cuts = interior_crossings(lines.features());
    let pieces = cut_features(lines.features(), &cuts);
    let out = LineCollection::from_pieces(pieces);
    info!("Presplit {} lines into {} segments", lines.len(), out.len());
    out
}

/// Apply per-feature cut lists; uncut features pass through as a single piece.
pub(crate) fn cut_features(features: &[LineFeature], cuts: &[Vec<Cut>]) -> Vec<LineFeature> {
    let mut pieces = Vec::with_capacity(features.len());
    for (feature, feature_cuts) in features.iter().zip(cuts) {
        for coords in geometry::split_polyline(feature.coords(), feature_cuts) {
            pieces.push(feature.piece(coords));
        }
    }
    pieces
}
