use super::splitter;
use crate::geometry;
use crate::store::{FeatureId, LineCollection, PointIndex};
use geo_types::Coord;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Points closer than this collapse into one junction.
pub const JUNCTION_TOLERANCE: f64 = 1e-11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JunctionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct JunctionPointId(pub usize);

impl fmt::Display for JunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "j{}", self.0)
    }
}

impl fmt::Display for JunctionPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PointRole {
    Start,
    End,
    /// Crossing strictly inside the parent line.
    Interior,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JunctionPoint {
    pub id: JunctionPointId,
    pub geometry: Coord<f64>,
    pub parent_line: FeatureId,
    pub junction: JunctionId,
    pub role: PointRole,
    /// Outgoing direction of the parent line at this point.
    pub azimuth: Option<f64>,
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    pub id: JunctionId,
    pub geometry: Coord<f64>,
    pub incident_count: usize,
    pub points: Vec<JunctionPointId>,
}

/// Junctions of one dataset with their incident points. Ids index the vectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JunctionSet {
    pub junctions: Vec<Junction>,
    pub points: Vec<JunctionPoint>,
}

impl JunctionSet {
    pub fn junction(&self, id: JunctionId) -> &Junction {
        &self.junctions[id.0]
    }

    pub fn point(&self, id: JunctionPointId) -> &JunctionPoint {
        &self.points[id.0]
    }

    pub fn unmatched_points(&self) -> impl Iterator<Item = &JunctionPoint> {
        self.points.iter().filter(|p| !p.matched)
    }

    pub fn matched_point_count(&self) -> usize {
        self.points.iter().filter(|p| p.matched).count()
    }

    /// Flag every point of a junction as matched.
    pub fn mark_matched(&mut self, id: JunctionId) {
        let point_ids = self.junctions[id.0].points.clone();
        for p in point_ids {
            self.points[p.0].matched = true;
        }
    }
}

/// Collapse coordinates closer than `tolerance` into clusters, first come first
/// served. Returns the cluster representatives and the cluster of every input.
pub(crate) fn cluster_points(points: &[Coord<f64>], tolerance: f64) -> (Vec<Coord<f64>>, Vec<usize>) {
    let mut index: PointIndex<usize> = PointIndex::empty();
    let mut representatives = Vec::new();
    let mut assignment = Vec::with_capacity(points.len());

    for &p in points {
        let cluster = match index.nearest_within(p, tolerance) {
            Some((cluster, _)) => cluster,
            None => {
                let cluster = representatives.len();
                representatives.push(p);
                index.insert(p, cluster);
                cluster
            }
        };
        assignment.push(cluster);
    }
    (representatives, assignment)
}

/// Derive the junction set of a line collection.
pub fn build_junctions(lines: &LineCollection) -> JunctionSet {
    let features = lines.features();
    let mut raw: Vec<(Coord<f64>, FeatureId, PointRole, Option<f64>)> = Vec::new();

    for feature in features {
        let coords = feature.coords();
        let (Some(start), Some(end)) = (feature.start(), feature.end()) else {
            continue;
        };
        raw.push((start, feature.id, PointRole::Start, geometry::start_azimuth(coords)));
        raw.push((end, feature.id, PointRole::End, geometry::end_azimuth(coords)));
    }

    let crossings = splitter::interior_crossings(features);
    for (feature, cuts) in features.iter().zip(crossings) {
        let mut seen: Vec<Coord<f64>> = Vec::new();
        for cut in cuts {
            // a crossing on a shared vertex is reported by both adjacent segments
            if seen
                .iter()
                .any(|s| geometry::distance(*s, cut.point) <= JUNCTION_TOLERANCE)
            {
                continue;
            }
            seen.push(cut.point);
            raw.push((cut.point, feature.id, PointRole::Interior, None));
        }
    }

    let coords: Vec<Coord<f64>> = raw.iter().map(|r| r.0).collect();
    let (representatives, assignment) = cluster_points(&coords, JUNCTION_TOLERANCE);

    let mut junctions: Vec<Junction> = representatives
        .into_iter()
        .enumerate()
        .map(|(i, geometry)| Junction {
            id: JunctionId(i),
            geometry,
            incident_count: 0,
            points: Vec::new(),
        })
        .collect();

    let points: Vec<JunctionPoint> = raw
        .into_iter()
        .zip(assignment)
        .enumerate()
        .map(|(i, ((geometry, parent_line, role, azimuth), cluster))| {
            let id = JunctionPointId(i);
            let junction = &mut junctions[cluster];
            junction.incident_count += 1;
            junction.points.push(id);
            JunctionPoint {
                id,
                geometry,
                parent_line,
                junction: JunctionId(cluster),
                role,
                azimuth,
                matched: false,
            }
        })
        .collect();

    info!(
        "Built {} junctions from {} junction points over {} lines",
        junctions.len(),
        points.len(),
        lines.len()
    );

    JunctionSet { junctions, points }
}
