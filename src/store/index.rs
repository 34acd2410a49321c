use crate::geometry;
use geo_types::Coord;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

use super::collection::LineCollection;

/// Bounding-box R-tree over the features of a line collection.
/// Lookups return positions into the collection, ascending, and
/// filter by exact polyline distance.
pub struct LineIndex<'a> {
    collection: &'a LineCollection,
    tree: RTree<GeomWithData<Rectangle<[f64; 2]>, usize>>,
}

impl<'a> LineIndex<'a> {
    pub fn build(collection: &'a LineCollection) -> Self {
        let items: Vec<_> = collection
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.coords().is_empty())
            .map(|(i, f)| {
                let bbox = geometry::envelope(f.coords());
                GeomWithData::new(Rectangle::from_corners(bbox.lower(), bbox.upper()), i)
            })
            .collect();

        Self {
            collection,
            tree: RTree::bulk_load(items),
        }
    }

    pub fn collection(&self) -> &'a LineCollection {
        self.collection
    }

    fn candidates(&self, envelope: &AABB<[f64; 2]>) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(envelope)
            .map(|item| item.data)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Features whose distance to `p` is at most `radius`.
    pub fn within_of_point(&self, p: Coord<f64>, radius: f64) -> Vec<usize> {
        let envelope = AABB::from_corners([p.x - radius, p.y - radius], [p.x + radius, p.y + radius]);
        self.candidates(&envelope)
            .into_iter()
            .filter(|&i| {
                geometry::point_line_distance(p, self.collection.features()[i].coords()) <= radius
            })
            .collect()
    }

    /// Features within `radius` of a polyline, paired with their distance.
    pub fn within_of_line(&self, coords: &[Coord<f64>], radius: f64) -> Vec<(usize, f64)> {
        if coords.is_empty() {
            return Vec::new();
        }
        let bbox = geometry::envelope(coords);
        let [lx, ly] = bbox.lower();
        let [ux, uy] = bbox.upper();
        let envelope = AABB::from_corners([lx - radius, ly - radius], [ux + radius, uy + radius]);
        self.candidates(&envelope)
            .into_iter()
            .filter_map(|i| {
                let d = geometry::line_line_distance(coords, self.collection.features()[i].coords());
                (d <= radius).then_some((i, d))
            })
            .collect()
    }
}

/// Point R-tree with payloads, used for junction lookups.
pub struct PointIndex<T> {
    tree: RTree<GeomWithData<[f64; 2], T>>,
}

impl<T: Copy + Ord> PointIndex<T> {
    pub fn build(points: impl IntoIterator<Item = (Coord<f64>, T)>) -> Self {
        let items: Vec<_> = points
            .into_iter()
            .map(|(c, data)| GeomWithData::new([c.x, c.y], data))
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn empty() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn insert(&mut self, c: Coord<f64>, data: T) {
        self.tree.insert(GeomWithData::new([c.x, c.y], data));
    }

    /// Payloads of points within `radius` (inclusive), sorted.
    pub fn within(&self, c: Coord<f64>, radius: f64) -> Vec<T> {
        let mut hits: Vec<T> = self
            .tree
            .locate_within_distance([c.x, c.y], radius * radius)
            .map(|item| item.data)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Closest point within `radius`, lower payload first on equal distance.
    pub fn nearest_within(&self, c: Coord<f64>, radius: f64) -> Option<(T, f64)> {
        self.tree
            .locate_within_distance([c.x, c.y], radius * radius)
            .map(|item| {
                let [x, y] = *item.geom();
                (item.data, geometry::distance(c, Coord { x, y }))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collection::{Attributes, FeatureId, LineFeature};
    use geo_types::LineString;

    fn collection() -> LineCollection {
        LineCollection::new(vec![
            LineFeature::new(
                FeatureId(1),
                LineString::from(vec![(0.0, 0.0), (10.0, 0.0)]),
                Attributes::new(),
            ),
            LineFeature::new(
                FeatureId(2),
                LineString::from(vec![(0.0, 5.0), (10.0, 5.0)]),
                Attributes::new(),
            ),
        ])
    }

    #[test]
    fn test_within_of_point_uses_exact_distance() {
        let lines = collection();
        let index = LineIndex::build(&lines);
        assert_eq!(index.within_of_point(Coord { x: 5.0, y: 1.0 }, 1.5), vec![0]);
        assert_eq!(index.within_of_point(Coord { x: 5.0, y: 2.5 }, 2.5), vec![0, 1]);
        // inside the bbox corner region but farther than the radius
        assert!(index.within_of_point(Coord { x: -1.0, y: -1.0 }, 1.2).is_empty());
    }

    #[test]
    fn test_point_index_nearest() {
        let index = PointIndex::build(vec![
            (Coord { x: 0.0, y: 0.0 }, 1u32),
            (Coord { x: 1.0, y: 0.0 }, 2u32),
        ]);
        let (hit, d) = index.nearest_within(Coord { x: 0.9, y: 0.0 }, 0.5).unwrap();
        assert_eq!(hit, 2);
        assert!((d - 0.1).abs() < 1e-12);
        assert_eq!(index.within(Coord { x: 0.5, y: 0.0 }, 0.5), vec![1, 2]);
    }
}
