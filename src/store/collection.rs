use crate::geometry;
use geo_types::{Coord, LineString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Typed wrapper for line feature ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Hands out increasing feature ids, starting at 1.
#[derive(Debug, Clone)]
pub struct FeatureIdSequence {
    next: u64,
}

impl Default for FeatureIdSequence {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl FeatureIdSequence {
    pub fn next_id(&mut self) -> FeatureId {
        let id = FeatureId(self.next);
        self.next += 1;
        id
    }
}

/// Where a feature came from: the imported feature and its piece number (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lineage {
    pub source_id: FeatureId,
    pub sub_index: u32,
}

pub type Attributes = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct LineFeature {
    pub id: FeatureId,
    pub geometry: LineString<f64>,
    pub attributes: Attributes,
    pub lineage: Lineage,
    /// Start to end azimuth, set once the feature has been through a splitting stage.
    pub direction: Option<f64>,
}

impl LineFeature {
    /// A freshly imported feature; it is its own lineage source.
    pub fn new(id: FeatureId, geometry: LineString<f64>, attributes: Attributes) -> Self {
        Self {
            id,
            geometry,
            attributes,
            lineage: Lineage {
                source_id: id,
                sub_index: 1,
            },
            direction: None,
        }
    }

    /// A piece cut out of this feature. Lineage source and attributes carry over;
    /// the id and sub index are assigned by [`LineCollection::from_pieces`].
    pub fn piece(&self, coords: Vec<Coord<f64>>) -> Self {
        let direction = geometry::direction(&coords);
        Self {
            id: self.id,
            geometry: LineString::new(coords),
            attributes: self.attributes.clone(),
            lineage: self.lineage,
            direction,
        }
    }

    pub fn coords(&self) -> &[Coord<f64>] {
        &self.geometry.0
    }

    pub fn length(&self) -> f64 {
        geometry::polyline_length(self.coords())
    }

    pub fn start(&self) -> Option<Coord<f64>> {
        self.geometry.0.first().copied()
    }

    pub fn end(&self) -> Option<Coord<f64>> {
        self.geometry.0.last().copied()
    }

    /// String value of an attribute, if present and non-empty.
    pub fn text_attribute(&self, key: &str) -> Option<&str> {
        match self.attributes.get(key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

/// An ordered set of line features. Features are kept sorted by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineCollection {
    features: Vec<LineFeature>,
}

impl LineCollection {
    pub fn new(mut features: Vec<LineFeature>) -> Self {
        features.sort_by_key(|f| f.id);
        Self { features }
    }

    /// Output of a splitting stage: fresh ids in emission order, and sub indices
    /// numbered per lineage source in the same order.
    pub fn from_pieces(pieces: Vec<LineFeature>) -> Self {
        let mut next_sub: BTreeMap<FeatureId, u32> = BTreeMap::new();
        let mut ids = FeatureIdSequence::default();
        let features = pieces
            .into_iter()
            .map(|mut f| {
                let sub = next_sub.entry(f.lineage.source_id).or_insert(0);
                *sub += 1;
                f.lineage.sub_index = *sub;
                f.id = ids.next_id();
                f
            })
            .collect();
        Self { features }
    }

    pub fn features(&self) -> &[LineFeature] {
        &self.features
    }

    pub fn into_features(self) -> Vec<LineFeature> {
        self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineFeature> {
        self.features.iter()
    }

    pub fn get(&self, id: FeatureId) -> Option<&LineFeature> {
        self.features
            .binary_search_by_key(&id, |f| f.id)
            .ok()
            .map(|i| &self.features[i])
    }

    pub fn total_length(&self) -> f64 {
        self.features.iter().map(LineFeature::length).sum()
    }

    /// Total length per lineage source.
    pub fn length_by_source(&self) -> BTreeMap<FeatureId, f64> {
        let mut out = BTreeMap::new();
        for f in &self.features {
            *out.entry(f.lineage.source_id).or_insert(0.0) += f.length();
        }
        out
    }
}

impl FromIterator<LineFeature> for LineCollection {
    fn from_iter<I: IntoIterator<Item = LineFeature>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
