//! Named feature collections, namespaced per job.
//!
//! The pipeline reads its two input networks from a [`FeatureStore`] and
//! publishes the harmonized networks and match results back into it. Every
//! collection lives under a map id; publishing replaces any previous collection
//! of the same name.

pub mod collection;
pub mod index;

pub use collection::{Attributes, FeatureId, FeatureIdSequence, LineCollection, LineFeature, Lineage};
pub use index::{LineIndex, PointIndex};

use crate::harmonize::JunctionOffset;
use crate::matching::MatchResult;
use crate::results::{DeviationSegment, GridCell};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("collection '{0}' does not exist")]
    NotFound(CollectionName),
    #[error("collection '{name}' holds {found}, expected {expected}")]
    WrongKind {
        name: CollectionName,
        expected: &'static str,
        found: &'static str,
    },
    #[error("feature store unavailable: {0}")]
    Unavailable(String),
}

/// Identifier namespacing every collection of one job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MapId(String);

impl MapId {
    /// Map ids become part of collection names, so only `[A-Za-z0-9_]` is accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty() && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    ReferenceInput,
    CandidateInput,
    CandidateRelations,
    ReferenceHarmonized,
    CandidateHarmonized,
    Matches,
    JunctionDeviationLines,
    DeviationVectors,
    MatchedReference,
    MatchedCandidate,
    UnmatchedReference,
    UnmatchedCandidate,
    NameAgreement,
    NameDisagreement,
    MaxDeviationGrid,
    MatchingRateGrid,
    CompletenessGrid,
}

impl CollectionKind {
    pub const DERIVED: [CollectionKind; 14] = [
        CollectionKind::ReferenceHarmonized,
        CollectionKind::CandidateHarmonized,
        CollectionKind::Matches,
        CollectionKind::JunctionDeviationLines,
        CollectionKind::DeviationVectors,
        CollectionKind::MatchedReference,
        CollectionKind::MatchedCandidate,
        CollectionKind::UnmatchedReference,
        CollectionKind::UnmatchedCandidate,
        CollectionKind::NameAgreement,
        CollectionKind::NameDisagreement,
        CollectionKind::MaxDeviationGrid,
        CollectionKind::MatchingRateGrid,
        CollectionKind::CompletenessGrid,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            CollectionKind::ReferenceInput => "ref",
            CollectionKind::CandidateInput => "cand",
            CollectionKind::CandidateRelations => "cand_rel",
            CollectionKind::ReferenceHarmonized => "ref_splitted",
            CollectionKind::CandidateHarmonized => "cand_splitted",
            CollectionKind::Matches => "found",
            CollectionKind::JunctionDeviationLines => "junction_deviationlines",
            CollectionKind::DeviationVectors => "posdevlines",
            CollectionKind::MatchedReference => "matched_ref",
            CollectionKind::MatchedCandidate => "matched_cand",
            CollectionKind::UnmatchedReference => "unmatched_ref",
            CollectionKind::UnmatchedCandidate => "unmatched_cand",
            CollectionKind::NameAgreement => "minlevenshtein",
            CollectionKind::NameDisagreement => "maxlevenshtein",
            CollectionKind::MaxDeviationGrid => "maxdevgrid",
            CollectionKind::MatchingRateGrid => "matchingrategrid",
            CollectionKind::CompletenessGrid => "absdevgrid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionName {
    pub map_id: MapId,
    pub kind: CollectionKind,
}

impl CollectionName {
    pub fn new(map_id: &MapId, kind: CollectionKind) -> Self {
        Self {
            map_id: map_id.clone(),
            kind,
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "odf_{}_{}", self.map_id, self.kind.suffix())
    }
}

/// A named candidate relation (e.g. a road route) grouping source features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: u64,
    pub name: Option<String>,
    pub route: Option<String>,
    pub members: Vec<FeatureId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoredCollection {
    Lines(LineCollection),
    Relations(Vec<Relation>),
    Matches(Vec<MatchResult>),
    Segments(Vec<DeviationSegment>),
    JunctionOffsets(Vec<JunctionOffset>),
    Grid(Vec<GridCell>),
}

impl StoredCollection {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StoredCollection::Lines(_) => "lines",
            StoredCollection::Relations(_) => "relations",
            StoredCollection::Matches(_) => "matches",
            StoredCollection::Segments(_) => "segments",
            StoredCollection::JunctionOffsets(_) => "junction offsets",
            StoredCollection::Grid(_) => "grid cells",
        }
    }
}

/// Backing storage for named collections.
pub trait FeatureStore {
    fn load(&self, name: &CollectionName) -> Result<StoredCollection, StoreError>;

    fn contains(&self, name: &CollectionName) -> Result<bool, StoreError>;

    /// Replace (or create) a collection.
    fn replace(&mut self, name: CollectionName, collection: StoredCollection) -> Result<(), StoreError>;

    /// Remove a collection; returns whether it existed.
    fn drop_collection(&mut self, name: &CollectionName) -> Result<bool, StoreError>;
}

pub fn load_lines(store: &dyn FeatureStore, name: &CollectionName) -> Result<LineCollection, StoreError> {
    match store.load(name)? {
        StoredCollection::Lines(lines) => Ok(lines),
        other => Err(StoreError::WrongKind {
            name: name.clone(),
            expected: "lines",
            found: other.kind_name(),
        }),
    }
}

/// Relations are optional: a missing collection reads as empty.
pub fn load_relations(store: &dyn FeatureStore, name: &CollectionName) -> Result<Vec<Relation>, StoreError> {
    if !store.contains(name)? {
        return Ok(Vec::new());
    }
    match store.load(name)? {
        StoredCollection::Relations(relations) => Ok(relations),
        other => Err(StoreError::WrongKind {
            name: name.clone(),
            expected: "relations",
            found: other.kind_name(),
        }),
    }
}

/// In-process store keyed by collection name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: BTreeMap<CollectionName, StoredCollection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> impl Iterator<Item = &CollectionName> {
        self.collections.keys()
    }

    pub fn get(&self, name: &CollectionName) -> Option<&StoredCollection> {
        self.collections.get(name)
    }
}

impl FeatureStore for MemoryStore {
    fn load(&self, name: &CollectionName) -> Result<StoredCollection, StoreError> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.clone()))
    }

    fn contains(&self, name: &CollectionName) -> Result<bool, StoreError> {
        Ok(self.collections.contains_key(name))
    }

    fn replace(&mut self, name: CollectionName, collection: StoredCollection) -> Result<(), StoreError> {
        self.collections.insert(name, collection);
        Ok(())
    }

    fn drop_collection(&mut self, name: &CollectionName) -> Result<bool, StoreError> {
        Ok(self.collections.remove(name).is_some())
    }
}
