//! End-to-end runs of [`DeviationJob`] against an in-memory store.

use crate::config::{HarmonizeOptions, JobConfig, MatchOptions, ResultOptions};
use crate::error::DeviationError;
use crate::geometry;
use crate::harmonize::JunctionOffset;
use crate::job::DeviationJob;
use crate::matching::MatchResult;
use crate::progress::{Progress, Stage};
use crate::results::DeviationSegment;
use crate::store::{
    Attributes, CollectionKind, CollectionName, FeatureId, FeatureStore, LineCollection, LineFeature, MemoryStore,
    Relation, StoreError, StoredCollection,
};
use geo_types::{Coord, LineString};
use std::collections::BTreeSet;

fn line(id: u64, coords: Vec<(f64, f64)>) -> LineFeature {
    LineFeature::new(FeatureId(id), LineString::from(coords), Attributes::new())
}

fn named_line(id: u64, coords: Vec<(f64, f64)>, name: &str) -> LineFeature {
    let mut attrs = Attributes::new();
    attrs.insert("name".into(), serde_json::json!(name));
    LineFeature::new(FeatureId(id), LineString::from(coords), attrs)
}

fn network(features: Vec<LineFeature>) -> LineCollection {
    LineCollection::new(features)
}

/// Options scaled to planar test data in units of one.
fn config(harmonize: bool) -> JobConfig {
    JobConfig {
        harmonize: HarmonizeOptions {
            harmonize,
            search_radius: 10.0,
            max_distance_diff: 10.0,
            ..HarmonizeOptions::default()
        },
        matching: MatchOptions {
            search_radius: 5.0,
            min_feature_length: 0.1,
            posdev_sample_interval: 1.0,
            hausdorff_sample_interval: 1.0,
            max_abs_posdev: 5.0,
            geographic: false,
            ..MatchOptions::default()
        },
        results: ResultOptions {
            deviation_vector_interval: 10.0,
            grid_cell_size: 50.0,
            ..ResultOptions::all()
        },
    }
}

fn run(
    config: JobConfig,
    reference: LineCollection,
    candidate: LineCollection,
    relations: Vec<Relation>,
) -> (DeviationJob, MemoryStore) {
    let job = DeviationJob::new("test", config).unwrap();
    let mut store = MemoryStore::new();
    job.import(&mut store, reference, candidate, relations).unwrap();
    job.run(&mut store, &Progress::silent()).unwrap();
    (job, store)
}

fn matches(job: &DeviationJob, store: &MemoryStore) -> Vec<MatchResult> {
    match store.get(&job.name(CollectionKind::Matches)) {
        Some(StoredCollection::Matches(m)) => m.clone(),
        other => panic!("unexpected matches collection {other:?}"),
    }
}

fn lines(job: &DeviationJob, store: &MemoryStore, kind: CollectionKind) -> LineCollection {
    match store.get(&job.name(kind)) {
        Some(StoredCollection::Lines(l)) => l.clone(),
        other => panic!("unexpected {kind:?} collection {other:?}"),
    }
}

fn segments(job: &DeviationJob, store: &MemoryStore, kind: CollectionKind) -> Vec<DeviationSegment> {
    match store.get(&job.name(kind)) {
        Some(StoredCollection::Segments(s)) => s.clone(),
        other => panic!("unexpected {kind:?} collection {other:?}"),
    }
}

fn junction_offsets(job: &DeviationJob, store: &MemoryStore) -> Vec<JunctionOffset> {
    match store.get(&job.name(CollectionKind::JunctionDeviationLines)) {
        Some(StoredCollection::JunctionOffsets(o)) => o.clone(),
        other => panic!("unexpected junction offset collection {other:?}"),
    }
}

fn pairs(found: &[MatchResult]) -> Vec<(u64, u64)> {
    found.iter().map(|m| (m.ref_id.0, m.cand_id.0)).collect()
}

fn assert_injective(found: &[MatchResult]) {
    let refs: BTreeSet<FeatureId> = found.iter().map(|m| m.ref_id).collect();
    let cands: BTreeSet<FeatureId> = found.iter().map(|m| m.cand_id).collect();
    assert_eq!(refs.len(), found.len(), "reference segment matched twice");
    assert_eq!(cands.len(), found.len(), "candidate segment matched twice");
}

fn snapshot(job: &DeviationJob, store: &MemoryStore) -> Vec<Option<StoredCollection>> {
    CollectionKind::DERIVED
        .iter()
        .map(|&kind| store.get(&job.name(kind)).cloned())
        .collect()
}

/// A through road with a side street; the candidate only has the through road,
/// drawn two units north.
fn side_street() -> (LineCollection, LineCollection, Vec<Relation>) {
    let reference = network(vec![
        named_line(1, vec![(0.0, 0.0), (100.0, 0.0)], "Hauptstraße"),
        line(2, vec![(50.0, 0.0), (50.0, 50.0)]),
    ]);
    let candidate = network(vec![named_line(1, vec![(0.0, 2.0), (100.0, 2.0)], "Hauptstrasse")]);
    let relations = vec![Relation {
        id: 7,
        name: Some("B 27".to_string()),
        route: Some("road".to_string()),
        members: vec![FeatureId(1)],
    }];
    (reference, candidate, relations)
}

#[test]
fn test_offset_corner_matches_without_cutpoints() {
    let reference = network(vec![
        line(1, vec![(0.0, 0.0), (100.0, 0.0)]),
        line(2, vec![(100.0, 0.0), (100.0, 100.0)]),
    ]);
    let candidate = network(vec![
        line(1, vec![(0.0, 3.0), (100.0, 3.0)]),
        line(2, vec![(100.0, 3.0), (100.0, 103.0)]),
    ]);
    let job = DeviationJob::new("corner", config(true)).unwrap();
    let mut store = MemoryStore::new();
    job.import(&mut store, reference, candidate, Vec::new()).unwrap();
    let summary = job.run(&mut store, &Progress::silent()).unwrap();

    assert_eq!(summary.junction_matches, 3);
    assert_eq!(summary.reference_cutpoints, 0);
    assert_eq!(summary.candidate_cutpoints, 0);
    assert_eq!(summary.reference_segments, 2);
    assert_eq!(summary.candidate_segments, 2);

    let offsets = junction_offsets(&job, &store);
    assert_eq!(offsets.len(), 3);
    assert!(offsets.iter().all(|s| (s.length - 3.0).abs() < 1e-9));

    let found = matches(&job, &store);
    assert_eq!(pairs(&found), vec![(1, 1), (2, 2)]);
    assert!((found[0].positional_deviation - 3.0).abs() < 1e-9);
    assert!(found[0].length_diff.abs() < 1e-9);
    assert_injective(&found);
}

#[test]
fn test_side_street_cuts_candidate_and_stays_unmatched() {
    let (reference, candidate, relations) = side_street();
    let (job, store) = run(config(true), reference.clone(), candidate.clone(), relations);

    let ref_segments = lines(&job, &store, CollectionKind::ReferenceHarmonized);
    let cand_segments = lines(&job, &store, CollectionKind::CandidateHarmonized);
    assert_eq!(ref_segments.len(), 3);
    assert_eq!(cand_segments.len(), 2);

    // both candidate pieces meet on one shared node at the mirrored junction
    let first_end = cand_segments.features()[0].end().unwrap();
    let second_start = cand_segments.features()[1].start().unwrap();
    assert_eq!(first_end, second_start);
    assert!(geometry::distance(first_end, Coord { x: 50.0, y: 2.0 }) < 1e-9);

    for (input, output) in [(&reference, &ref_segments), (&candidate, &cand_segments)] {
        let before = input.length_by_source();
        let after = output.length_by_source();
        assert_eq!(before.keys().collect::<Vec<_>>(), after.keys().collect::<Vec<_>>());
        for (source, length) in before {
            assert!((after[&source] - length).abs() < 1e-9, "length of {source} changed");
        }
    }

    let found = matches(&job, &store);
    assert_eq!(pairs(&found), vec![(1, 1), (2, 2)]);
    assert_injective(&found);
    assert!(found.iter().all(|m| (m.positional_deviation - 2.0).abs() < 1e-9));

    let unmatched = lines(&job, &store, CollectionKind::UnmatchedReference);
    assert_eq!(unmatched.iter().map(|f| f.id.0).collect::<Vec<_>>(), vec![3]);
    let unmatched_cand = lines(&job, &store, CollectionKind::UnmatchedCandidate);
    assert!(unmatched_cand.is_empty());

    let vectors = segments(&job, &store, CollectionKind::DeviationVectors);
    assert_eq!(vectors.len(), 12);
    assert!(vectors.iter().all(|v| (v.length - 2.0).abs() < 1e-9));
}

#[test]
fn test_names_and_road_relations_are_compared() {
    let (reference, candidate, relations) = side_street();
    let (job, store) = run(config(true), reference, candidate, relations);

    let found = matches(&job, &store);
    for m in &found {
        assert_eq!(m.ref_name.as_deref(), Some("Hauptstraße"));
        assert_eq!(m.cand_name.as_deref(), Some("Hauptstrasse"));
        assert_eq!(m.relation_name.as_deref(), Some("B 27"));
        assert_eq!(m.name_similarity, Some(2));
    }
    match store.get(&job.name(CollectionKind::NameAgreement)) {
        Some(StoredCollection::Matches(agreeing)) => assert_eq!(agreeing.len(), 2),
        other => panic!("unexpected name agreement layer {other:?}"),
    }
    match store.get(&job.name(CollectionKind::NameDisagreement)) {
        Some(StoredCollection::Matches(disagreeing)) => assert!(disagreeing.is_empty()),
        other => panic!("unexpected name disagreement layer {other:?}"),
    }
}

#[test]
fn test_rerun_replaces_collections_with_identical_output() {
    let (reference, candidate, relations) = side_street();
    let (job, mut store) = run(config(true), reference, candidate, relations);
    let first = snapshot(&job, &store);
    assert!(first.iter().all(Option::is_some));

    job.run(&mut store, &Progress::silent()).unwrap();
    assert_eq!(snapshot(&job, &store), first);
}

#[test]
fn test_length_ratio_of_two_is_rejected() {
    let reference = network(vec![line(1, vec![(0.0, 0.0), (10.0, 0.0)])]);

    let twice = network(vec![line(1, vec![(0.0, 0.5), (20.0, 0.5)])]);
    let (job, store) = run(config(false), reference.clone(), twice, Vec::new());
    assert!(matches(&job, &store).is_empty());

    let just_below = network(vec![line(1, vec![(0.0, 0.5), (19.9, 0.5)])]);
    let (job, store) = run(config(false), reference, just_below, Vec::new());
    assert_eq!(pairs(&matches(&job, &store)), vec![(1, 1)]);
}

#[test]
fn test_equal_fit_goes_to_lower_reference_id() {
    let reference = network(vec![
        line(1, vec![(0.0, 1.0), (10.0, 1.0)]),
        line(2, vec![(0.0, -1.0), (10.0, -1.0)]),
    ]);
    let candidate = network(vec![line(1, vec![(0.0, 0.0), (10.0, 0.0)])]);
    let (job, store) = run(config(false), reference, candidate, Vec::new());
    assert_eq!(pairs(&matches(&job, &store)), vec![(1, 1)]);
}

#[test]
fn test_equal_fit_goes_to_first_candidate() {
    let reference = network(vec![line(1, vec![(0.0, 0.0), (10.0, 0.0)])]);
    let candidate = network(vec![
        line(1, vec![(0.0, 1.0), (10.0, 1.0)]),
        line(2, vec![(0.0, -1.0), (10.0, -1.0)]),
    ]);
    let (job, store) = run(config(false), reference, candidate, Vec::new());
    assert_eq!(pairs(&matches(&job, &store)), vec![(1, 1)]);
}

#[test]
fn test_without_harmonization_no_junction_layer() {
    let (reference, candidate, relations) = side_street();
    let job = DeviationJob::new("plain", config(false)).unwrap();
    let mut store = MemoryStore::new();
    job.import(&mut store, reference, candidate, relations).unwrap();
    let summary = job.run(&mut store, &Progress::silent()).unwrap();

    assert_eq!(summary.junction_matches, 0);
    assert_eq!(summary.candidate_cutpoints, 0);
    assert_eq!(summary.candidate_segments, 1);
    assert!(store.get(&job.name(CollectionKind::JunctionDeviationLines)).is_none());

    // the uncut candidate is too long for either reference half
    let cand = lines(&job, &store, CollectionKind::CandidateHarmonized);
    assert!(cand.features()[0].direction.is_some());
    assert!(matches(&job, &store).is_empty());
}

#[test]
fn test_dropped_receiver_cancels_before_anything_is_published() {
    let (reference, candidate, relations) = side_street();
    let job = DeviationJob::new("cancel", config(true)).unwrap();
    let mut store = MemoryStore::new();
    job.import(&mut store, reference, candidate, relations).unwrap();

    let (progress, events) = Progress::channel();
    drop(events);
    let err = job.run(&mut store, &progress).unwrap_err();
    assert!(matches!(err, DeviationError::Cancelled(Stage::Validate)));
    assert!(snapshot(&job, &store).iter().all(Option::is_none));
}

#[test]
fn test_missing_input_is_a_store_error() {
    let job = DeviationJob::new("empty", config(true)).unwrap();
    let mut store = MemoryStore::new();
    let err = job.run(&mut store, &Progress::silent()).unwrap_err();
    assert!(matches!(err, DeviationError::Store(StoreError::NotFound(_))));
}

/// Store that refuses to write one collection kind.
struct RefusingStore {
    inner: MemoryStore,
    refuse: CollectionKind,
}

impl FeatureStore for RefusingStore {
    fn load(&self, name: &CollectionName) -> Result<StoredCollection, StoreError> {
        self.inner.load(name)
    }

    fn contains(&self, name: &CollectionName) -> Result<bool, StoreError> {
        self.inner.contains(name)
    }

    fn replace(&mut self, name: CollectionName, collection: StoredCollection) -> Result<(), StoreError> {
        if name.kind == self.refuse {
            return Err(StoreError::Unavailable(format!("cannot write {name}")));
        }
        self.inner.replace(name, collection)
    }

    fn drop_collection(&mut self, name: &CollectionName) -> Result<bool, StoreError> {
        self.inner.drop_collection(name)
    }
}

#[test]
fn test_store_failure_keeps_earlier_stages() {
    let (reference, candidate, relations) = side_street();
    let job = DeviationJob::new("flaky", config(true)).unwrap();
    let mut store = RefusingStore {
        inner: MemoryStore::new(),
        refuse: CollectionKind::Matches,
    };
    job.import(&mut store, reference, candidate, relations).unwrap();

    let err = job.run(&mut store, &Progress::silent()).unwrap_err();
    assert!(matches!(err, DeviationError::Store(StoreError::Unavailable(_))));
    assert!(store.inner.get(&job.name(CollectionKind::ReferenceHarmonized)).is_some());
    assert!(store.inner.get(&job.name(CollectionKind::CandidateHarmonized)).is_some());
    assert!(store.inner.get(&job.name(CollectionKind::DeviationVectors)).is_none());
}
