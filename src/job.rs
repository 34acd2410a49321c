//! One deviation job: the two input networks of a map id, every collection
//! derived from them, and the stage sequence that builds those collections.

use crate::config::JobConfig;
use crate::error::{DeviationError, Result};
use crate::harmonize::{self, JunctionOffset, JunctionSet};
use crate::matching::{self, LineMatcher, MatchResult};
use crate::progress::{Dataset, Progress, Stage};
use crate::results::{self, ResultLayers};
use crate::store::{
    CollectionKind, CollectionName, FeatureStore, LineCollection, MapId, Relation, StoredCollection, load_lines,
    load_relations,
};
use crate::validation;
use log::{info, warn};
use serde::Serialize;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobSummary {
    pub reference_input: usize,
    pub candidate_input: usize,
    pub reference_segments: usize,
    pub candidate_segments: usize,
    pub junction_matches: usize,
    pub reference_cutpoints: usize,
    pub candidate_cutpoints: usize,
    pub matches: usize,
    pub published: usize,
}

struct Harmonized {
    reference: LineCollection,
    candidate: LineCollection,
    junction_lines: Option<Vec<JunctionOffset>>,
}

pub struct DeviationJob {
    map_id: MapId,
    config: JobConfig,
}

impl DeviationJob {
    pub fn new(map_id: &str, config: JobConfig) -> Result<Self> {
        let map_id = MapId::parse(map_id).ok_or_else(|| DeviationError::InvalidMapId(map_id.to_string()))?;
        config.validate()?;
        Ok(Self { map_id, config })
    }

    pub fn map_id(&self) -> &MapId {
        &self.map_id
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn name(&self, kind: CollectionKind) -> CollectionName {
        CollectionName::new(&self.map_id, kind)
    }

    /// Store the input networks (and optional candidate relations) under this job's map id.
    pub fn import(
        &self,
        store: &mut dyn FeatureStore,
        reference: LineCollection,
        candidate: LineCollection,
        relations: Vec<Relation>,
    ) -> Result<()> {
        validation::validate_network(Dataset::Reference, &reference)?;
        validation::validate_network(Dataset::Candidate, &candidate)?;
        store.replace(self.name(CollectionKind::ReferenceInput), StoredCollection::Lines(reference))?;
        store.replace(self.name(CollectionKind::CandidateInput), StoredCollection::Lines(candidate))?;
        store.replace(
            self.name(CollectionKind::CandidateRelations),
            StoredCollection::Relations(relations),
        )?;
        Ok(())
    }

    /// Drop every derived collection of this job. Returns how many existed.
    pub fn discard(&self, store: &mut dyn FeatureStore) -> Result<usize> {
        let mut dropped = 0;
        for kind in CollectionKind::DERIVED {
            if store.drop_collection(&self.name(kind))? {
                dropped += 1;
            }
        }
        Ok(dropped)
    }

    fn publish(
        &self,
        store: &mut dyn FeatureStore,
        summary: &mut JobSummary,
        kind: CollectionKind,
        collection: StoredCollection,
    ) -> Result<()> {
        store.replace(self.name(kind), collection)?;
        summary.published += 1;
        Ok(())
    }

    /// Run the whole pipeline, publishing each stage's collections as it finishes.
    pub fn run(&self, store: &mut dyn FeatureStore, progress: &Progress) -> Result<JobSummary> {
        let mut summary = JobSummary::default();

        progress.started(Stage::Validate)?;
        let reference = load_lines(store, &self.name(CollectionKind::ReferenceInput))?;
        let candidate = load_lines(store, &self.name(CollectionKind::CandidateInput))?;
        let relations = load_relations(store, &self.name(CollectionKind::CandidateRelations))?;
        validation::validate_network(Dataset::Reference, &reference)?;
        validation::validate_network(Dataset::Candidate, &candidate)?;
        summary.reference_input = reference.len();
        summary.candidate_input = candidate.len();
        let dropped = self.discard(store)?;
        if dropped > 0 {
            progress.note(Stage::Validate, format!("dropped {dropped} collections of a previous run"))?;
        }
        progress.finished(Stage::Validate, reference.len() + candidate.len())?;

        let harmonized = self.harmonize(&reference, &candidate, progress, &mut summary)?;
        summary.reference_segments = harmonized.reference.len();
        summary.candidate_segments = harmonized.candidate.len();
        self.publish(
            store,
            &mut summary,
            CollectionKind::ReferenceHarmonized,
            StoredCollection::Lines(harmonized.reference.clone()),
        )?;
        self.publish(
            store,
            &mut summary,
            CollectionKind::CandidateHarmonized,
            StoredCollection::Lines(harmonized.candidate.clone()),
        )?;
        if let Some(lines) = harmonized.junction_lines {
            self.publish(
                store,
                &mut summary,
                CollectionKind::JunctionDeviationLines,
                StoredCollection::JunctionOffsets(lines),
            )?;
        }

        let matches = self.line_match(&harmonized.reference, &harmonized.candidate, &relations, progress)?;
        summary.matches = matches.len();
        self.publish(
            store,
            &mut summary,
            CollectionKind::Matches,
            StoredCollection::Matches(matches.clone()),
        )?;

        progress.started(Stage::Results)?;
        let layers = results::build_results(
            &harmonized.reference,
            &harmonized.candidate,
            &matches,
            &self.config.results,
            self.config.matching.geographic,
        );
        progress.finished(Stage::Results, matches.len())?;

        progress.started(Stage::Publish)?;
        let before = summary.published;
        self.publish_layers(store, &mut summary, layers)?;
        progress.finished(Stage::Publish, summary.published - before)?;

        info!("Job {} finished: {:?}", self.map_id, summary);
        Ok(summary)
    }

    fn prepare(
        &self,
        dataset: Dataset,
        lines: &LineCollection,
        clean: Option<f64>,
        presplit: bool,
        progress: &Progress,
    ) -> Result<LineCollection> {
        let mut current = lines.clone();
        if let Some(radius) = clean {
            progress.started(Stage::Clean(dataset))?;
            let (cleaned, report) = harmonize::clean_network(&current, radius);
            progress.note(
                Stage::Clean(dataset),
                format!(
                    "{} junction snaps, {} line snaps, {} stubs removed",
                    report.snapped_to_junctions, report.snapped_to_lines, report.stubs_removed
                ),
            )?;
            progress.finished(Stage::Clean(dataset), cleaned.len())?;
            current = cleaned;
        }
        if presplit {
            progress.started(Stage::Presplit(dataset))?;
            current = harmonize::split_at_intersections(&current);
            progress.finished(Stage::Presplit(dataset), current.len())?;
        }
        Ok(current)
    }

    fn harmonize(
        &self,
        reference: &LineCollection,
        candidate: &LineCollection,
        progress: &Progress,
        summary: &mut JobSummary,
    ) -> Result<Harmonized> {
        let opts = &self.config.harmonize;
        let reference = self.prepare(
            Dataset::Reference,
            reference,
            opts.clean_reference.then_some(opts.clean_reference_radius),
            opts.presplit_reference,
            progress,
        )?;
        let candidate = self.prepare(
            Dataset::Candidate,
            candidate,
            opts.clean_candidate.then_some(opts.clean_candidate_radius),
            opts.presplit_candidate,
            progress,
        )?;

        if !opts.harmonize {
            // fresh ids and directions, no cuts
            return Ok(Harmonized {
                reference: harmonize::resegment(&reference, &[]),
                candidate: harmonize::resegment(&candidate, &[]),
                junction_lines: None,
            });
        }

        let mut ref_junctions = self.junctions(Dataset::Reference, &reference, progress)?;
        let mut cand_junctions = self.junctions(Dataset::Candidate, &candidate, progress)?;

        progress.started(Stage::JunctionMatching)?;
        let junction_matches = harmonize::match_junctions(&mut ref_junctions, &mut cand_junctions, opts);
        let junction_lines = harmonize::junction_deviation_lines(&junction_matches, &ref_junctions, &cand_junctions);
        summary.junction_matches = junction_matches.len();
        progress.finished(Stage::JunctionMatching, junction_matches.len())?;

        progress.started(Stage::Cutpoints(Dataset::Candidate))?;
        let cand_cuts = harmonize::generate_cutpoints(&candidate, &reference, &ref_junctions, opts);
        summary.candidate_cutpoints = cand_cuts.len();
        progress.finished(Stage::Cutpoints(Dataset::Candidate), cand_cuts.len())?;

        progress.started(Stage::Cutpoints(Dataset::Reference))?;
        let ref_cuts = harmonize::generate_cutpoints(&reference, &candidate, &cand_junctions, opts);
        summary.reference_cutpoints = ref_cuts.len();
        progress.finished(Stage::Cutpoints(Dataset::Reference), ref_cuts.len())?;

        progress.started(Stage::Resegment(Dataset::Reference))?;
        let reference = harmonize::resegment(&reference, &ref_cuts);
        progress.finished(Stage::Resegment(Dataset::Reference), reference.len())?;

        progress.started(Stage::Resegment(Dataset::Candidate))?;
        let candidate = harmonize::resegment(&candidate, &cand_cuts);
        progress.finished(Stage::Resegment(Dataset::Candidate), candidate.len())?;

        Ok(Harmonized {
            reference,
            candidate,
            junction_lines: Some(junction_lines),
        })
    }

    fn junctions(&self, dataset: Dataset, lines: &LineCollection, progress: &Progress) -> Result<JunctionSet> {
        progress.started(Stage::Junctions(dataset))?;
        let set = harmonize::build_junctions(lines);
        progress.finished(Stage::Junctions(dataset), set.junctions.len())?;
        Ok(set)
    }

    fn line_match(
        &self,
        reference: &LineCollection,
        candidate: &LineCollection,
        relations: &[Relation],
        progress: &Progress,
    ) -> Result<Vec<MatchResult>> {
        let opts = &self.config.matching;
        let matcher = LineMatcher::new(reference, candidate, opts);

        progress.started(Stage::CandidateSearch)?;
        let potential = matcher.potential_matches();
        progress.finished(Stage::CandidateSearch, potential.len())?;

        progress.started(Stage::Scoring)?;
        let scored = matcher.score(&potential);
        progress.finished(Stage::Scoring, scored.len())?;

        progress.started(Stage::Selection)?;
        let mut results = matcher.select(&scored);
        progress.finished(Stage::Selection, results.len())?;

        progress.started(Stage::NameSimilarity)?;
        matching::enrich_names(&mut results, relations, opts);
        progress.finished(Stage::NameSimilarity, results.len())?;
        if results.is_empty() {
            warn!(
                "Job {}: no matches between {} reference and {} candidate segments",
                self.map_id,
                reference.len(),
                candidate.len()
            );
        }
        Ok(results)
    }

    fn publish_layers(&self, store: &mut dyn FeatureStore, summary: &mut JobSummary, layers: ResultLayers) -> Result<()> {
        let ResultLayers {
            deviation_vectors,
            matched_reference,
            matched_candidate,
            unmatched_reference,
            unmatched_candidate,
            name_agreement,
            name_disagreement,
            max_deviation_grid,
            matching_rate_grid,
            completeness_grid,
        } = layers;

        let mut pending: Vec<(CollectionKind, StoredCollection)> = Vec::new();
        if let Some(v) = deviation_vectors {
            pending.push((CollectionKind::DeviationVectors, StoredCollection::Segments(v)));
        }
        for (kind, lines) in [
            (CollectionKind::MatchedReference, matched_reference),
            (CollectionKind::MatchedCandidate, matched_candidate),
            (CollectionKind::UnmatchedReference, unmatched_reference),
            (CollectionKind::UnmatchedCandidate, unmatched_candidate),
        ] {
            if let Some(lines) = lines {
                pending.push((kind, StoredCollection::Lines(lines)));
            }
        }
        for (kind, matches) in [
            (CollectionKind::NameAgreement, name_agreement),
            (CollectionKind::NameDisagreement, name_disagreement),
        ] {
            if let Some(matches) = matches {
                pending.push((kind, StoredCollection::Matches(matches)));
            }
        }
        for (kind, cells) in [
            (CollectionKind::MaxDeviationGrid, max_deviation_grid),
            (CollectionKind::MatchingRateGrid, matching_rate_grid),
            (CollectionKind::CompletenessGrid, completeness_grid),
        ] {
            if let Some(cells) = cells {
                pending.push((kind, StoredCollection::Grid(cells)));
            }
        }

        for (kind, collection) in pending {
            self.publish(store, summary, kind, collection)?;
        }
        Ok(())
    }
}
