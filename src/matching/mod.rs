//! Two-stage line matching between the harmonized networks.
//!
//! Stage one collects, per reference segment, a short list of nearby candidate
//! segments using cheap tests (distance, length ratio, direction). Stage two
//! scores each pair with sampled positional deviation and a Hausdorff
//! approximation, filters, and reduces the survivors to a 1:1 correspondence.

pub mod names;
pub mod scoring;

use crate::config::MatchOptions;
use crate::geometry;
use crate::store::{FeatureId, LineCollection, LineFeature, LineIndex, Relation};
use log::{debug, info};
use scoring::PairMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stage-one pairing, by position in the two collections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PotentialMatch {
    pub reference: usize,
    pub candidate: usize,
    pub distance: f64,
}

/// A scored pair that passed the stage-two filters.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub ref_id: FeatureId,
    pub cand_id: FeatureId,
    pub metrics: PairMetrics,
    pub fit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub ref_id: FeatureId,
    pub cand_id: FeatureId,
    pub ref_source_id: FeatureId,
    pub cand_source_id: FeatureId,
    pub fit: f64,
    pub deviation: f64,
    pub positional_deviation: f64,
    pub length_diff: f64,
    pub ref_name: Option<String>,
    pub cand_name: Option<String>,
    pub relation_name: Option<String>,
    pub name_similarity: Option<usize>,
    pub relation_name_similarity: Option<usize>,
}

pub struct LineMatcher<'a> {
    reference: &'a LineCollection,
    candidate: &'a LineCollection,
    options: &'a MatchOptions,
}

impl<'a> LineMatcher<'a> {
    pub fn new(reference: &'a LineCollection, candidate: &'a LineCollection, options: &'a MatchOptions) -> Self {
        Self {
            reference,
            candidate,
            options,
        }
    }

    fn long_enough(&self, feature: &LineFeature) -> bool {
        feature.length() > self.options.min_feature_length
    }

    /// Stage one. Per reference segment, at most `max_candidates` candidates
    /// ordered by distance, then candidate id.
    pub fn potential_matches(&self) -> Vec<PotentialMatch> {
        let index = LineIndex::build(self.candidate);
        let candidates = self.candidate.features();
        let mut out = Vec::new();

        for (ri, r) in self.reference.iter().enumerate() {
            if !self.long_enough(r) {
                continue;
            }
            let r_len = r.length();
            let mut near: Vec<PotentialMatch> = index
                .within_of_line(r.coords(), self.options.search_radius)
                .into_iter()
                .filter(|&(ci, _)| {
                    let c = &candidates[ci];
                    self.long_enough(c)
                        && scoring::length_ratio(r_len, c.length()) < self.options.max_length_ratio
                        && scoring::direction_diff(r, c) <= self.options.max_angle_diff
                })
                .map(|(ci, distance)| PotentialMatch {
                    reference: ri,
                    candidate: ci,
                    distance,
                })
                .collect();
            near.sort_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then(candidates[a.candidate].id.cmp(&candidates[b.candidate].id))
            });
            near.truncate(self.options.max_candidates);
            out.extend(near);
        }

        info!(
            "Collected {} potential matches for {} reference segments",
            out.len(),
            self.reference.len()
        );
        out
    }

    /// Stage two: metrics, filters and fit, keeping stage-one order.
    pub fn score(&self, potential: &[PotentialMatch]) -> Vec<MatchCandidate> {
        let scored: Vec<MatchCandidate> = potential
            .iter()
            .filter_map(|p| {
                let r = &self.reference.features()[p.reference];
                let c = &self.candidate.features()[p.candidate];
                let metrics = scoring::measure(r, c, self.options);
                if !scoring::passes_filters(&metrics, self.options) {
                    debug!("Filtered pair {} / {}: {:?}", r.id, c.id, metrics);
                    return None;
                }
                Some(MatchCandidate {
                    ref_id: r.id,
                    cand_id: c.id,
                    fit: scoring::fit(&metrics, self.options),
                    metrics,
                })
            })
            .collect();
        info!("{} of {} potential matches passed scoring", scored.len(), potential.len());
        scored
    }

    /// Reduce scored pairs to a 1:1 correspondence: the best candidate per
    /// reference segment, then the best reference segment per candidate.
    pub fn select(&self, scored: &[MatchCandidate]) -> Vec<MatchResult> {
        let mut per_ref: BTreeMap<FeatureId, &MatchCandidate> = BTreeMap::new();
        for m in scored {
            let better = per_ref.get(&m.ref_id).is_none_or(|best| m.fit < best.fit);
            if better {
                per_ref.insert(m.ref_id, m);
            }
        }

        // ascending ref ids, so the first seen wins on equal fit
        let mut per_cand: BTreeMap<FeatureId, &MatchCandidate> = BTreeMap::new();
        for m in per_ref.values() {
            let better = per_cand.get(&m.cand_id).is_none_or(|best| m.fit < best.fit);
            if better {
                per_cand.insert(m.cand_id, m);
            }
        }

        let mut results: Vec<MatchResult> = per_cand.values().filter_map(|m| self.result_for(m)).collect();
        results.sort_by_key(|r| r.ref_id);
        info!("Selected {} matching pairs", results.len());
        results
    }

    fn result_for(&self, m: &MatchCandidate) -> Option<MatchResult> {
        let r = self.reference.get(m.ref_id)?;
        let c = self.candidate.get(m.cand_id)?;
        let length_diff = if self.options.geographic {
            (geometry::haversine_length(r.coords()) - geometry::haversine_length(c.coords())).abs()
        } else {
            (r.length() - c.length()).abs()
        };
        let name_key = self.options.name_attribute.as_str();

        Some(MatchResult {
            ref_id: r.id,
            cand_id: c.id,
            ref_source_id: r.lineage.source_id,
            cand_source_id: c.lineage.source_id,
            fit: m.fit,
            deviation: m.fit / 4.0,
            positional_deviation: m.metrics.positional_deviation,
            length_diff,
            ref_name: r.text_attribute(name_key).map(str::to_string),
            cand_name: c.text_attribute(name_key).map(str::to_string),
            relation_name: None,
            name_similarity: None,
            relation_name_similarity: None,
        })
    }

    /// All three stages in one go.
    pub fn run(&self) -> Vec<MatchResult> {
        let potential = self.potential_matches();
        let scored = self.score(&potential);
        self.select(&scored)
    }
}

/// Attach road relation names and, when enabled, name edit distances.
pub fn enrich_names(results: &mut [MatchResult], relations: &[Relation], options: &MatchOptions) {
    let mut compared = 0usize;
    for m in results.iter_mut() {
        m.relation_name = names::road_relation_name(relations, m.cand_source_id).map(str::to_string);
        if !options.compute_name_similarity {
            continue;
        }
        if let (Some(a), Some(b)) = (&m.ref_name, &m.cand_name) {
            m.name_similarity = Some(names::name_distance(a, b));
            compared += 1;
        }
        if let (Some(a), Some(rel)) = (&m.ref_name, &m.relation_name) {
            m.relation_name_similarity = Some(names::name_distance(a, rel));
        }
    }
    info!("Compared names of {} of {} matches", compared, results.len());
}
