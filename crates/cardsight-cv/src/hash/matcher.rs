//! Region -> symbol identity, with cross-validation between hash spaces

use super::index::Neighbor;
use super::{FeatureVector, HashExtractor, HashKind};
use crate::traits::SymbolIndex;
use cardsight_core::SymbolId;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Candidates inspected when building tie sets.
const TIE_DEPTH: usize = 3;

/// Thresholds for the dual-hash matcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Accept immediately when either space is at least this close.
    pub strict_distance: u32,
    /// Reject when either space's nearest distance is above this.
    pub accept_distance: u32,
    /// Minimum gap between the nearest and the next distinct distance.
    pub min_margin: u32,
    /// Neighbours requested per query (the index contract guarantees 4).
    pub top_k: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            strict_distance: 3,
            accept_distance: 12,
            min_margin: 2,
            top_k: 4,
        }
    }
}

/// Thresholds for a single-hash matcher (controls, digits).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleMatchConfig {
    pub accept_distance: u32,
    pub min_margin: u32,
    pub top_k: usize,
}

impl Default for SingleMatchConfig {
    fn default() -> Self {
        Self {
            accept_distance: 10,
            min_margin: 2,
            top_k: 4,
        }
    }
}

/// Why a match was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    StrictAccept,
    CrossValidated,
    Accepted,
    NoCandidates,
    Disagreement,
    Ambiguous,
    AboveThreshold,
    LowMargin,
}

/// Result of classifying one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub id: Option<SymbolId>,
    /// Confidence distance: the smallest nearest distance over all spaces.
    pub distance: u32,
    pub verdict: Verdict,
    /// Raw top-3 distances per hash space, for diagnostics.
    pub tops: Vec<(HashKind, Vec<u32>)>,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        self.id.is_some()
    }

    fn reject(verdict: Verdict, distance: u32, tops: Vec<(HashKind, Vec<u32>)>) -> Self {
        Self { id: None, distance, verdict, tops }
    }
}

fn top_distances(neighbors: &[Neighbor]) -> Vec<u32> {
    neighbors.iter().take(TIE_DEPTH).map(|n| n.distance).collect()
}

fn canonical(aliases: &HashMap<SymbolId, SymbolId>, id: SymbolId) -> SymbolId {
    aliases.get(&id).copied().unwrap_or(id)
}

/// Canonical ids among the first three neighbours that tie with the nearest.
fn tie_set(neighbors: &[Neighbor], aliases: &HashMap<SymbolId, SymbolId>) -> BTreeSet<SymbolId> {
    let Some(nearest) = neighbors.first() else {
        return BTreeSet::new();
    };
    neighbors
        .iter()
        .take(TIE_DEPTH)
        .filter(|n| n.distance == nearest.distance)
        .map(|n| canonical(aliases, n.id))
        .collect()
}

/// Whether the nearest cluster is separated from the next distinct distance.
///
/// When every returned neighbour ties and the index returned fewer than
/// `top_k` results, the index is exhausted and there is nothing to compete
/// with, so the margin passes.
fn has_margin(neighbors: &[Neighbor], top_k: usize, min_margin: u32) -> bool {
    let Some(nearest) = neighbors.first() else {
        return false;
    };
    match neighbors.iter().find(|n| n.distance > nearest.distance) {
        Some(next) => next.distance - nearest.distance >= min_margin,
        None => neighbors.len() < top_k,
    }
}

/// Dual-hash matcher: difference and average hashes queried against their own
/// indices; a match needs both spaces to agree on exactly one symbol.
pub struct DualHashMatcher {
    extractor: HashExtractor,
    dhash_index: Arc<dyn SymbolIndex>,
    ahash_index: Arc<dyn SymbolIndex>,
    aliases: HashMap<SymbolId, SymbolId>,
    config: MatchConfig,
}

impl DualHashMatcher {
    pub fn new(
        extractor: HashExtractor,
        dhash_index: Arc<dyn SymbolIndex>,
        ahash_index: Arc<dyn SymbolIndex>,
        config: MatchConfig,
    ) -> Self {
        Self {
            extractor,
            dhash_index,
            ahash_index,
            aliases: HashMap::new(),
            config,
        }
    }

    pub fn with_aliases(mut self, aliases: HashMap<SymbolId, SymbolId>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn extractor(&self) -> &HashExtractor {
        &self.extractor
    }

    pub fn match_region(&self, region: &GrayImage) -> MatchOutcome {
        let dhash = self.extractor.difference(region);
        let ahash = self.extractor.average(region);
        self.match_vectors(&dhash, &ahash)
    }

    pub fn match_vectors(&self, dhash: &FeatureVector, ahash: &FeatureVector) -> MatchOutcome {
        let k = self.config.top_k.max(TIE_DEPTH + 1);
        let d = self.dhash_index.query(dhash, k);
        let a = self.ahash_index.query(ahash, k);
        self.decide(&d, &a, k)
    }

    fn decide(&self, d: &[Neighbor], a: &[Neighbor], k: usize) -> MatchOutcome {
        let tops = vec![
            (HashKind::Difference, top_distances(d)),
            (HashKind::Average, top_distances(a)),
        ];

        let (Some(d0), Some(a0)) = (d.first(), a.first()) else {
            return MatchOutcome::reject(Verdict::NoCandidates, u32::MAX, tops);
        };
        let distance = d0.distance.min(a0.distance);

        // dhash first: it separates look-alike cards better.
        for nearest in [d0, a0] {
            if nearest.distance <= self.config.strict_distance {
                return MatchOutcome {
                    id: Some(canonical(&self.aliases, nearest.id)),
                    distance: nearest.distance,
                    verdict: Verdict::StrictAccept,
                    tops,
                };
            }
        }

        let d_ties = tie_set(d, &self.aliases);
        let a_ties = tie_set(a, &self.aliases);
        let shared: Vec<SymbolId> = d_ties.intersection(&a_ties).copied().collect();
        let id = match shared.as_slice() {
            [id] => *id,
            [] => return MatchOutcome::reject(Verdict::Disagreement, distance, tops),
            _ => return MatchOutcome::reject(Verdict::Ambiguous, distance, tops),
        };

        if d0.distance > self.config.accept_distance || a0.distance > self.config.accept_distance {
            return MatchOutcome::reject(Verdict::AboveThreshold, distance, tops);
        }

        if !has_margin(d, k, self.config.min_margin) || !has_margin(a, k, self.config.min_margin) {
            return MatchOutcome::reject(Verdict::LowMargin, distance, tops);
        }

        MatchOutcome {
            id: Some(id),
            distance,
            verdict: Verdict::CrossValidated,
            tops,
        }
    }
}

/// Single-space matcher for controls and digit glyphs.
pub struct SingleHashMatcher {
    extractor: HashExtractor,
    kind: HashKind,
    index: Arc<dyn SymbolIndex>,
    aliases: HashMap<SymbolId, SymbolId>,
    config: SingleMatchConfig,
}

impl SingleHashMatcher {
    pub fn new(
        extractor: HashExtractor,
        kind: HashKind,
        index: Arc<dyn SymbolIndex>,
        config: SingleMatchConfig,
    ) -> Self {
        Self {
            extractor,
            kind,
            index,
            aliases: HashMap::new(),
            config,
        }
    }

    pub fn with_aliases(mut self, aliases: HashMap<SymbolId, SymbolId>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    pub fn extractor(&self) -> &HashExtractor {
        &self.extractor
    }

    pub fn match_region(&self, region: &GrayImage) -> MatchOutcome {
        let vector = self.extractor.extract(self.kind, region);
        self.match_vector(&vector)
    }

    pub fn match_vector(&self, vector: &FeatureVector) -> MatchOutcome {
        let k = self.config.top_k.max(TIE_DEPTH + 1);
        let neighbors = self.index.query(vector, k);
        let tops = vec![(self.kind, top_distances(&neighbors))];

        let Some(nearest) = neighbors.first() else {
            return MatchOutcome::reject(Verdict::NoCandidates, u32::MAX, tops);
        };
        let distance = nearest.distance;

        if distance > self.config.accept_distance {
            return MatchOutcome::reject(Verdict::AboveThreshold, distance, tops);
        }

        let ties = tie_set(&neighbors, &self.aliases);
        if ties.len() != 1 {
            return MatchOutcome::reject(Verdict::Ambiguous, distance, tops);
        }

        if !has_margin(&neighbors, k, self.config.min_margin) {
            return MatchOutcome::reject(Verdict::LowMargin, distance, tops);
        }

        MatchOutcome {
            id: Some(canonical(&self.aliases, nearest.id)),
            distance,
            verdict: Verdict::Accepted,
            tops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Index that answers every query with a fixed ranking.
    struct FixedIndex(Vec<Neighbor>);

    impl FixedIndex {
        fn of(pairs: &[(u32, u32)]) -> Arc<dyn SymbolIndex> {
            Arc::new(Self(
                pairs
                    .iter()
                    .map(|&(id, distance)| Neighbor { id: SymbolId(id), distance })
                    .collect(),
            ))
        }
    }

    impl SymbolIndex for FixedIndex {
        fn bits(&self) -> usize {
            64
        }

        fn query(&self, _vector: &FeatureVector, k: usize) -> Vec<Neighbor> {
            self.0.iter().copied().take(k).collect()
        }
    }

    fn matcher(d: &[(u32, u32)], a: &[(u32, u32)]) -> DualHashMatcher {
        DualHashMatcher::new(
            HashExtractor::new(8),
            FixedIndex::of(d),
            FixedIndex::of(a),
            MatchConfig::default(),
        )
    }

    fn run(m: &DualHashMatcher) -> MatchOutcome {
        let v = FeatureVector::zeros(64);
        m.match_vectors(&v, &v)
    }

    #[test]
    fn test_disagreeing_spaces_never_match() {
        let m = matcher(&[(5, 6), (8, 9), (2, 11), (3, 12)], &[(7, 6), (9, 10), (4, 11), (1, 13)]);
        for _ in 0..10 {
            let outcome = run(&m);
            assert_eq!(outcome.id, None);
            assert_eq!(outcome.verdict, Verdict::Disagreement);
        }
    }

    #[test]
    fn test_strict_accept_prefers_difference_hash() {
        let m = matcher(&[(5, 2), (8, 9)], &[(7, 1), (9, 10)]);
        let outcome = run(&m);
        assert_eq!(outcome.id, Some(SymbolId(5)));
        assert_eq!(outcome.verdict, Verdict::StrictAccept);
        assert_eq!(outcome.distance, 2);
    }

    #[test]
    fn test_cross_validation_resolves_single_space_tie() {
        let m = matcher(&[(5, 6), (7, 6), (9, 10), (11, 12)], &[(5, 5), (8, 9), (3, 10), (4, 11)]);
        let outcome = run(&m);
        assert_eq!(outcome.id, Some(SymbolId(5)));
        assert_eq!(outcome.verdict, Verdict::CrossValidated);
        assert_eq!(outcome.distance, 5);
        assert_eq!(outcome.tops[0], (HashKind::Difference, vec![6, 6, 10]));
        assert_eq!(outcome.tops[1], (HashKind::Average, vec![5, 9, 10]));
    }

    #[test]
    fn test_shared_tie_is_ambiguous() {
        let m = matcher(&[(5, 6), (7, 6), (9, 10), (1, 11)], &[(7, 5), (5, 5), (8, 9), (1, 11)]);
        assert_eq!(run(&m).verdict, Verdict::Ambiguous);
    }

    #[test]
    fn test_threshold_and_margin_gates() {
        let far = matcher(&[(5, 14), (6, 20), (7, 21), (8, 22)], &[(5, 13), (6, 20), (7, 21), (8, 22)]);
        assert_eq!(run(&far).verdict, Verdict::AboveThreshold);

        let crowded = matcher(&[(5, 6), (6, 7), (7, 12), (8, 13)], &[(5, 6), (8, 10), (7, 12), (6, 13)]);
        assert_eq!(run(&crowded).verdict, Verdict::LowMargin);
    }

    #[test]
    fn test_aliases_collapse_into_canonical_id() {
        let aliases = HashMap::from([(SymbolId(15), SymbolId(5))]);
        let m = matcher(&[(5, 6), (15, 6), (9, 10), (10, 11)], &[(15, 6), (8, 10), (9, 11), (1, 12)])
            .with_aliases(aliases);
        let outcome = run(&m);
        assert_eq!(outcome.id, Some(SymbolId(5)));
    }

    #[test]
    fn test_single_matcher_gates() {
        let single = |pairs: &[(u32, u32)]| {
            SingleHashMatcher::new(
                HashExtractor::new(8),
                HashKind::Perceptual,
                FixedIndex::of(pairs),
                SingleMatchConfig::default(),
            )
        };
        let v = FeatureVector::zeros(64);

        assert_eq!(single(&[(3, 1), (4, 9)]).match_vector(&v).id, Some(SymbolId(3)));
        assert_eq!(single(&[(3, 0)]).match_vector(&v).id, Some(SymbolId(3)));
        assert_eq!(single(&[(3, 4), (4, 4), (5, 9), (6, 9)]).match_vector(&v).verdict, Verdict::Ambiguous);
        assert_eq!(single(&[(3, 4), (4, 5), (5, 9), (6, 9)]).match_vector(&v).verdict, Verdict::LowMargin);
        assert_eq!(single(&[(3, 11), (4, 20)]).match_vector(&v).verdict, Verdict::AboveThreshold);
        assert_eq!(single(&[]).match_vector(&v).verdict, Verdict::NoCandidates);
    }
}
