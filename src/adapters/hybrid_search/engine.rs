//! Score fusion and result shaping
//!
//! Takes the candidate set (records with their dense scores), computes the
//! sparse branch, fuses per the configured strategy, applies the
//! post-scoring adjustments in their fixed order, enforces the stratified
//! per-context-level cap, and emits results with the full score breakdown.
//!
//! Adjustment order: lifecycle weight, importance factor, trust score,
//! stratified cap, optional recency shaping. Ties break by adjusted score,
//! then importance, then newer `updated_at`, then lexicographically smaller
//! id.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::domain::lifecycle;
use crate::domain::types::{
    Confidence, ContextLevel, FusionKind, MemoryRecord, ScoreBreakdown, ScoredMemory, SearchMode,
};
use crate::infrastructure::config::HybridConfig;

use super::bm25::{BM25Params, BM25Scorer};

/// Metadata key carrying an externally assigned trust multiplier
const TRUST_KEY: &str = "trust_score";

/// Fuses dense and sparse rankings into the final result list
pub struct HybridRanker {
    config: HybridConfig,
    scorer: BM25Scorer,
}

impl HybridRanker {
    /// Build a ranker from retrieval settings
    pub fn new(config: HybridConfig) -> Self {
        Self {
            config,
            scorer: BM25Scorer::new(BM25Params::default()),
        }
    }

    /// Rank candidates for a query.
    ///
    /// `candidates` carry the dense cosine score from the ANN search (zero
    /// in pure keyword mode). `recency_requested` enables the date-range
    /// shaping used when the caller filtered by date explicitly.
    pub fn rank(
        &self,
        query: &str,
        mode: SearchMode,
        candidates: Vec<(MemoryRecord, f32)>,
        k: usize,
        min_score: Option<f32>,
        recency_requested: bool,
        now: DateTime<Utc>,
    ) -> Vec<ScoredMemory> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let contents: Vec<&str> = candidates
            .iter()
            .map(|(record, _)| record.content.as_str())
            .collect();
        let keyword_scores = match mode {
            SearchMode::Semantic => vec![0.0; candidates.len()],
            _ => self.scorer.score(query, &contents),
        };

        let fused = self.fuse(mode, &candidates, &keyword_scores);

        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .zip(keyword_scores)
            .zip(fused)
            .map(|(((record, semantic), keyword), fused)| {
                let adjusted = self.adjust(&record, fused, recency_requested, now);
                ScoredMemory {
                    score: adjusted,
                    scores: ScoreBreakdown {
                        semantic,
                        keyword,
                        fused,
                        adjusted,
                    },
                    confidence: Confidence::from_score(adjusted),
                    record,
                }
            })
            .collect();

        if let Some(min) = min_score {
            scored.retain(|s| s.score >= min);
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.record.importance.total_cmp(&a.record.importance))
                .then_with(|| b.record.updated_at.cmp(&a.record.updated_at))
                .then_with(|| a.record.id.cmp(&b.record.id))
        });

        // Stratified cap: no context level may dominate the final top-k.
        let mut per_level: HashMap<ContextLevel, usize> = HashMap::new();
        let mut out = Vec::with_capacity(k);
        for item in scored {
            let taken = per_level.entry(item.record.context_level).or_insert(0);
            if *taken >= self.config.cap_per_level {
                continue;
            }
            *taken += 1;
            out.push(item);
            if out.len() == k {
                break;
            }
        }
        out
    }

    fn fuse(
        &self,
        mode: SearchMode,
        candidates: &[(MemoryRecord, f32)],
        keyword_scores: &[f32],
    ) -> Vec<f32> {
        match mode {
            SearchMode::Semantic => candidates.iter().map(|(_, s)| *s).collect(),
            SearchMode::Keyword => keyword_scores.to_vec(),
            SearchMode::Hybrid => match self.config.fusion {
                FusionKind::Linear => {
                    let alpha = self.config.alpha;
                    candidates
                        .iter()
                        .zip(keyword_scores)
                        .map(|((_, semantic), keyword)| {
                            alpha * semantic + (1.0 - alpha) * keyword
                        })
                        .collect()
                }
                FusionKind::Rrf => self.rrf(candidates, keyword_scores),
            },
        }
    }

    /// Reciprocal-rank fusion, normalized back into [0, 1]
    fn rrf(&self, candidates: &[(MemoryRecord, f32)], keyword_scores: &[f32]) -> Vec<f32> {
        let rrf_k = self.config.rrf_k as f32;

        let rank_of = |scores: Vec<(usize, f32)>| -> Vec<usize> {
            let mut order: Vec<(usize, f32)> = scores;
            order.sort_by(|a, b| b.1.total_cmp(&a.1));
            let mut ranks = vec![0usize; order.len()];
            for (rank, (idx, _)) in order.into_iter().enumerate() {
                ranks[idx] = rank + 1;
            }
            ranks
        };

        let semantic_ranks = rank_of(
            candidates
                .iter()
                .enumerate()
                .map(|(i, (_, s))| (i, *s))
                .collect(),
        );
        let keyword_ranks = rank_of(keyword_scores.iter().copied().enumerate().collect());

        let mut fused: Vec<f32> = (0..candidates.len())
            .map(|i| {
                1.0 / (rrf_k + semantic_ranks[i] as f32) + 1.0 / (rrf_k + keyword_ranks[i] as f32)
            })
            .collect();
        let max = fused.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            for score in &mut fused {
                *score /= max;
            }
        }
        fused
    }

    fn adjust(
        &self,
        record: &MemoryRecord,
        fused: f32,
        recency_requested: bool,
        now: DateTime<Utc>,
    ) -> f32 {
        // Lifecycle weight first, recomputed from the clock rather than the
        // stored state so ranking never depends on a stale sweep.
        let mut score = fused * lifecycle::classify(record, now).search_weight();

        // Importance factor.
        score *= 0.5 + 0.5 * record.importance;

        // Trust multiplier, when recorded in the payload.
        if let Some(trust) = record
            .metadata
            .get(TRUST_KEY)
            .and_then(|v| v.as_f64())
        {
            score *= trust.clamp(0.0, 1.0) as f32;
        }

        // Recency shaping only when the caller asked for a date window.
        // The stratified cap runs after sorting, in `rank`.
        if recency_requested {
            let age = now - record.updated_at;
            if age <= Duration::days(7) {
                score *= 1.1;
            } else if age > Duration::days(90) {
                score *= 0.9;
            }
        }

        score.clamp(0.0, 1.0)
    }
}
