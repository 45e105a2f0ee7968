//! Hybrid retrieval over a [`TenantIndex`].
//!
//! The retriever is pure: it receives the tenant's current index (if any),
//! the final query text, and an optional pre-computed query embedding, and
//! returns a [`Retrieval`]. Embedding the query and calling the generation
//! collaborator are the caller's job.
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Score every chunk three ways: semantic cosine (`-1..1`), TF-IDF
//!    cosine (`0..1`), and BM25 (`>= 0`).
//! 2. Normalize: `semantic = (cos + 1) / 2`; `bm25 = bm25 / max(bm25)`
//!    (all zero when the max is zero).
//! 3. Merge: `score = w × semantic + (1 - w) × bm25`. When no query
//!    embedding is available the TF-IDF cosine stands in for the semantic
//!    signal.
//! 4. Sort by score (desc), then chunk position (asc).
//! 5. Truncate to `top_k`; below-threshold best score → [`Retrieval::NoMatch`].

use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::index::TenantIndex;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalParams {
    /// Weight for semantic vs BM25: `score = w*semantic + (1-w)*bm25`.
    pub fusion_weight: f64,
    /// Maximum hits to return.
    pub top_k: usize,
    /// Minimum rank-1 score for a match (inclusive).
    pub confidence_threshold: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            fusion_weight: 0.7,
            top_k: 3,
            confidence_threshold: 0.1,
        }
    }
}

/// Which signal filled the semantic slot of the fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticSignal {
    Embedding,
    TfIdfFallback,
}

/// Scoring breakdown for a hit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreExplanation {
    /// Normalized semantic score, `[0.0, 1.0]`.
    pub semantic_score: f64,
    /// Normalized BM25 score, `[0.0, 1.0]`.
    pub bm25_score: f64,
    /// TF-IDF cosine, `[0.0, 1.0]`.
    pub tfidf_score: f64,
    /// The fusion weight used.
    pub weight: f64,
    pub semantic_signal: SemanticSignal,
}

/// One ranked chunk.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    /// Position of the chunk in the tenant index.
    pub position: usize,
    pub text: String,
    pub source: String,
    /// Fused relevance score in `[0.0, 1.0]`.
    pub score: f64,
    pub explain: ScoreExplanation,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalMatch {
    /// Above-threshold hits in rank order.
    pub hits: Vec<Hit>,
    /// Hit texts joined by single spaces, in rank order.
    pub context: String,
    /// Source of the rank-1 hit.
    pub primary_source: String,
    /// Rank-1 fused score.
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Retrieval {
    /// The tenant has no index.
    NotFound,
    /// The best fused score is under the confidence threshold.
    NoMatch { best_score: f64 },
    Matched(RetrievalMatch),
}

impl Retrieval {
    /// Rank-1 score for a match, `0.0` otherwise.
    pub fn confidence(&self) -> f64 {
        match self {
            Retrieval::Matched(m) => m.confidence,
            _ => 0.0,
        }
    }
}

/// Map cosine similarity from `[-1, 1]` onto `[0, 1]`.
///
/// A non-finite cosine scores zero.
pub fn normalize_semantic(cosine: f64) -> f64 {
    unit_or_zero((cosine + 1.0) / 2.0)
}

/// Divide every score by the batch maximum; all zero when the max is zero.
/// Non-finite scores count as zero.
pub fn normalize_by_max(scores: &[f64]) -> Vec<f64> {
    let max = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(0.0f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| unit_or_zero(s / max)).collect()
}

/// Weighted merge of a semantic and a BM25 score, both already in `[0, 1]`.
pub fn fuse(semantic: f64, bm25: f64, weight: f64) -> f64 {
    unit_or_zero(weight * semantic + (1.0 - weight) * bm25)
}

fn unit_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Score `query` against the tenant index and rank the chunks.
pub fn retrieve(
    index: Option<&TenantIndex>,
    query: &str,
    query_vec: Option<&[f32]>,
    params: &RetrievalParams,
) -> Retrieval {
    let Some(index) = index else {
        return Retrieval::NotFound;
    };
    if index.is_empty() {
        return Retrieval::NoMatch { best_score: 0.0 };
    }

    let tfidf_query = index.tfidf().transform(query);
    let tfidf_scores = index.tfidf().cosine_scores(&tfidf_query);
    let bm25_norm = normalize_by_max(&index.bm25().scores(query));

    let (semantic_norm, signal): (Vec<f64>, SemanticSignal) = match query_vec {
        Some(qv) => (
            index
                .embeddings()
                .iter()
                .map(|e| normalize_semantic(cosine_similarity(qv, e) as f64))
                .collect(),
            SemanticSignal::Embedding,
        ),
        None => (tfidf_scores.clone(), SemanticSignal::TfIdfFallback),
    };

    let weight = params.fusion_weight.clamp(0.0, 1.0);

    let mut ranked: Vec<Hit> = index
        .chunks()
        .iter()
        .enumerate()
        .map(|(i, chunk)| Hit {
            position: i,
            text: chunk.text.clone(),
            source: chunk.source.clone(),
            score: fuse(semantic_norm[i], bm25_norm[i], weight),
            explain: ScoreExplanation {
                semantic_score: semantic_norm[i],
                bm25_score: bm25_norm[i],
                tfidf_score: tfidf_scores[i],
                weight,
                semantic_signal: signal,
            },
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.position.cmp(&b.position))
    });
    ranked.truncate(params.top_k.max(1));

    let best = ranked.first().map_or(0.0, |h| h.score);
    let hits: Vec<Hit> = ranked
        .into_iter()
        .filter(|h| h.score >= params.confidence_threshold)
        .collect();
    let Some(primary_source) = hits.first().map(|h| h.source.clone()) else {
        return Retrieval::NoMatch { best_score: best };
    };
    let context = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    Retrieval::Matched(RetrievalMatch {
        primary_source,
        confidence: best,
        context,
        hits,
    })
}
