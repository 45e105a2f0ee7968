//! Per-tenant multi-signal index.
//!
//! A [`TenantIndex`] bundles everything the retriever scores against: the
//! ordered chunk list, a TF-IDF matrix, BM25 statistics, and one dense
//! embedding per chunk. All per-chunk structures share the chunk index as
//! their key, and the whole value is immutable once built. Replacing a
//! tenant's index means building a new one and swapping the pointer.
//!
//! # Build steps
//!
//! 1. Fit TF-IDF weights over the full chunk vocabulary.
//! 2. Fit BM25 statistics.
//! 3. Embed every chunk through the [`Embedder`] collaborator, in batches.
//!
//! Any failure aborts the build with [`HarnessError::IndexBuildFailure`].

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::embedding::Embedder;
use crate::error::{CollaboratorStage, HarnessError};
use crate::generation::{complete_non_empty, Generator};
use crate::lexical::{Bm25Params, Bm25Stats, TfIdfMatrix};
use crate::models::Chunk;
use crate::prompts;

/// Formal term -> colloquial variations, used as query normalisation hints.
pub type KeyTerms = BTreeMap<String, Vec<String>>;

/// Number of leading chunks sampled for key-term extraction.
const KEY_TERM_SAMPLE_CHUNKS: usize = 5;

/// Index build tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct IndexParams {
    pub bm25: Bm25Params,
    /// Texts per embedder call.
    pub embed_batch_size: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            embed_batch_size: 64,
        }
    }
}

/// Summary of an index, safe to serialize in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub chunks: usize,
    pub sources: usize,
    pub vocabulary: usize,
    pub dims: usize,
    pub key_terms: usize,
    pub fingerprint: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TenantIndex {
    chunks: Vec<Chunk>,
    tfidf: TfIdfMatrix,
    bm25: Bm25Stats,
    embeddings: Vec<Vec<f32>>,
    dims: usize,
    key_terms: KeyTerms,
    fingerprint: String,
    last_updated: DateTime<Utc>,
}

impl TenantIndex {
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn tfidf(&self) -> &TfIdfMatrix {
        &self.tfidf
    }

    pub fn bm25(&self) -> &Bm25Stats {
        &self.bm25
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn key_terms(&self) -> &KeyTerms {
        &self.key_terms
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Attach key terms extracted after the lexical and dense build.
    pub fn with_key_terms(mut self, key_terms: KeyTerms) -> Self {
        self.key_terms = key_terms;
        self
    }

    /// True when every per-chunk structure has one entry per chunk and all
    /// embeddings share the index dimensionality.
    pub fn is_consistent(&self) -> bool {
        let n = self.chunks.len();
        self.tfidf.len() == n
            && self.bm25.len() == n
            && self.embeddings.len() == n
            && self.embeddings.iter().all(|e| e.len() == self.dims)
    }

    pub fn summary(&self) -> IndexSummary {
        let mut sources: Vec<&str> = self.chunks.iter().map(|c| c.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();
        IndexSummary {
            chunks: self.chunks.len(),
            sources: sources.len(),
            vocabulary: self.tfidf.vocabulary_size(),
            dims: self.dims,
            key_terms: self.key_terms.len(),
            fingerprint: self.fingerprint.clone(),
            last_updated: self.last_updated,
        }
    }
}

/// Build a complete index over `chunks`.
///
/// Nothing is shared with any previously built index, so a failure here
/// leaves whatever index the caller already holds untouched.
pub async fn build_index(
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    params: &IndexParams,
) -> Result<TenantIndex, HarnessError> {
    build_inner(chunks, embedder, params)
        .await
        .map_err(HarnessError::IndexBuildFailure)
}

async fn build_inner(
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    params: &IndexParams,
) -> anyhow::Result<TenantIndex> {
    if chunks.is_empty() {
        bail!("no chunks to index");
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

    let tfidf = TfIdfMatrix::fit(&texts).context("TF-IDF weighting failed")?;
    let bm25 = Bm25Stats::fit(&texts, params.bm25);

    let batch_size = params.embed_batch_size.max(1);
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size) {
        let vectors = embedder
            .encode(batch)
            .await
            .with_context(|| format!("embedding with {} failed", embedder.model_name()))?;
        if vectors.len() != batch.len() {
            bail!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            );
        }
        embeddings.extend(vectors);
    }

    let dims = embeddings.first().map(Vec::len).unwrap_or(0);
    if dims == 0 {
        bail!("embedder returned zero-dimensional vectors");
    }
    if let Some(bad) = embeddings.iter().position(|e| e.len() != dims) {
        bail!(
            "embedding {} has {} dims, expected {}",
            bad,
            embeddings[bad].len(),
            dims
        );
    }
    if let Some(bad) = embeddings
        .iter()
        .position(|e| e.iter().any(|x| !x.is_finite()))
    {
        bail!("embedding {} contains non-finite values", bad);
    }

    let index = TenantIndex {
        fingerprint: fingerprint(&chunks),
        chunks,
        tfidf,
        bm25,
        embeddings,
        dims,
        key_terms: KeyTerms::new(),
        last_updated: Utc::now(),
    };

    if !index.is_consistent() {
        return Err(anyhow!("per-chunk structures disagree in length"));
    }
    Ok(index)
}

/// SHA-256 over the ordered `(source, text)` pairs.
pub fn fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for c in chunks {
        hasher.update(c.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(c.text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Ask the generator for key terms from a sample of the corpus.
///
/// Returns an empty map on any failure; extraction never blocks indexing.
pub async fn extract_key_terms(generator: &dyn Generator, chunks: &[Chunk]) -> KeyTerms {
    if chunks.is_empty() {
        return KeyTerms::new();
    }
    let sample = chunks
        .iter()
        .take(KEY_TERM_SAMPLE_CHUNKS)
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let (system, user) = prompts::key_terms(&sample);

    let result = match complete_non_empty(generator, &system, &user).await {
        Ok(reply) => parse_key_terms(&reply),
        Err(e) => Err(e),
    };

    match result {
        Ok(terms) => terms,
        Err(e) => {
            let err = HarnessError::collaborator(CollaboratorStage::KeyTerms, e);
            warn!(kind = err.kind(), stage = "key_terms", error = %err, "key-term extraction failed, continuing without");
            KeyTerms::new()
        }
    }
}

/// Parse a key-term reply as a strict JSON object of string arrays.
///
/// A surrounding Markdown code fence is tolerated; any other shape is an
/// error.
pub fn parse_key_terms(reply: &str) -> anyhow::Result<KeyTerms> {
    let body = strip_code_fence(reply.trim());
    let parsed: KeyTerms =
        serde_json::from_str(body).context("key-term reply is not a JSON object of string arrays")?;
    Ok(parsed
        .into_iter()
        .map(|(k, v)| {
            let v = v
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            (k.trim().to_string(), v)
        })
        .filter(|(k, _)| !k.is_empty())
        .collect())
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct LenEmbedder;

    #[async_trait]
    impl Embedder for LenEmbedder {
        fn model_name(&self) -> &str {
            "len"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]])
        }
    }

    struct NanEmbedder;

    #[async_trait]
    impl Embedder for NanEmbedder {
        fn model_name(&self) -> &str {
            "nan"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![f32::NAN, 1.0]).collect())
        }
    }

    struct Reply(&'static str);

    #[async_trait]
    impl Generator for Reply {
        fn model_name(&self) -> &str {
            "reply"
        }
        async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn chunks() -> Vec<Chunk> {
        ["Refunds are accepted within 30 days.", "Our office hours are 9 to 5."]
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                text: t.to_string(),
                source: "policy.txt".to_string(),
                ordinal: i,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_build_is_consistent() {
        let params = IndexParams {
            embed_batch_size: 1,
            ..IndexParams::default()
        };
        let index = build_index(chunks(), &LenEmbedder, &params).await.unwrap();
        assert!(index.is_consistent());
        assert_eq!(index.len(), 2);
        assert_eq!(index.dims(), 2);
        let summary = index.summary();
        assert_eq!(summary.sources, 1);
        assert_eq!(summary.chunks, 2);
    }

    #[tokio::test]
    async fn test_build_empty_fails() {
        let err = build_index(Vec::new(), &LenEmbedder, &IndexParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "index_build_failed");
    }

    #[tokio::test]
    async fn test_build_vector_count_mismatch_fails() {
        let err = build_index(chunks(), &ShortEmbedder, &IndexParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 vectors for 2 texts"));
    }

    #[tokio::test]
    async fn test_build_rejects_non_finite_embeddings() {
        let err = build_index(chunks(), &NanEmbedder, &IndexParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "index_build_failed");
        assert!(format!("{:#}", err).contains("non-finite"));
    }

    #[tokio::test]
    async fn test_fingerprint_stable() {
        let a = build_index(chunks(), &LenEmbedder, &IndexParams::default())
            .await
            .unwrap();
        let b = build_index(chunks(), &LenEmbedder, &IndexParams::default())
            .await
            .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), fingerprint(&chunks()));
    }

    #[test]
    fn test_parse_key_terms_plain_and_fenced() {
        let plain = parse_key_terms(r#"{"refund policy": ["refund", " money back "]}"#).unwrap();
        assert_eq!(
            plain.get("refund policy").unwrap(),
            &vec!["refund".to_string(), "money back".to_string()]
        );

        let fenced = parse_key_terms("```json\n{\"office hours\": [\"opening times\"]}\n```").unwrap();
        assert!(fenced.contains_key("office hours"));
    }

    #[test]
    fn test_parse_key_terms_rejects_non_json() {
        assert!(parse_key_terms("{'a': ['b']}").is_err());
        assert!(parse_key_terms("__import__('os')").is_err());
        assert!(parse_key_terms(r#"{"a": "not a list"}"#).is_err());
    }

    #[tokio::test]
    async fn test_extract_key_terms_falls_back_to_empty() {
        let terms = extract_key_terms(&Reply("not json at all"), &chunks()).await;
        assert!(terms.is_empty());

        let terms = extract_key_terms(&Reply(r#"{"refund": ["return"]}"#), &chunks()).await;
        assert_eq!(terms.len(), 1);
    }
}
