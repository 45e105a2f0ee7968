//! Offline hashing embedder.
//!
//! Projects word tokens and character trigrams into a fixed number of
//! buckets with FNV-1a, then L2-normalises. Deterministic and dependency
//! free; trigrams let inflections like "refund"/"refunds" land close
//! together.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

use docchat_core::embedding::Embedder;

pub const DEFAULT_HASHING_DIMS: usize = 384;

/// Word features weigh more than each of a word's trigrams.
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// FNV-1a bucket for a feature.
    fn bucket(feature: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in feature.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn words(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect()
    }

    /// Trigrams of `#word#`.
    fn trigrams(word: &str) -> Vec<String> {
        let padded: Vec<char> = format!("#{}#", word).chars().collect();
        padded
            .windows(3)
            .map(|w| w.iter().collect::<String>())
            .collect()
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut features: BTreeMap<String, f32> = BTreeMap::new();
        for word in Self::words(text) {
            for tri in Self::trigrams(&word) {
                *features.entry(format!("c:{}", tri)).or_default() += TRIGRAM_WEIGHT;
            }
            *features.entry(format!("w:{}", word)).or_default() += WORD_WEIGHT;
        }

        let mut vec = vec![0.0f32; self.dims];
        for (feature, weight) in &features {
            vec[Self::bucket(feature, self.dims)] += weight;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}
