//! Lexical relevance signals: TF-IDF term-weight vectors and BM25.
//!
//! Both structures are fitted once over a tenant's chunk list and then
//! score queries against every chunk. Vocabulary ordering uses `BTreeMap`
//! so identical input always yields identical term indices.
//!
//! # TF-IDF
//!
//! Tokens are lowercase runs of two or more word characters with English
//! stop words removed. Weights are `tf × idf` with the smoothed
//! `idf = ln((1 + n) / (1 + df)) + 1`, and every row is L2-normalised so
//! cosine similarity reduces to a sparse dot product.
//!
//! # BM25
//!
//! Okapi BM25 over whitespace-split, lowercased tokens:
//!
//! ```text
//! score(q, d) = Σ idf(t) · tf(t,d)·(k1+1) / (tf(t,d) + k1·(1 − b + b·|d|/avgdl))
//! idf(t)      = ln(1 + (N − df + 0.5) / (df + 0.5))
//! ```
//!
//! The idf variant is always positive, so scores are `>= 0`.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Sparse vector as `(term_index, weight)` pairs sorted by term index.
pub type SparseVector = Vec<(usize, f32)>;

/// English stop words removed before TF-IDF weighting.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "be", "became", "because", "become", "becomes", "been", "before",
    "beforehand", "behind", "being", "below", "beside", "besides", "between", "beyond", "both",
    "but", "by", "can", "cannot", "could", "did", "do", "does", "done", "down", "due", "during",
    "each", "eg", "either", "else", "elsewhere", "enough", "etc", "even", "ever", "every",
    "everyone", "everything", "everywhere", "except", "few", "for", "former", "formerly", "from",
    "further", "had", "has", "have", "he", "hence", "her", "here", "hereafter", "hereby",
    "herein", "hers", "herself", "him", "himself", "his", "how", "however", "ie", "if", "in",
    "indeed", "into", "is", "it", "its", "itself", "just", "last", "latter", "least", "less",
    "many", "may", "me", "meanwhile", "might", "more", "moreover", "most", "mostly", "much",
    "must", "my", "myself", "neither", "never", "nevertheless", "next", "no", "nobody", "none",
    "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only",
    "onto", "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over",
    "own", "per", "perhaps", "please", "rather", "re", "same", "seem", "seemed", "seeming",
    "seems", "several", "she", "should", "since", "so", "some", "somehow", "someone",
    "something", "sometime", "sometimes", "somewhere", "still", "such", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "this", "those", "though", "through",
    "throughout", "thru", "thus", "to", "together", "too", "toward", "towards", "un", "under",
    "until", "up", "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever",
    "when", "whence", "whenever", "where", "whereafter", "whereas", "whereby", "wherein",
    "whereupon", "wherever", "whether", "which", "while", "whither", "who", "whoever", "whole",
    "whom", "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your",
    "yours", "yourself", "yourselves",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Tokenize for TF-IDF: lowercase word-character runs of length >= 2,
/// stop words removed.
pub fn tfidf_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2 && !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

/// Tokenize for BM25: whitespace split, lowercased.
pub fn bm25_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// TF-IDF term-weight matrix fitted over a chunk corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfIdfMatrix {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f32>,
    rows: Vec<SparseVector>,
}

impl TfIdfMatrix {
    /// Fit the vocabulary and idf weights over `texts` and weight each one.
    ///
    /// Fails when no text contributes a single non-stop-word token.
    pub fn fit(texts: &[String]) -> Result<Self> {
        let tokenized: Vec<Vec<String>> = texts.iter().map(|t| tfidf_tokens(t)).collect();

        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        for tokens in &tokenized {
            let mut seen: Vec<&String> = tokens.iter().collect();
            seen.sort();
            seen.dedup();
            for term in seen {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
        }

        if doc_freq.is_empty() {
            bail!("empty vocabulary: chunks contain only stop words");
        }

        let n = texts.len() as f32;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(doc_freq.len());
        for (i, (term, df)) in doc_freq.into_iter().enumerate() {
            idf.push(((1.0 + n) / (1.0 + df as f32)).ln() + 1.0);
            vocabulary.insert(term, i);
        }

        let mut matrix = Self {
            vocabulary,
            idf,
            rows: Vec::new(),
        };
        matrix.rows = tokenized.iter().map(|t| matrix.weigh(t)).collect();
        Ok(matrix)
    }

    /// Weight a query against the fitted vocabulary. Unknown terms are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        self.weigh(&tfidf_tokens(text))
    }

    /// Cosine similarity between `query` and every row, in row order.
    pub fn cosine_scores(&self, query: &SparseVector) -> Vec<f64> {
        self.rows.iter().map(|row| sparse_dot(query, row)).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    fn weigh(&self, tokens: &[String]) -> SparseVector {
        let mut counts: BTreeMap<usize, f32> = BTreeMap::new();
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }

        let mut vec: SparseVector = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();

        let norm = vec.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for (_, w) in &mut vec {
                *w /= norm;
            }
        }
        vec
    }
}

/// Dot product of two index-sorted sparse vectors.
fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0f64;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 as f64 * b[j].1 as f64;
                i += 1;
                j += 1;
            }
        }
    }
    dot.clamp(0.0, 1.0)
}

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Corpus statistics needed to score BM25 queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Stats {
    params: Bm25Params,
    doc_freq: HashMap<String, usize>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_len: Vec<usize>,
    avg_len: f64,
}

impl Bm25Stats {
    pub fn fit(texts: &[String], params: Bm25Params) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut term_freqs = Vec::with_capacity(texts.len());
        let mut doc_len = Vec::with_capacity(texts.len());

        for text in texts {
            let tokens = bm25_tokens(text);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.clone()).or_default() += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
            doc_len.push(tokens.len());
            term_freqs.push(tf);
        }

        let avg_len = if doc_len.is_empty() {
            0.0
        } else {
            doc_len.iter().sum::<usize>() as f64 / doc_len.len() as f64
        };

        Self {
            params,
            doc_freq,
            term_freqs,
            doc_len,
            avg_len,
        }
    }

    /// Raw BM25 score of `query` against every document, in document order.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let terms = bm25_tokens(query);
        let n = self.doc_len.len() as f64;
        let Bm25Params { k1, b } = self.params;

        let idfs: Vec<(&str, f64)> = terms
            .iter()
            .filter_map(|t| {
                self.doc_freq.get(t).map(|&df| {
                    let df = df as f64;
                    (t.as_str(), (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
                })
            })
            .collect();

        self.term_freqs
            .iter()
            .zip(self.doc_len.iter())
            .map(|(tf, &len)| {
                let len_norm = if self.avg_len > 0.0 {
                    len as f64 / self.avg_len
                } else {
                    1.0
                };
                idfs.iter()
                    .map(|(term, idf)| {
                        let f = tf.get(*term).copied().unwrap_or(0) as f64;
                        if f == 0.0 {
                            return 0.0;
                        }
                        idf * f * (k1 + 1.0) / (f + k1 * (1.0 - b + b * len_norm))
                    })
                    .sum()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.doc_len.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_len.is_empty()
    }
}
