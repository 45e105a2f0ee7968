//! Core data models shared by the index, retriever, and conversation layers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A raw document handed over by ingestion: already-extracted UTF-8 text
/// plus the label it should be attributed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub text: String,
    pub source: String,
}

/// A sentence-aligned passage of one source document.
///
/// `ordinal` is the chunk's position within its source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub ordinal: usize,
}

/// How a turn ended, as recorded in the interaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered,
    NoMatch,
    GenerationFailed,
}

impl TurnOutcome {
    pub fn is_error(self) -> bool {
        !matches!(self, TurnOutcome::Answered)
    }
}

/// One appended entry of a tenant's interaction history.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub timestamp: DateTime<Utc>,
    pub original_message: String,
    pub response_text: String,
    /// Rank-1 fused score of the turn, in `[0.0, 1.0]`.
    pub confidence: f64,
    pub topic: String,
    pub outcome: TurnOutcome,
}

/// Occurrences of one topic within the analytics window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

/// Mean confidence of the turns recorded on one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyConfidence {
    pub date: NaiveDate,
    pub average_confidence: f64,
    pub interactions: usize,
}

/// Aggregated interaction analytics for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analytics {
    /// Number of records in the whole log.
    pub total_interactions: usize,
    /// Records in the whole log stamped with today's UTC date.
    pub total_queries_today: usize,
    /// Number of trailing records the remaining figures were computed over.
    pub window: usize,
    pub average_confidence: f64,
    /// Fraction of windowed turns with confidence above 0.7.
    pub high_confidence_rate: f64,
    /// Fraction of windowed turns that did not produce an answer.
    pub error_rate: f64,
    /// Per-day mean confidence, oldest day first.
    pub confidence_trend: Vec<DailyConfidence>,
    /// Most frequent first; ties keep first-seen order.
    pub topic_frequency: Vec<TopicCount>,
    /// Recent distinct messages that got a low-confidence turn, newest
    /// first. Hints at what the documents fail to cover.
    pub content_gaps: Vec<String>,
}

impl Analytics {
    pub fn empty() -> Self {
        Self {
            total_interactions: 0,
            total_queries_today: 0,
            window: 0,
            average_confidence: 0.0,
            high_confidence_rate: 0.0,
            error_rate: 0.0,
            confidence_trend: Vec::new(),
            topic_frequency: Vec::new(),
            content_gaps: Vec::new(),
        }
    }
}
