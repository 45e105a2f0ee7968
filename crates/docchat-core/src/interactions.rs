//! Append-only interaction history and analytics.
//!
//! Appends go through a write lock; readers clone a bounded suffix under a
//! read lock. A poisoned lock is recovered rather than surfaced, since the
//! history is best-effort.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::models::{Analytics, DailyConfidence, InteractionRecord, TopicCount, TurnOutcome};

/// Default number of trailing records analytics are computed over.
pub const DEFAULT_ANALYTICS_WINDOW: usize = 50;

/// Turns scoring above this count as high confidence; the rest are
/// content-gap candidates.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Maximum number of content-gap messages reported.
pub const MAX_CONTENT_GAPS: usize = 5;

#[derive(Debug, Default)]
pub struct InteractionLog {
    records: RwLock<Vec<InteractionRecord>>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record stamped with the current time. Never fails.
    pub fn record(
        &self,
        message: &str,
        response: &str,
        confidence: f64,
        topic: &str,
        outcome: TurnOutcome,
    ) {
        let record = InteractionRecord {
            timestamp: Utc::now(),
            original_message: message.to_string(),
            response_text: response.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            topic: topic.to_string(),
            outcome,
        };
        self.write().push(record);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of the last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<InteractionRecord> {
        let records = self.read();
        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }

    /// Aggregate the last `window` records.
    ///
    /// `total_interactions` and `total_queries_today` count the whole log;
    /// the remaining figures cover only the window.
    pub fn analytics(&self, window: usize) -> Analytics {
        self.analytics_at(window, Utc::now())
    }

    /// [`analytics`](Self::analytics) with an explicit notion of "now".
    pub fn analytics_at(&self, window: usize, now: DateTime<Utc>) -> Analytics {
        let today = now.date_naive();
        let (total, queries_today, tail) = {
            let records = self.read();
            let start = records.len().saturating_sub(window);
            let queries_today = records
                .iter()
                .filter(|r| r.timestamp.date_naive() == today)
                .count();
            (records.len(), queries_today, records[start..].to_vec())
        };
        Analytics {
            total_queries_today: queries_today,
            ..summarize(total, &tail)
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<InteractionRecord>> {
        self.records.read().unwrap_or_else(|poisoned| {
            warn!(kind = "log_poisoned", "interaction log lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<InteractionRecord>> {
        self.records.write().unwrap_or_else(|poisoned| {
            warn!(kind = "log_poisoned", "interaction log lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Compute analytics over an already-selected window of records.
pub fn summarize(total: usize, window: &[InteractionRecord]) -> Analytics {
    if window.is_empty() {
        return Analytics {
            total_interactions: total,
            ..Analytics::empty()
        };
    }

    let n = window.len() as f64;
    let average_confidence = window.iter().map(|r| r.confidence).sum::<f64>() / n;
    let errors = window.iter().filter(|r| r.outcome.is_error()).count();

    let high = window
        .iter()
        .filter(|r| r.confidence > HIGH_CONFIDENCE_THRESHOLD)
        .count();

    Analytics {
        total_interactions: total,
        window: window.len(),
        average_confidence,
        high_confidence_rate: high as f64 / n,
        error_rate: errors as f64 / n,
        confidence_trend: confidence_trend(window),
        topic_frequency: topic_frequency(window.iter().map(|r| r.topic.as_str())),
        content_gaps: content_gaps(window),
        ..Analytics::empty()
    }
}

/// Mean confidence per UTC day, oldest day first.
pub fn confidence_trend(records: &[InteractionRecord]) -> Vec<DailyConfidence> {
    let mut days: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for r in records {
        let day = days.entry(r.timestamp.date_naive()).or_insert((0.0, 0));
        day.0 += r.confidence;
        day.1 += 1;
    }
    days.into_iter()
        .map(|(date, (sum, count))| DailyConfidence {
            date,
            average_confidence: sum / count as f64,
            interactions: count,
        })
        .collect()
}

/// Distinct messages of low-confidence turns, newest first.
pub fn content_gaps(records: &[InteractionRecord]) -> Vec<String> {
    let mut gaps: Vec<String> = Vec::new();
    for r in records.iter().rev() {
        if r.confidence >= HIGH_CONFIDENCE_THRESHOLD {
            continue;
        }
        let message = r.original_message.trim();
        if message.is_empty() || gaps.iter().any(|g| g == message) {
            continue;
        }
        gaps.push(message.to_string());
        if gaps.len() == MAX_CONTENT_GAPS {
            break;
        }
    }
    gaps
}

/// Count topics, most frequent first, ties in first-seen order.
pub fn topic_frequency<'a>(topics: impl Iterator<Item = &'a str>) -> Vec<TopicCount> {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<TopicCount> = Vec::new();

    for topic in topics {
        match first_seen.get(topic) {
            Some(&i) => counts[i].count += 1,
            None => {
                first_seen.insert(topic, counts.len());
                counts.push(TopicCount {
                    topic: topic.to_string(),
                    count: 1,
                });
            }
        }
    }

    // Stable sort keeps first-seen order among equal counts.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}
