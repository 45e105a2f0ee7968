//! Conversational query rewriting.
//!
//! A message is a follow-up when the tenant's conversation is `Active` and
//! the lower-cased message contains one of [`FOLLOW_UP_INDICATORS`]. This is
//! a plain substring test. Follow-ups are rewritten into standalone
//! questions by the generation collaborator; other messages may get a
//! lighter normalisation pass. Every collaborator failure falls back to the
//! raw message, so [`rewrite`] always returns a usable query.

use serde::Serialize;
use tracing::{debug, warn};

use crate::conversation::{ConversationState, DEFAULT_TOPIC};
use crate::error::{CollaboratorStage, HarnessError};
use crate::generation::{complete_non_empty, Generator};
use crate::index::KeyTerms;
use crate::prompts;

pub const FOLLOW_UP_INDICATORS: [&str; 9] = [
    "it",
    "that",
    "this",
    "they",
    "those",
    "these",
    "following up",
    "regarding",
    "about that",
];

#[derive(Debug, Clone, Copy)]
pub struct RewriteOptions {
    /// Run the spelling/abbreviation pass on non-follow-up messages.
    pub normalize_queries: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            normalize_queries: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteKind {
    FollowUp,
    Normalized,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rewrite {
    /// Query to retrieve with.
    pub query: String,
    pub kind: RewriteKind,
    /// True when the collaborator failed and `query` is the raw message.
    pub fell_back: bool,
}

pub fn is_follow_up(state: &ConversationState, message: &str) -> bool {
    if !state.is_active() {
        return false;
    }
    let lower = message.to_lowercase();
    FOLLOW_UP_INDICATORS.iter().any(|i| lower.contains(i))
}

/// Turn a raw message into the query used for retrieval. Never fails.
pub async fn rewrite(
    generator: &dyn Generator,
    state: &ConversationState,
    key_terms: &KeyTerms,
    raw_message: &str,
    options: &RewriteOptions,
) -> Rewrite {
    let (kind, stage, (system, user)) = if is_follow_up(state, raw_message) {
        let topic = state.current_topic.as_deref().unwrap_or(DEFAULT_TOPIC);
        let last_query = state.last_query.as_deref().unwrap_or_default();
        (
            RewriteKind::FollowUp,
            CollaboratorStage::Rewrite,
            prompts::follow_up(topic, last_query, raw_message),
        )
    } else if options.normalize_queries && !raw_message.trim().is_empty() {
        (
            RewriteKind::Normalized,
            CollaboratorStage::Normalize,
            prompts::normalize(raw_message, key_terms),
        )
    } else {
        return Rewrite {
            query: raw_message.to_string(),
            kind: RewriteKind::Unchanged,
            fell_back: false,
        };
    };

    match complete_non_empty(generator, &system, &user).await {
        Ok(query) => {
            debug!(stage = %stage, original = raw_message, rewritten = %query, "query rewritten");
            Rewrite {
                query,
                kind,
                fell_back: false,
            }
        }
        Err(e) => {
            let err = HarnessError::collaborator(stage, e);
            warn!(kind = err.kind(), stage = %stage, error = %err, "query rewrite failed, using original message");
            Rewrite {
                query: raw_message.to_string(),
                kind,
                fell_back: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes the user prompt so tests can see what was sent.
    struct Echo {
        calls: Mutex<Vec<String>>,
    }

    impl Echo {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, _system: &str, user: &str) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(user.to_string());
            Ok(format!("rewritten: {}", user))
        }
    }

    struct Failing;

    #[async_trait]
    impl Generator for Failing {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            anyhow::bail!("timed out")
        }
    }

    fn active(topic: &str) -> ConversationState {
        ConversationState {
            last_query: Some("How do refunds work?".to_string()),
            last_context: Some("Refunds are accepted within 30 days.".to_string()),
            current_topic: Some(topic.to_string()),
            last_response: Some("Within 30 days.".to_string()),
        }
    }

    #[test]
    fn test_idle_is_never_follow_up() {
        assert!(!is_follow_up(&ConversationState::default(), "what about that?"));
    }

    #[test]
    fn test_indicator_substrings() {
        let state = active("refund policy");
        assert!(is_follow_up(&state, "What about THAT?"));
        assert!(is_follow_up(&state, "Following up on shipping"));
        // Substring match: "with" contains "it".
        assert!(is_follow_up(&state, "Help with shipping"));
        assert!(!is_follow_up(&state, "Office hours?"));
    }

    #[tokio::test]
    async fn test_follow_up_includes_topic() {
        let echo = Echo::new();
        let r = rewrite(
            &echo,
            &active("refund policy"),
            &KeyTerms::new(),
            "what about that?",
            &RewriteOptions::default(),
        )
        .await;
        assert_eq!(r.kind, RewriteKind::FollowUp);
        assert!(!r.fell_back);
        assert!(r.query.contains("refund policy"));
    }

    #[tokio::test]
    async fn test_idle_message_is_normalized_not_follow_up() {
        let echo = Echo::new();
        let r = rewrite(
            &echo,
            &ConversationState::default(),
            &KeyTerms::new(),
            "what about that?",
            &RewriteOptions::default(),
        )
        .await;
        assert_eq!(r.kind, RewriteKind::Normalized);
        assert!(!r.query.contains("Previous topic"));
    }

    #[tokio::test]
    async fn test_normalization_disabled_passes_through() {
        let echo = Echo::new();
        let r = rewrite(
            &echo,
            &ConversationState::default(),
            &KeyTerms::new(),
            "refnd policy",
            &RewriteOptions {
                normalize_queries: false,
            },
        )
        .await;
        assert_eq!(r.kind, RewriteKind::Unchanged);
        assert_eq!(r.query, "refnd policy");
        assert!(echo.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failures_fall_back_to_raw_message() {
        let r = rewrite(
            &Failing,
            &active("refund policy"),
            &KeyTerms::new(),
            "what about that?",
            &RewriteOptions::default(),
        )
        .await;
        assert_eq!(r.query, "what about that?");
        assert!(r.fell_back);

        let r = rewrite(
            &Failing,
            &ConversationState::default(),
            &KeyTerms::new(),
            "office hours",
            &RewriteOptions::default(),
        )
        .await;
        assert_eq!(r.query, "office hours");
        assert_eq!(r.kind, RewriteKind::Normalized);
        assert!(r.fell_back);
    }
}
