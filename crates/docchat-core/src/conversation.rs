//! Per-tenant conversation state.
//!
//! A tenant's conversation is either `Idle` (no successful turn yet) or
//! `Active` (a previous query, its context, topic, and answer are known).
//! Only successful turns advance it, and every advance replaces all four
//! fields together.

use serde::Serialize;
use tracing::warn;

use crate::error::{CollaboratorStage, HarnessError};
use crate::generation::{complete_non_empty, Generator};
use crate::prompts;

/// Topic used when neither the collaborator nor the query yields one.
pub const DEFAULT_TOPIC: &str = "general";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    Idle,
    Active,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationState {
    pub last_query: Option<String>,
    pub last_context: Option<String>,
    pub current_topic: Option<String>,
    pub last_response: Option<String>,
}

impl ConversationState {
    pub fn phase(&self) -> ConversationPhase {
        if self.last_query.is_some() {
            ConversationPhase::Active
        } else {
            ConversationPhase::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase() == ConversationPhase::Active
    }

    /// Topic to record for a turn: the current topic, or `"general"`.
    pub fn topic_or_default(&self) -> String {
        self.current_topic
            .clone()
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string())
    }

    /// Build the state that follows a successful turn.
    ///
    /// The topic comes from the generator. Nothing is shared with `self`,
    /// so the result can be computed without holding any lock and swapped
    /// in afterwards with [`ConversationTracker::replace`].
    pub async fn advance(
        &self,
        generator: &dyn Generator,
        final_query: &str,
        context: &str,
        response: &str,
    ) -> ConversationState {
        let topic = extract_topic(generator, final_query, context).await;
        ConversationState {
            last_query: Some(final_query.to_string()),
            last_context: Some(context.to_string()),
            current_topic: Some(topic),
            last_response: Some(response.to_string()),
        }
    }
}

/// Owns one tenant's [`ConversationState`].
///
/// Callers serialize access (the app keeps one tracker per tenant behind
/// a mutex that is only held to snapshot or replace the state).
#[derive(Debug, Default)]
pub struct ConversationTracker {
    state: ConversationState,
}

impl ConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Copy of the current state for use outside the lock.
    pub fn snapshot(&self) -> ConversationState {
        self.state.clone()
    }

    /// Swap in a fully built state. Returns the previous one.
    pub fn replace(&mut self, next: ConversationState) -> ConversationState {
        std::mem::replace(&mut self.state, next)
    }
}

/// Ask the generator for a short topic, falling back to [`fallback_topic`].
pub async fn extract_topic(generator: &dyn Generator, query: &str, context: &str) -> String {
    let (system, user) = prompts::topic(query, context);
    match complete_non_empty(generator, &system, &user).await {
        Ok(topic) => topic,
        Err(e) => {
            let err = HarnessError::collaborator(CollaboratorStage::Topic, e);
            warn!(kind = err.kind(), stage = "topic", error = %err, "topic extraction failed, using fallback");
            fallback_topic(query)
        }
    }
}

/// First whitespace-delimited token of the query, or `"general"`.
pub fn fallback_topic(query: &str) -> String {
    query
        .split_whitespace()
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_TOPIC.to_string())
}
