//! Error taxonomy for the retrieval core.
//!
//! Every variant has a stable [`kind`](HarnessError::kind) tag that log
//! lines carry in their `kind` field.

use std::fmt;

use thiserror::Error;

/// Which collaborator call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorStage {
    Embedding,
    Rewrite,
    Normalize,
    Topic,
    KeyTerms,
    Answer,
}

impl CollaboratorStage {
    pub fn as_str(self) -> &'static str {
        match self {
            CollaboratorStage::Embedding => "embedding",
            CollaboratorStage::Rewrite => "rewrite",
            CollaboratorStage::Normalize => "normalize",
            CollaboratorStage::Topic => "topic",
            CollaboratorStage::KeyTerms => "key_terms",
            CollaboratorStage::Answer => "answer",
        }
    }
}

impl fmt::Display for CollaboratorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("no relevant match: best score {best:.3} below threshold {threshold:.3}")]
    NoRelevantMatch { best: f64, threshold: f64 },

    #[error("index build failed: {0:#}")]
    IndexBuildFailure(anyhow::Error),

    #[error("{stage} collaborator failed: {source:#}")]
    CollaboratorFailure {
        stage: CollaboratorStage,
        #[source]
        source: anyhow::Error,
    },
}

impl HarnessError {
    pub fn collaborator(stage: CollaboratorStage, source: anyhow::Error) -> Self {
        HarnessError::CollaboratorFailure { stage, source }
    }

    /// Stable type tag for logs and HTTP error codes.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::TenantNotFound(_) => "tenant_not_found",
            HarnessError::NoRelevantMatch { .. } => "no_relevant_match",
            HarnessError::IndexBuildFailure(_) => "index_build_failed",
            HarnessError::CollaboratorFailure { .. } => "collaborator_failure",
        }
    }
}
