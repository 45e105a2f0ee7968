//! The question-answering pipeline.
//!
//! [`Engine`] owns the collaborators and the [`TenantRegistry`] and exposes
//! the three caller operations: [`Engine::ingest`] builds and publishes a
//! tenant index, [`Engine::ask`] runs one conversational turn, and
//! [`Engine::analytics`] summarises a tenant's history.
//!
//! # Turn Pipeline
//!
//! ```text
//! message ─► rewrite (follow-up / normalize) ─► embed query ─► retrieve
//!         ─► generate answer ─► advance conversation ─► record interaction
//! ```
//!
//! A turn works on a snapshot of the tenant's conversation and swaps the
//! successor state in at the end, so concurrent turns of one tenant never
//! wait on each other's collaborator calls. A failed or non-finite query
//! embedding degrades retrieval to the TF-IDF signal; a failed answer is
//! reported to the caller and leaves the conversation unchanged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};

use docchat_core::chunk::chunk_document;
use docchat_core::embedding::{encode_one, Embedder};
use docchat_core::error::{CollaboratorStage, HarnessError};
use docchat_core::generation::{complete_non_empty, Generator};
use docchat_core::index::{build_index, extract_key_terms};
use docchat_core::models::{Analytics, DocumentInput, InteractionRecord, TurnOutcome};
use docchat_core::prompts;
use docchat_core::rewrite::{rewrite, RewriteKind};
use docchat_core::search::{retrieve, Retrieval};

use crate::collaborator::{BoundedEmbedder, BoundedGenerator};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::tenants::TenantRegistry;

pub const TENANT_NOT_FOUND_MESSAGE: &str = "Company not found.";
pub const NO_MATCH_MESSAGE: &str = "I need more specific information to answer that.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AskStatus {
    Success,
    NoMatch,
    TenantNotFound,
    GenerationFailed,
}

impl AskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AskStatus::Success => "success",
            AskStatus::NoMatch => "no_match",
            AskStatus::TenantNotFound => "tenant_not_found",
            AskStatus::GenerationFailed => "generation_failed",
        }
    }
}

/// Result of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    #[serde(rename = "response")]
    pub answer: String,
    pub confidence: f64,
    pub context: String,
    pub source: Option<String>,
    pub status: AskStatus,
    /// Query actually used for retrieval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteKind>,
}

impl AskResponse {
    fn tenant_not_found() -> Self {
        Self {
            answer: TENANT_NOT_FOUND_MESSAGE.to_string(),
            confidence: 0.0,
            context: String::new(),
            source: None,
            status: AskStatus::TenantNotFound,
            query: None,
            rewrite: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub tenant: String,
    pub documents: usize,
    pub chunks: usize,
    pub sources: usize,
    pub vocabulary: usize,
    pub dims: usize,
    pub key_terms: usize,
    pub fingerprint: String,
    /// True when an earlier index was replaced.
    pub replaced: bool,
    pub elapsed_ms: u64,
}

pub struct Engine {
    config: Config,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    tenants: TenantRegistry,
}

impl Engine {
    /// Build an engine around the given collaborators, applying the
    /// configured per-call timeouts.
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Self {
        let embedder = Arc::new(BoundedEmbedder::new(
            embedder,
            Duration::from_secs(config.embedding.timeout_secs),
        ));
        let generator = Arc::new(BoundedGenerator::new(
            generator,
            Duration::from_secs(config.generation.timeout_secs),
        ));
        Self {
            config,
            embedder,
            generator,
            tenants: TenantRegistry::new(),
        }
    }

    /// Build an engine with the providers named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        info!(
            embedder = embedder.model_name(),
            generator = generator.model_name(),
            "collaborators ready"
        );
        Ok(Self::new(config, embedder, generator))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tenants(&self) -> &TenantRegistry {
        &self.tenants
    }

    /// Chunk `documents`, build a fresh index, and publish it for `tenant`.
    ///
    /// Rebuilds of one tenant are serialised. On failure the previously
    /// published index, if any, stays in place.
    pub async fn ingest(
        &self,
        tenant: &str,
        documents: Vec<DocumentInput>,
    ) -> Result<IngestReport, HarnessError> {
        let started = Instant::now();
        let slot = self.tenants.get_or_create(tenant);
        let _build = slot.build_lock.lock().await;

        let document_count = documents.len();
        let chunks: Vec<_> = documents
            .iter()
            .flat_map(|d| chunk_document(&d.text, &d.source, self.config.chunking.max_chars))
            .collect();

        let index = match build_index(chunks, self.embedder.as_ref(), &self.config.index_params())
            .await
        {
            Ok(index) => index,
            Err(e) => {
                error!(tenant, kind = e.kind(), error = %e, "index build failed, keeping previous index");
                return Err(e);
            }
        };

        let index = if self.config.generation.extract_key_terms {
            let terms = extract_key_terms(self.generator.as_ref(), index.chunks()).await;
            index.with_key_terms(terms)
        } else {
            index
        };

        let summary = index.summary();
        let replaced = slot.publish(Arc::new(index)).is_some();

        let report = IngestReport {
            tenant: tenant.to_string(),
            documents: document_count,
            chunks: summary.chunks,
            sources: summary.sources,
            vocabulary: summary.vocabulary,
            dims: summary.dims,
            key_terms: summary.key_terms,
            fingerprint: summary.fingerprint,
            replaced,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            tenant,
            chunks = report.chunks,
            sources = report.sources,
            fingerprint = %report.fingerprint,
            replaced,
            "index published"
        );
        Ok(report)
    }

    /// Answer one message for `tenant`.
    pub async fn ask(&self, tenant: &str, message: &str) -> AskResponse {
        let Some(slot) = self.tenants.get(tenant) else {
            warn!(tenant, kind = "tenant_not_found", "ask for unknown tenant");
            return AskResponse::tenant_not_found();
        };

        let Some(index) = slot.index() else {
            warn!(tenant, kind = "tenant_not_found", "ask for tenant without an index");
            return AskResponse::tenant_not_found();
        };
        let conversation = slot.conversation();

        let rewritten = rewrite(
            self.generator.as_ref(),
            &conversation,
            index.key_terms(),
            message,
            &self.config.rewrite_options(),
        )
        .await;
        let query = rewritten.query;

        let query_vec = match encode_one(self.embedder.as_ref(), &query).await {
            Ok(v) if v.iter().all(|x| x.is_finite()) => Some(v),
            Ok(_) => {
                let err = HarnessError::collaborator(
                    CollaboratorStage::Embedding,
                    anyhow::anyhow!("query embedding contains non-finite values"),
                );
                warn!(tenant, kind = err.kind(), stage = "embedding", error = %err, "query embedding unusable, using TF-IDF signal");
                None
            }
            Err(e) => {
                let err = HarnessError::collaborator(CollaboratorStage::Embedding, e);
                warn!(tenant, kind = err.kind(), stage = "embedding", error = %err, "query embedding failed, using TF-IDF signal");
                None
            }
        };

        let params = self.config.retrieval_params_for(tenant);
        let matched = match retrieve(Some(&index), &query, query_vec.as_deref(), &params) {
            Retrieval::NotFound => return AskResponse::tenant_not_found(),
            Retrieval::NoMatch { best_score } => {
                let err = HarnessError::NoRelevantMatch {
                    best: best_score,
                    threshold: params.confidence_threshold,
                };
                info!(tenant, kind = err.kind(), query = %query, "{}", err);
                slot.log.record(
                    message,
                    NO_MATCH_MESSAGE,
                    0.0,
                    &conversation.topic_or_default(),
                    TurnOutcome::NoMatch,
                );
                return AskResponse {
                    answer: NO_MATCH_MESSAGE.to_string(),
                    confidence: 0.0,
                    context: String::new(),
                    source: None,
                    status: AskStatus::NoMatch,
                    query: Some(query),
                    rewrite: Some(rewritten.kind),
                };
            }
            Retrieval::Matched(m) => m,
        };

        let (system, user) = prompts::answer(&matched.context, &query);
        match complete_non_empty(self.generator.as_ref(), &system, &user).await {
            Ok(answer) => {
                let next = conversation
                    .advance(self.generator.as_ref(), &query, &matched.context, &answer)
                    .await;
                let topic = next.topic_or_default();
                slot.replace_conversation(next);
                slot.log.record(
                    message,
                    &answer,
                    matched.confidence,
                    &topic,
                    TurnOutcome::Answered,
                );
                info!(
                    tenant,
                    confidence = matched.confidence,
                    source = %matched.primary_source,
                    topic = %topic,
                    "answered"
                );
                AskResponse {
                    answer,
                    confidence: matched.confidence,
                    context: matched.context,
                    source: Some(matched.primary_source),
                    status: AskStatus::Success,
                    query: Some(query),
                    rewrite: Some(rewritten.kind),
                }
            }
            Err(e) => {
                let answer = format!("Error processing request: {:#}", e);
                let err = HarnessError::collaborator(CollaboratorStage::Answer, e);
                error!(tenant, kind = err.kind(), stage = "answer", error = %err, "answer generation failed");
                slot.log.record(
                    message,
                    &answer,
                    matched.confidence,
                    &conversation.topic_or_default(),
                    TurnOutcome::GenerationFailed,
                );
                AskResponse {
                    answer,
                    confidence: matched.confidence,
                    context: matched.context,
                    source: Some(matched.primary_source),
                    status: AskStatus::GenerationFailed,
                    query: Some(query),
                    rewrite: Some(rewritten.kind),
                }
            }
        }
    }

    /// Analytics over the configured window; all zero for unknown tenants.
    pub fn analytics(&self, tenant: &str) -> Analytics {
        self.tenants
            .get(tenant)
            .map(|slot| slot.log.analytics(self.config.analytics.window))
            .unwrap_or_else(Analytics::empty)
    }

    /// The last `limit` interactions of `tenant`, oldest first.
    pub fn history(&self, tenant: &str, limit: usize) -> Vec<InteractionRecord> {
        self.tenants
            .get(tenant)
            .map(|slot| slot.log.recent(limit))
            .unwrap_or_default()
    }

    /// Whether `tenant` has a published index.
    pub fn has_index(&self, tenant: &str) -> bool {
        self.tenants
            .get(tenant)
            .is_some_and(|slot| slot.index().is_some())
    }
}
