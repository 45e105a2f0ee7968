//! # docchat
//!
//! Multi-tenant question answering over private document collections.
//!
//! Each tenant's documents are split into sentence-aligned chunks and
//! indexed three ways (TF-IDF, BM25, dense embeddings). Questions are
//! rewritten against the tenant's conversation, answered from the fused
//! top-ranked passages by a generation model, and logged for analytics.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Documents  │──▶│    Chunk +   │──▶│ TenantIndex  │
//! │ HTTP / dir  │   │ Embed (build)│   │ (Arc swap)   │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                   ┌─────────────────────────┤
//!                   ▼                         ▼
//!              ┌──────────┐             ┌──────────┐
//!              │   CLI    │             │   HTTP   │
//!              │(docchat) │             │  (axum)  │
//!              └──────────┘             └──────────┘
//! ```
//!
//! Retrieval, rewriting, conversation state, and analytics live in
//! [`docchat_core`]; this crate supplies configuration, model providers,
//! tenant state, and the outer surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`collaborator`] | Per-call timeouts for providers |
//! | [`tenants`] | Per-tenant index, conversation, and log |
//! | [`engine`] | Ingestion and the question-answering pipeline |
//! | [`ingest`] | Directory loader for text files |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing setup |

pub mod collaborator;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod server;
pub mod tenants;
