//! # docchat Core
//!
//! Runtime-agnostic retrieval logic for docchat: sentence chunking, the
//! per-tenant hybrid index, fused lexical + semantic retrieval,
//! conversational query rewriting, conversation state, and interaction
//! analytics.
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies.
//! External models are reached only through the [`embedding::Embedder`]
//! and [`generation::Generator`] traits.

pub mod chunk;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod interactions;
pub mod lexical;
pub mod models;
pub mod prompts;
pub mod rewrite;
pub mod search;

pub use error::{CollaboratorStage, HarnessError};
