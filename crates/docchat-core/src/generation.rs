//! Language-generation collaborator trait.
//!
//! One trait serves every generation use: query rewriting, topic
//! extraction, key-term extraction, and answer synthesis. Providers live in
//! the `docchat` app crate.

use anyhow::{bail, Result};
use async_trait::async_trait;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;
    /// Produce a completion for a system prompt and a user prompt.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Call the generator and reject blank replies.
///
/// Returns the trimmed completion. An empty reply is an error so that every
/// caller's fallback applies uniformly.
pub async fn complete_non_empty(
    generator: &dyn Generator,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String> {
    let reply = generator.complete(system_prompt, user_prompt).await?;
    let reply = reply.trim();
    if reply.is_empty() {
        bail!("{} returned an empty completion", generator.model_name());
    }
    Ok(reply.to_string())
}
