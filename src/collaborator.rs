//! Per-call timeouts for collaborators.
//!
//! [`BoundedEmbedder`] and [`BoundedGenerator`] wrap any provider and turn
//! a call that outlives its deadline into an ordinary error, so the core's
//! fallbacks handle timeouts and failures identically.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use docchat_core::embedding::Embedder;
use docchat_core::generation::Generator;

pub struct BoundedEmbedder {
    inner: Arc<dyn Embedder>,
    timeout: Duration,
}

impl BoundedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl Embedder for BoundedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match tokio::time::timeout(self.timeout, self.inner.encode(texts)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!(
                "{} embedding timed out after {:?}",
                self.inner.model_name(),
                self.timeout
            ),
        }
    }
}

pub struct BoundedGenerator {
    inner: Arc<dyn Generator>,
    timeout: Duration,
}

impl BoundedGenerator {
    pub fn new(inner: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl Generator for BoundedGenerator {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.inner.complete(system_prompt, user_prompt))
            .await
        {
            Ok(result) => result,
            Err(_) => anyhow::bail!(
                "{} generation timed out after {:?}",
                self.inner.model_name(),
                self.timeout
            ),
        }
    }
}
