//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! [`load_config`] parses and validates; [`Config::minimal`] builds the
//! offline default used when no file exists.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use docchat_core::chunk::DEFAULT_MAX_CHARS;
use docchat_core::index::IndexParams;
use docchat_core::interactions::DEFAULT_ANALYTICS_WINDOW;
use docchat_core::lexical::Bm25Params;
use docchat_core::rewrite::RewriteOptions;
use docchat_core::search::RetrievalParams;

pub const DEFAULT_CONFIG_PATH: &str = "./config/docchat.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_fusion_weight")]
    pub fusion_weight: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fusion_weight: default_fusion_weight(),
            top_k: default_top_k(),
            confidence_threshold: default_confidence_threshold(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
        }
    }
}

fn default_fusion_weight() -> f64 {
    0.7
}
fn default_top_k() -> usize {
    3
}
fn default_confidence_threshold() -> f64 {
    0.1
}
fn default_bm25_k1() -> f64 {
    1.5
}
fn default_bm25_b() -> f64 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Deadline for one call, covering every retry.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Deadline for a single HTTP attempt. Defaults to an even share of
    /// `timeout_secs` across all attempts, so a hung attempt leaves room
    /// for retries.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            request_timeout_secs: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn attempt_timeout_secs(&self) -> u64 {
        attempt_timeout_secs(self.request_timeout_secs, self.timeout_secs, self.max_retries)
    }
}

fn attempt_timeout_secs(explicit: Option<u64>, total: u64, max_retries: u32) -> u64 {
    explicit
        .unwrap_or(total / (u64::from(max_retries) + 1))
        .max(1)
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_true")]
    pub normalize_queries: bool,
    #[serde(default = "default_true")]
    pub extract_key_terms: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            timeout_secs: default_timeout_secs(),
            request_timeout_secs: None,
            max_retries: default_generation_retries(),
            temperature: default_temperature(),
            normalize_queries: true,
            extract_key_terms: true,
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_retries() -> u32 {
    2
}
fn default_temperature() -> f32 {
    0.2
}
fn default_true() -> bool {
    true
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn attempt_timeout_secs(&self) -> u64 {
        attempt_timeout_secs(self.request_timeout_secs, self.timeout_secs, self.max_retries)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_ANALYTICS_WINDOW,
        }
    }
}

fn default_window() -> usize {
    DEFAULT_ANALYTICS_WINDOW
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Per-tenant overrides under `[tenants.<id>]`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TenantConfig {
    #[serde(default)]
    pub fusion_weight: Option<f64>,
}

impl Config {
    /// Offline configuration: hashing embedder, generation disabled, and
    /// no generation-backed normalisation or key-term passes.
    pub fn minimal() -> Self {
        let mut config = Self::default();
        config.generation.normalize_queries = false;
        config.generation.extract_key_terms = false;
        config
    }

    /// Retrieval parameters for `tenant`, applying any per-tenant override.
    pub fn retrieval_params_for(&self, tenant: &str) -> RetrievalParams {
        let fusion_weight = self
            .tenants
            .get(tenant)
            .and_then(|t| t.fusion_weight)
            .unwrap_or(self.retrieval.fusion_weight);
        RetrievalParams {
            fusion_weight,
            top_k: self.retrieval.top_k,
            confidence_threshold: self.retrieval.confidence_threshold,
        }
    }

    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            bm25: Bm25Params {
                k1: self.retrieval.bm25_k1,
                b: self.retrieval.bm25_b,
            },
            embed_batch_size: self.embedding.batch_size,
        }
    }

    pub fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            normalize_queries: self.generation.normalize_queries,
        }
    }

    /// Check ranges and provider names.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chars == 0 {
            bail!("chunking.max_chars must be > 0");
        }

        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.fusion_weight) {
            bail!("retrieval.fusion_weight must be in [0.0, 1.0]");
        }
        if r.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if !(0.0..=1.0).contains(&r.confidence_threshold) {
            bail!("retrieval.confidence_threshold must be in [0.0, 1.0]");
        }
        if r.bm25_k1.is_nan() || r.bm25_k1 < 0.0 {
            bail!("retrieval.bm25_k1 must be >= 0");
        }
        if !(0.0..=1.0).contains(&r.bm25_b) {
            bail!("retrieval.bm25_b must be in [0.0, 1.0]");
        }

        for (id, tenant) in &self.tenants {
            if let Some(w) = tenant.fusion_weight {
                if !(0.0..=1.0).contains(&w) {
                    bail!("tenants.{}.fusion_weight must be in [0.0, 1.0]", id);
                }
            }
        }

        if self.analytics.window < 1 {
            bail!("analytics.window must be >= 1");
        }

        let e = &self.embedding;
        if e.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        match e.provider.as_str() {
            "disabled" | "hashing" | "local" => {}
            "openai" | "ollama" => {
                if e.dims.is_none() || e.dims == Some(0) {
                    bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
                }
                if e.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        e.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be hashing, openai, ollama, local, or disabled.",
                other
            ),
        }
        if e.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }

        let g = &self.generation;
        match g.provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" => {
                if g.model.is_none() {
                    bail!(
                        "generation.model must be specified when provider is '{}'",
                        g.provider
                    );
                }
            }
            other => bail!(
                "Unknown generation provider: '{}'. Must be openai, ollama, or disabled.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&g.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }

        for (section, total, attempt) in [
            ("embedding", e.timeout_secs, e.request_timeout_secs),
            ("generation", g.timeout_secs, g.request_timeout_secs),
        ] {
            if total == 0 {
                bail!("{}.timeout_secs must be > 0", section);
            }
            if let Some(attempt) = attempt {
                if attempt == 0 || attempt > total {
                    bail!(
                        "{}.request_timeout_secs must be in [1, timeout_secs]",
                        section
                    );
                }
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found, using offline defaults");
        Ok(Config::minimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_is_offline() {
        let config = Config::minimal();
        assert!(config.validate().is_ok());
        assert_eq!(config.embedding.provider, "hashing");
        assert!(!config.generation.is_enabled());
        assert!(!config.generation.normalize_queries);
        assert!(!config.generation.extract_key_terms);
    }

    #[test]
    fn test_attempt_timeout_leaves_room_for_retries() {
        let config = parse_config("").unwrap();
        // 30s over 6 embedding attempts, 30s over 3 generation attempts.
        assert_eq!(config.embedding.attempt_timeout_secs(), 5);
        assert_eq!(config.generation.attempt_timeout_secs(), 10);

        let config = parse_config(
            "[generation]\ntimeout_secs = 2\nmax_retries = 5\n\n[embedding]\nrequest_timeout_secs = 12\n",
        )
        .unwrap();
        assert_eq!(config.embedding.attempt_timeout_secs(), 12);
        assert_eq!(config.generation.attempt_timeout_secs(), 1);

        let err = parse_config("[embedding]\ntimeout_secs = 10\nrequest_timeout_secs = 20\n")
            .unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.provider, "hashing");
        assert!(!config.generation.is_enabled());
        assert_eq!(config.analytics.window, 50);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_tenant_override() {
        let config = parse_config(
            r#"
[retrieval]
fusion_weight = 0.6

[tenants.acme]
fusion_weight = 0.2
"#,
        )
        .unwrap();
        assert_eq!(config.retrieval_params_for("acme").fusion_weight, 0.2);
        assert_eq!(config.retrieval_params_for("globex").fusion_weight, 0.6);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(parse_config("[retrieval]\nfusion_weight = 1.5").is_err());
        assert!(parse_config("[retrieval]\ntop_k = 0").is_err());
        assert!(parse_config("[retrieval]\nconfidence_threshold = -0.1").is_err());
        assert!(parse_config("[retrieval]\nbm25_b = 2.0").is_err());
        assert!(parse_config("[chunking]\nmax_chars = 0").is_err());
        assert!(parse_config("[analytics]\nwindow = 0").is_err());
        assert!(parse_config("[tenants.acme]\nfusion_weight = -1.0").is_err());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"").is_err());
        assert!(parse_config("[generation]\nprovider = \"magic\"").is_err());
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        assert!(parse_config("[embedding]\nprovider = \"openai\"").is_err());
        assert!(parse_config(
            "[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768"
        )
        .is_ok());
    }

    #[test]
    fn test_generation_requires_model() {
        assert!(parse_config("[generation]\nprovider = \"openai\"").is_err());
        let config =
            parse_config("[generation]\nprovider = \"openai\"\nmodel = \"gpt-4o-mini\"").unwrap();
        assert!(config.generation.normalize_queries);
        assert!(config.generation.extract_key_terms);
    }
}
