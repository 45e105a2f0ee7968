use std::fs;

use docchat::config::{load_config, load_or_minimal};
use docchat::engine::{AskStatus, Engine};
use docchat::ingest::{default_include_globs, load_documents};

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docchat.toml");
    fs::write(
        &path,
        r#"
[chunking]
max_chars = 200

[retrieval]
fusion_weight = 0.5
top_k = 2
confidence_threshold = 0.2

[embedding]
provider = "hashing"
dims = 256

[analytics]
window = 10

[server]
bind = "0.0.0.0:9000"

[tenants.acme]
fusion_weight = 0.9
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.chunking.max_chars, 200);
    assert_eq!(config.embedding.dims, Some(256));
    assert_eq!(config.analytics.window, 10);
    assert_eq!(config.server.bind, "0.0.0.0:9000");

    let acme = config.retrieval_params_for("acme");
    assert_eq!(acme.fusion_weight, 0.9);
    assert_eq!(acme.top_k, 2);
    assert_eq!(acme.confidence_threshold, 0.2);
    assert_eq!(config.retrieval_params_for("other").fusion_weight, 0.5);
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[retrieval]\ntop_k = 0\n").unwrap();
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("top_k"));

    fs::write(&path, "not = [valid").unwrap();
    assert!(load_config(&path).is_err());
}

#[test]
fn test_missing_file_falls_back_to_minimal() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_or_minimal(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.embedding.provider, "hashing");
    assert!(!config.generation.is_enabled());
}

#[tokio::test]
async fn test_offline_engine_over_directory() {
    let docs = tempfile::tempdir().unwrap();
    fs::write(
        docs.path().join("refunds.md"),
        "Refunds are accepted within 30 days. Keep your receipt.",
    )
    .unwrap();
    fs::write(docs.path().join("hours.txt"), "We open at nine every weekday.").unwrap();

    let documents = load_documents(docs.path(), &default_include_globs(), &[]).unwrap();
    assert_eq!(documents.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let config = load_or_minimal(&dir.path().join("absent.toml")).unwrap();
    let engine = Engine::from_config(config).unwrap();
    let report = engine.ingest("local", documents).await.unwrap();
    assert_eq!(report.sources, 2);

    // Generation is disabled offline, but retrieval still reports the match.
    let response = engine.ask("local", "refunds receipt").await;
    assert_eq!(response.status, AskStatus::GenerationFailed);
    assert_eq!(response.source.as_deref(), Some("refunds.md"));
}
