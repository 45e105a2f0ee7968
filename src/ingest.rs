//! Directory loader for plain-text documents.
//!
//! Walks a directory, keeps files matching the include globs (`.md` and
//! `.txt` by default), and returns their bodies as [`DocumentInput`]s
//! labelled with the path relative to the root. Bodies are used as-is.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use docchat_core::models::DocumentInput;

pub fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

/// Load every matching file under `root`, sorted by relative path.
///
/// Files that are not valid UTF-8 are skipped with a warning.
pub fn load_documents(
    root: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<DocumentInput>> {
    if !root.exists() {
        bail!("Document directory does not exist: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        match String::from_utf8(bytes) {
            Ok(text) => documents.push(DocumentInput {
                text,
                source: rel_str,
            }),
            Err(_) => {
                tracing::warn!(path = %path.display(), "skipping non-UTF-8 file");
            }
        }
    }

    // Sort for deterministic ordering
    documents.sort_by(|a, b| a.source.cmp(&b.source));

    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
