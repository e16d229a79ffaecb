//! Turning bytes on disk into [`FileRecord`]s.

use super::{FileKind, FileRecord};
use anyhow::{Context, Result};
use base64::Engine;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files larger than this are skipped during directory ingestion
const MAX_INGEST_BYTES: u64 = 512 * 1024;

/// Build a record from raw bytes and a declared kind.
///
/// Images are stored base64-encoded; every other kind must be valid UTF-8.
pub fn ingest_bytes(name: &str, bytes: &[u8], kind: FileKind) -> Result<FileRecord> {
    if kind == FileKind::Image {
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        let record = FileRecord::new(name, data, kind);
        return Ok(match image_media_type(name) {
            Some(media_type) => record.with_media_type(media_type),
            None => record,
        });
    }

    let text = std::str::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8 text", name))?;
    Ok(FileRecord::new(name, text, kind))
}

/// Read a single file. `kind` defaults to the extension heuristic.
pub async fn ingest_path(path: &Path, name: &str, kind: Option<FileKind>) -> Result<FileRecord> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let kind = kind.unwrap_or_else(|| FileKind::infer(name));
    ingest_bytes(name, &bytes, kind)
}

/// Read every eligible file under `root`, naming records by their path
/// relative to `root`. Unreadable, oversized and non-UTF-8 files are skipped.
/// A declared `kind` applies to every file; otherwise each is inferred.
pub async fn ingest_dir(root: &Path, kind: Option<FileKind>) -> Result<Vec<FileRecord>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", root.display()))?;

    let mut records = Vec::new();
    for (path, name) in collect_paths(&root) {
        match ingest_path(&path, &name, kind).await {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(file = %name, "skipping file: {:#}", err),
        }
    }
    tracing::info!(count = records.len(), root = %root.display(), "ingested directory");
    Ok(records)
}

fn collect_paths(root: &Path) -> Vec<(PathBuf, String)> {
    let mut out = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e.path()));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.metadata().map(|m| m.len() > MAX_INGEST_BYTES).unwrap_or(true) {
            tracing::debug!(path = %entry.path().display(), "skipping oversized file");
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push((entry.path().to_path_buf(), name));
    }
    out
}

/// Check if a path should be ignored
fn is_ignored(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    let ignored = [
        "target",
        "node_modules",
        "dist",
        "build",
        "__pycache__",
        "vendor",
        "venv",
    ];

    ignored.contains(&name) || name.starts_with('.')
}

fn image_media_type(name: &str) -> Option<&'static str> {
    let ext = super::extension(name)?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
