//! Bulk ingestion of documents from the filesystem.
//!
//! Scans a directory recursively, turning every supported text file into a
//! document keyed by its slash-normalized path relative to the ingest root
//! (bare file names would collide across subdirectories). Traversal order
//! is sorted, so repeated runs ingest in the same order.

use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::manager::KnowledgeBase;
use crate::types::KbError;

/// File extensions treated as ingestible text.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Totals for one directory ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
    /// Files skipped because their extension is not supported.
    pub skipped: usize,
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

fn document_id_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut id = String::new();
    for component in relative.components() {
        if !id.is_empty() {
            id.push('/');
        }
        id.push_str(&component.as_os_str().to_string_lossy());
    }
    id
}

/// Ingests every supported file under `root` into the knowledge base.
///
/// Unsupported files are counted and skipped; read or indexing failures
/// abort the run and propagate (files already ingested stay indexed, each
/// add was atomic on its own).
pub async fn ingest_directory(
    knowledge_base: &KnowledgeBase,
    root: impl AsRef<Path>,
) -> Result<IngestSummary, KbError> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(KbError::InvalidArgument(format!(
            "'{}' is not a directory",
            root.display()
        )));
    }

    let mut summary = IngestSummary::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            err.into_io_error()
                .map(KbError::Io)
                .unwrap_or_else(|| KbError::Storage("directory walk failed".to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !is_supported(path) {
            debug!(path = %path.display(), "skipping unsupported file");
            summary.skipped += 1;
            continue;
        }

        let text = tokio::fs::read_to_string(path).await?;
        let document_id = document_id_for(root, path);
        let metadata = serde_json::json!({
            "file_name": path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            "source_path": document_id,
        });

        let report = knowledge_base
            .add_document_with_metadata(&document_id, &text, metadata)
            .await?;
        summary.documents += 1;
        summary.chunks += report.chunk_count;
    }

    info!(
        documents = summary.documents,
        chunks = summary.chunks,
        skipped = summary.skipped,
        root = %root.display(),
        "directory ingestion complete"
    );
    Ok(summary)
}
