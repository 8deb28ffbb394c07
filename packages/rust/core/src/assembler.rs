//! Book assembler.
//!
//! Concatenates transformed documents into one aggregate Markdown file and
//! writes the manifest the container converter reads.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, instrument};

use quillbook_shared::{AppConfig, BookConfig, BookManifest, QuillbookError, Result, expand_tilde};

/// A document after the transformation pipeline, ready for assembly.
#[derive(Debug, Clone)]
pub struct TransformedDocument {
    /// Source path, for logging.
    pub source: PathBuf,
    /// Transformed Markdown.
    pub markdown: String,
}

/// Configuration for book assembly.
#[derive(Debug, Clone)]
pub struct AssembleConfig {
    /// Directory receiving the aggregate and the manifest.
    pub work_dir: PathBuf,
    /// File name of the aggregate Markdown.
    pub aggregate_name: String,
    /// File name of the manifest.
    pub manifest_name: String,
    /// Book metadata copied into the manifest.
    pub book: BookConfig,
}

impl From<&AppConfig> for AssembleConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            work_dir: expand_tilde(&config.build.work_dir),
            aggregate_name: config.build.aggregate_name.clone(),
            manifest_name: config.build.manifest_name.clone(),
            book: config.book.clone(),
        }
    }
}

/// Output from a successful assembly.
#[derive(Debug, Clone)]
pub struct AssembleResult {
    /// Absolute path to the aggregate Markdown file.
    pub aggregate_path: PathBuf,
    /// Path to the manifest file.
    pub manifest_path: PathBuf,
    /// The manifest that was written.
    pub manifest: BookManifest,
}

/// Join documents with one blank line between them.
pub fn concatenate<S: AsRef<str>>(texts: &[S]) -> String {
    let mut out = texts
        .iter()
        .map(|t| t.as_ref().trim_end_matches('\n'))
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

/// Write the aggregate Markdown and its manifest into the work directory.
#[instrument(skip_all, fields(work_dir = %config.work_dir.display(), documents = documents.len()))]
pub fn assemble(
    config: &AssembleConfig,
    documents: &[TransformedDocument],
) -> Result<AssembleResult> {
    std::fs::create_dir_all(&config.work_dir)
        .map_err(|e| QuillbookError::io(&config.work_dir, e))?;

    for doc in documents {
        debug!(source = %doc.source.display(), len = doc.markdown.len(), "appending document");
    }
    let texts: Vec<&str> = documents.iter().map(|d| d.markdown.as_str()).collect();
    let aggregate = concatenate(&texts);

    let aggregate_path = config.work_dir.join(&config.aggregate_name);
    write_atomic(&aggregate_path, aggregate.as_bytes())?;
    let aggregate_path = std::fs::canonicalize(&aggregate_path)
        .map_err(|e| QuillbookError::io(&aggregate_path, e))?;

    let manifest = build_manifest(&config.book, &aggregate_path);
    let manifest_path = config.work_dir.join(&config.manifest_name);
    write_json(&manifest_path, &manifest)?;

    info!(
        aggregate = %aggregate_path.display(),
        size = aggregate.len(),
        "book assembled"
    );

    Ok(AssembleResult {
        aggregate_path,
        manifest_path,
        manifest,
    })
}

/// Remove intermediate files. Files that are already gone are ignored.
pub fn cleanup(paths: &[&Path]) -> Result<()> {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed intermediate file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(QuillbookError::io(*path, e)),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_manifest(book: &BookConfig, contents: &Path) -> BookManifest {
    BookManifest {
        toc_depth: book.toc_depth,
        title: book.title.clone(),
        subtitle: book.subtitle.clone(),
        author: book.author.clone(),
        publisher: book.publisher.clone(),
        rights: book.rights.clone(),
        date: Local::now().format("%Y-%m-%d").to_string(),
        contents: contents.to_path_buf(),
    }
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| QuillbookError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| QuillbookError::io(path, e))?;
    Ok(())
}

/// Write a JSON file (pretty-printed).
fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(|e| {
        QuillbookError::validation(format!("JSON serialization failed: {e}"))
    })?;
    write_atomic(path, json.as_bytes())?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
