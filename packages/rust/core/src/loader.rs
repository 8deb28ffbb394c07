//! Source document loading.
//!
//! Reads an article, strips its YAML frontmatter, and puts the title back as a
//! level-1 heading so every chapter starts with `# <title>`.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use quillbook_markdown::split_frontmatter;
use quillbook_shared::{QuillbookError, Result};

/// A loaded source document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Title from the frontmatter (or the file stem fallback).
    pub title: String,
    /// Source path, as given.
    pub path: PathBuf,
    /// `# <title>\n\n<body>`.
    pub markdown: String,
}

/// Load one document.
///
/// A missing or empty `title` is a validation error unless
/// `allow_missing_title` is set, in which case the file stem is used.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_document(path: &Path, allow_missing_title: bool) -> Result<Document> {
    let raw = std::fs::read_to_string(path).map_err(|e| QuillbookError::io(path, e))?;

    let (frontmatter, body) = split_frontmatter(&raw).map_err(|e| match e {
        QuillbookError::Parse { message } => {
            QuillbookError::parse(format!("{}: {message}", path.display()))
        }
        other => other,
    })?;

    if !frontmatter.extra.is_empty() {
        let keys: Vec<&str> = frontmatter.extra.keys().map(String::as_str).collect();
        debug!(?keys, "ignoring unused frontmatter keys");
    }

    let title = match frontmatter.title.map(|t| t.trim().to_string()) {
        Some(title) if !title.is_empty() => title,
        _ if allow_missing_title => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Untitled".to_string());
            warn!(fallback = %stem, "document has no title, using file name");
            stem
        }
        _ => {
            return Err(QuillbookError::validation(format!(
                "{} has no `title` in its frontmatter",
                path.display()
            )));
        }
    };

    debug!(%title, body_len = body.len(), "document loaded");

    Ok(Document {
        markdown: format!("# {title}\n\n{body}"),
        title,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("qb-loader-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn prepends_title_heading() {
        let dir = temp_dir();
        let path = dir.join("intro.md");
        std::fs::write(&path, "---\ntitle: Intro\n---\nHello").unwrap();

        let doc = load_document(&path, false).unwrap();
        assert_eq!(doc.title, "Intro");
        assert_eq!(doc.markdown, "# Intro\n\nHello");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unused_frontmatter_keys_are_accepted_and_stripped() {
        let dir = temp_dir();
        let path = dir.join("tagged.md");
        let raw = "---\ntitle: Tagged\ntags: [a, b]\ndraft: true\n---\nBody\n";
        std::fs::write(&path, raw).unwrap();

        let doc = load_document(&path, false).unwrap();
        assert_eq!(doc.markdown, "# Tagged\n\nBody\n");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_title_is_rejected() {
        let dir = temp_dir();
        let path = dir.join("untitled.md");
        std::fs::write(&path, "---\nauthor: Someone\n---\nBody\n").unwrap();

        let err = load_document(&path, false).unwrap_err();
        assert!(matches!(err, QuillbookError::Validation { .. }));
        assert!(err.to_string().contains("untitled.md"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_title_falls_back_to_stem_when_allowed() {
        let dir = temp_dir();
        let path = dir.join("getting-started.md");
        std::fs::write(&path, "No frontmatter here.\n").unwrap();

        let doc = load_document(&path, true).unwrap();
        assert_eq!(doc.title, "getting-started");
        assert!(doc.markdown.starts_with("# getting-started\n\n"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unterminated_frontmatter_names_the_file() {
        let dir = temp_dir();
        let path = dir.join("broken.md");
        std::fs::write(&path, "---\ntitle: Broken\nBody").unwrap();

        let err = load_document(&path, false).unwrap_err();
        assert!(matches!(err, QuillbookError::Parse { .. }));
        assert!(err.to_string().contains("broken.md"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_document(Path::new("/nonexistent/quillbook/chapter.md"), false).unwrap_err();
        assert!(matches!(err, QuillbookError::Io { .. }));
    }
}
