//! Error types for quillbook.
//!
//! Library crates use [`QuillbookError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all quillbook operations.
#[derive(Debug, thiserror::Error)]
pub enum QuillbookError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while downloading a single asset.
    #[error("network error: {0}")]
    Network(String),

    /// One or more asset downloads failed.
    #[error("{failed} asset download(s) failed:\n{summary}")]
    Fetch { failed: usize, summary: String },

    /// Frontmatter or markup parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (missing title, empty chapter list, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Markdown serialization or external ebook conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuillbookError>;

impl QuillbookError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a [`QuillbookError::Fetch`] from per-asset `(url, message)` failures.
    pub fn fetch(errors: &[(String, String)]) -> Self {
        let summary = errors
            .iter()
            .map(|(url, msg)| format!("  {url}: {msg}"))
            .collect::<Vec<_>>()
            .join("\n");
        Self::Fetch {
            failed: errors.len(),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = QuillbookError::config("unknown key `foo`");
        assert_eq!(err.to_string(), "config error: unknown key `foo`");

        let err = QuillbookError::validation("missing title in chapters/01.md");
        assert!(err.to_string().contains("chapters/01.md"));
    }

    #[test]
    fn fetch_error_lists_every_url() {
        let err = QuillbookError::fetch(&[
            ("https://a.example/x.png".into(), "HTTP 404".into()),
            ("https://b.example/y.png".into(), "timed out".into()),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 asset download(s) failed"));
        assert!(msg.contains("https://a.example/x.png: HTTP 404"));
        assert!(msg.contains("https://b.example/y.png: timed out"));
    }
}
