//! Core domain types shared between the pipeline stages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BookManifest
// ---------------------------------------------------------------------------

/// The manifest handed to the container converter.
///
/// Serialized with camelCase keys: `tocDepth`, `title`, `subtitle`, `author`,
/// `publisher`, `rights`, `date`, `contents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookManifest {
    pub toc_depth: u32,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub publisher: String,
    pub rights: String,
    /// Build date, `YYYY-MM-DD`.
    pub date: String,
    /// Absolute path to the aggregate Markdown file.
    pub contents: PathBuf,
}

// ---------------------------------------------------------------------------
// FetchTask
// ---------------------------------------------------------------------------

/// A remote image that must be downloaded into the asset cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTask {
    /// Remote `http(s)` URL as written in the source document.
    pub url: String,
    /// Cache file the download is written to.
    pub dest: PathBuf,
}
