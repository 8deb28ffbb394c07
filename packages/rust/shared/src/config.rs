//! Project configuration for quillbook.
//!
//! A book project is described by `quillbook.toml` in the working directory
//! (or the file passed with `--config`). CLI flags override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuillbookError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "quillbook.toml";

// ---------------------------------------------------------------------------
// Config structs (matching quillbook.toml schema)
// ---------------------------------------------------------------------------

/// Top-level project config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Descriptive book metadata written to the manifest.
    #[serde(default)]
    pub book: BookConfig,

    /// Inputs, outputs and intermediate locations.
    #[serde(default)]
    pub build: BuildConfigSection,

    /// Custom markup recognised by the transformation pipeline.
    #[serde(default)]
    pub markup: MarkupConfig,

    /// Remote image download settings.
    #[serde(default)]
    pub fetch: FetchSection,

    /// External converter tools.
    #[serde(default)]
    pub converters: ConvertersConfig,
}

/// `[book]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub rights: String,
    /// Heading depth included in the generated table of contents.
    #[serde(default = "default_toc_depth")]
    pub toc_depth: u32,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            subtitle: String::new(),
            author: String::new(),
            publisher: String::new(),
            rights: String::new(),
            toc_depth: default_toc_depth(),
        }
    }
}

fn default_title() -> String {
    "Untitled".into()
}
fn default_toc_depth() -> u32 {
    2
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfigSection {
    /// Ordered chapter files. Positional CLI arguments replace this list.
    #[serde(default)]
    pub chapters: Vec<String>,

    /// Persistent image cache directory, also used verbatim in rewritten image URLs.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Directory for the aggregate Markdown file and the manifest.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    #[serde(default = "default_epub_output")]
    pub epub_output: String,

    #[serde(default = "default_mobi_output")]
    pub mobi_output: String,

    #[serde(default = "default_aggregate_name")]
    pub aggregate_name: String,

    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,

    /// Fall back to the file stem instead of failing when a chapter has no title.
    #[serde(default)]
    pub allow_missing_title: bool,

    /// Leave the aggregate Markdown and manifest in place after a successful build.
    #[serde(default)]
    pub keep_intermediates: bool,
}

impl Default for BuildConfigSection {
    fn default() -> Self {
        Self {
            chapters: Vec::new(),
            cache_dir: default_cache_dir(),
            work_dir: default_work_dir(),
            epub_output: default_epub_output(),
            mobi_output: default_mobi_output(),
            aggregate_name: default_aggregate_name(),
            manifest_name: default_manifest_name(),
            allow_missing_title: false,
            keep_intermediates: false,
        }
    }
}

fn default_cache_dir() -> String {
    "cache".into()
}
fn default_work_dir() -> String {
    ".quillbook".into()
}
fn default_epub_output() -> String {
    "book.epub".into()
}
fn default_mobi_output() -> String {
    "book.mobi".into()
}
fn default_aggregate_name() -> String {
    "book.md".into()
}
fn default_manifest_name() -> String {
    "manifest.json".into()
}

/// `[markup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupConfig {
    /// Element name of the aside block rewritten into a blockquote.
    #[serde(default = "default_aside_tag")]
    pub aside_tag: String,

    /// Element name of the checkbox container rewritten into a list item.
    #[serde(default = "default_checkbox_tag")]
    pub checkbox_tag: String,

    /// Relative asset prefix used inside aside blocks.
    #[serde(default = "default_relative_asset_prefix")]
    pub relative_asset_prefix: String,

    /// Absolute asset prefix used by regular Markdown images.
    #[serde(default = "default_absolute_asset_prefix")]
    pub absolute_asset_prefix: String,

    /// What both asset prefixes are rewritten to.
    #[serde(default = "default_asset_prefix_replacement")]
    pub asset_prefix_replacement: String,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            aside_tag: default_aside_tag(),
            checkbox_tag: default_checkbox_tag(),
            relative_asset_prefix: default_relative_asset_prefix(),
            absolute_asset_prefix: default_absolute_asset_prefix(),
            asset_prefix_replacement: default_asset_prefix_replacement(),
        }
    }
}

fn default_aside_tag() -> String {
    "aside".into()
}
fn default_checkbox_tag() -> String {
    "checkbox-container".into()
}
fn default_relative_asset_prefix() -> String {
    "../assets/".into()
}
fn default_absolute_asset_prefix() -> String {
    "/assets/".into()
}
fn default_asset_prefix_replacement() -> String {
    "assets/".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_user_agent() -> String {
    concat!("quillbook/", env!("CARGO_PKG_VERSION")).into()
}

/// `[converters]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertersConfig {
    #[serde(default)]
    pub container: ContainerToolConfig,

    #[serde(default)]
    pub device: DeviceToolConfig,
}

/// `[converters.container]`: the manifest → EPUB tool.
///
/// Argument placeholders: `{manifest}`, `{output}`, `{contents}`,
/// `{toc_depth}`, `{title}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerToolConfig {
    #[serde(default = "default_container_program")]
    pub program: String,

    #[serde(default = "default_container_args")]
    pub args: Vec<String>,
}

impl Default for ContainerToolConfig {
    fn default() -> Self {
        Self {
            program: default_container_program(),
            args: default_container_args(),
        }
    }
}

fn default_container_program() -> String {
    "pandoc".into()
}
fn default_container_args() -> Vec<String> {
    [
        "--metadata-file",
        "{manifest}",
        "--toc",
        "--toc-depth",
        "{toc_depth}",
        "-o",
        "{output}",
        "{contents}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[converters.device]`: the EPUB → MOBI tool.
///
/// Argument placeholders: `{input}`, `{output}`, `{output_name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToolConfig {
    #[serde(default = "default_device_program")]
    pub program: String,

    #[serde(default = "default_device_args")]
    pub args: Vec<String>,

    /// Text in the tool's output that means generation failed, whatever the exit code.
    #[serde(default = "default_failure_marker")]
    pub failure_marker: String,

    #[serde(default = "default_accepted_exit_codes")]
    pub accepted_exit_codes: Vec<i32>,
}

impl Default for DeviceToolConfig {
    fn default() -> Self {
        Self {
            program: default_device_program(),
            args: default_device_args(),
            failure_marker: default_failure_marker(),
            accepted_exit_codes: default_accepted_exit_codes(),
        }
    }
}

fn default_device_program() -> String {
    "kindlegen".into()
}
fn default_device_args() -> Vec<String> {
    ["{input}", "-c1", "-dont_append_source", "-o", "{output_name}"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_failure_marker() -> String {
    "MOBI file could not be generated".into()
}
fn default_accepted_exit_codes() -> Vec<i32> {
    // kindlegen exits with 1 when it only emitted warnings
    vec![0, 1]
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, derived from the config file)
// ---------------------------------------------------------------------------

/// Runtime asset fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Maximum number of redirects followed per download.
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.fetch.timeout_secs),
            user_agent: config.fetch.user_agent.clone(),
            max_redirects: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Load the project config.
///
/// An explicit path must exist. Without one, `./quillbook.toml` is used when
/// present and defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }

    let path = PathBuf::from(CONFIG_FILE_NAME);
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the project config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| QuillbookError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        QuillbookError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate(&config)?;
    Ok(config)
}

/// Write a default config file. Refuses to overwrite an existing one.
pub fn init_config(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Err(QuillbookError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| QuillbookError::io(parent, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| QuillbookError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| QuillbookError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}

fn validate(config: &AppConfig) -> Result<()> {
    for (key, tag) in [
        ("markup.aside_tag", &config.markup.aside_tag),
        ("markup.checkbox_tag", &config.markup.checkbox_tag),
    ] {
        let valid = !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(QuillbookError::config(format!(
                "{key} must be a bare element name, got {tag:?}"
            )));
        }
    }

    if config.build.cache_dir.trim().is_empty() {
        return Err(QuillbookError::config("build.cache_dir must not be empty"));
    }

    Ok(())
}
