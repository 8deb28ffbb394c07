//! Shared types, error model, and configuration for quillbook.
//!
//! This crate is the foundation depended on by all other quillbook crates.
//! It provides:
//! - [`QuillbookError`]: the unified error type
//! - Domain types ([`BookManifest`], [`FetchTask`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BookConfig, BuildConfigSection, ContainerToolConfig, ConvertersConfig,
    DeviceToolConfig, FetchConfig, FetchSection, MarkupConfig, CONFIG_FILE_NAME, expand_tilde,
    init_config, load_config, load_config_from,
};
pub use error::{QuillbookError, Result};
pub use types::{BookManifest, FetchTask};
