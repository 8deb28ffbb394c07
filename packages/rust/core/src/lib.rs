//! Build orchestration for quillbook.
//!
//! This crate ties together document loading, the Markdown transformation
//! pipeline, asset fetching, book assembly, and format conversion into the
//! end-to-end [`build_book`] workflow.

pub mod assembler;
pub mod loader;
pub mod pipeline;

pub use assembler::{
    AssembleConfig, AssembleResult, TransformedDocument, assemble, cleanup, concatenate,
};
pub use loader::{Document, load_document};
pub use pipeline::{
    BuildConfig, BuildResult, PreparedBook, ProgressReporter, SilentProgress, build_book,
    fetch_assets, prepare_book,
};
