//! End-to-end build: load → transform → fetch → assemble → EPUB → MOBI.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use quillbook_convert::{ContainerConverter, DeviceConverter};
use quillbook_fetcher::{AssetFetcher, FetchReport};
use quillbook_markdown::{TransformOptions, transform};
use quillbook_shared::{AppConfig, FetchConfig, FetchTask, QuillbookError, Result, expand_tilde};

use crate::assembler::{self, AssembleConfig, TransformedDocument};
use crate::loader::load_document;

/// Configuration for [`build_book`].
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Source documents, in book order.
    pub inputs: Vec<PathBuf>,
    pub transform: TransformOptions,
    pub fetch: FetchConfig,
    pub assemble: AssembleConfig,
    /// EPUB destination.
    pub epub_output: PathBuf,
    /// MOBI destination. `None` skips the device conversion.
    pub mobi_output: Option<PathBuf>,
    /// Fall back to the file stem for documents without a title.
    pub allow_missing_title: bool,
    /// Keep the aggregate and manifest after conversion.
    pub keep_intermediates: bool,
}

impl From<&AppConfig> for BuildConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            inputs: config.build.chapters.iter().map(|c| expand_tilde(c)).collect(),
            transform: TransformOptions::from(config),
            fetch: FetchConfig::from(config),
            assemble: AssembleConfig::from(config),
            epub_output: expand_tilde(&config.build.epub_output),
            mobi_output: Some(expand_tilde(&config.build.mobi_output)),
            allow_missing_title: config.build.allow_missing_title,
            keep_intermediates: config.build.keep_intermediates,
        }
    }
}

/// Result of [`build_book`].
#[derive(Debug)]
pub struct BuildResult {
    pub epub: PathBuf,
    pub mobi: Option<PathBuf>,
    /// Number of documents in the book.
    pub documents: usize,
    /// Asset download summary.
    pub fetch: FetchReport,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Documents after loading and transformation, plus the images they need.
#[derive(Debug, Clone)]
pub struct PreparedBook {
    pub documents: Vec<TransformedDocument>,
    /// Pending downloads across all documents, one per destination.
    pub fetches: Vec<FetchTask>,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a document has been loaded and transformed.
    fn document_prepared(&self, path: &Path, current: usize, total: usize);
    /// Called when the build completes.
    fn done(&self, result: &BuildResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_prepared(&self, _path: &Path, _current: usize, _total: usize) {}
    fn done(&self, _result: &BuildResult) {}
}

/// Load and transform every input in order, merging their fetch tasks.
#[instrument(skip_all, fields(inputs = inputs.len()))]
pub fn prepare_book(
    inputs: &[PathBuf],
    opts: &TransformOptions,
    allow_missing_title: bool,
    progress: &dyn ProgressReporter,
) -> Result<PreparedBook> {
    if inputs.is_empty() {
        return Err(QuillbookError::validation(
            "no input documents: pass files on the command line or set [build] chapters",
        ));
    }

    let total = inputs.len();
    let mut documents = Vec::with_capacity(total);
    let mut fetches: Vec<FetchTask> = Vec::new();

    for (i, path) in inputs.iter().enumerate() {
        let doc = load_document(path, allow_missing_title)?;
        let output = transform(&doc.markdown, opts)?;

        for task in output.fetches {
            if !fetches.iter().any(|t| t.dest == task.dest) {
                fetches.push(task);
            }
        }
        documents.push(TransformedDocument {
            source: doc.path,
            markdown: output.markdown,
        });
        progress.document_prepared(path, i + 1, total);
    }

    info!(
        documents = documents.len(),
        pending_fetches = fetches.len(),
        "documents prepared"
    );

    Ok(PreparedBook { documents, fetches })
}

/// Download pending assets. Fails if any download failed.
pub async fn fetch_assets(config: &FetchConfig, fetches: Vec<FetchTask>) -> Result<FetchReport> {
    let fetcher = AssetFetcher::new(config)?;
    fetcher.fetch_all(fetches).await?.into_result()
}

/// Run the full build.
///
/// 1. Load and transform every document
/// 2. Download remote images into the cache
/// 3. Write the aggregate Markdown and manifest
/// 4. Container conversion (EPUB)
/// 5. Device conversion (MOBI), unless skipped
///
/// Intermediate files are removed after a successful EPUB conversion unless
/// `keep_intermediates` is set. On failure they stay in place.
#[instrument(skip_all, fields(inputs = config.inputs.len()))]
pub async fn build_book<C, D>(
    config: &BuildConfig,
    container: &C,
    device: &D,
    progress: &dyn ProgressReporter,
) -> Result<BuildResult>
where
    C: ContainerConverter,
    D: DeviceConverter,
{
    let start = Instant::now();

    // --- Phase 1: Load + transform ---
    progress.phase("Preparing documents");
    let prepared = prepare_book(
        &config.inputs,
        &config.transform,
        config.allow_missing_title,
        progress,
    )?;

    // --- Phase 2: Fetch assets ---
    progress.phase("Downloading images");
    let fetch = fetch_assets(&config.fetch, prepared.fetches).await?;

    // --- Phase 3: Assemble ---
    progress.phase("Assembling book");
    let assembled = assembler::assemble(&config.assemble, &prepared.documents)?;

    // --- Phase 4: EPUB ---
    progress.phase("Generating EPUB");
    container
        .convert(&assembled.manifest_path, &config.epub_output)
        .await?;
    info!(path = %config.epub_output.display(), "EPUB written");

    if !config.keep_intermediates {
        assembler::cleanup(&[
            assembled.aggregate_path.as_path(),
            assembled.manifest_path.as_path(),
        ])?;
    }

    // --- Phase 5: MOBI ---
    let mobi = match &config.mobi_output {
        Some(mobi_output) => {
            progress.phase("Generating MOBI");
            device.convert(&config.epub_output, mobi_output).await?;
            info!(path = %mobi_output.display(), "MOBI written");
            Some(mobi_output.clone())
        }
        None => None,
    };

    let result = BuildResult {
        epub: config.epub_output.clone(),
        mobi,
        documents: prepared.documents.len(),
        fetch,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        documents = result.documents,
        downloaded = result.fetch.downloaded,
        elapsed_ms = result.elapsed.as_millis(),
        "build complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use quillbook_shared::BookManifest;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("qb-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn config(root: &Path, inputs: Vec<PathBuf>) -> BuildConfig {
        let mut app = AppConfig::default();
        app.build.cache_dir = root.join("cache").display().to_string();
        app.build.work_dir = root.join("work").display().to_string();
        app.build.epub_output = root.join("dist/book.epub").display().to_string();
        app.build.mobi_output = root.join("dist/book.mobi").display().to_string();
        BuildConfig {
            inputs,
            ..BuildConfig::from(&app)
        }
    }

    /// Copies the manifest's contents file to the output.
    struct CopyContainer;

    impl ContainerConverter for CopyContainer {
        async fn convert(&self, manifest: &Path, output: &Path) -> Result<()> {
            let raw = std::fs::read_to_string(manifest).unwrap();
            let manifest: BookManifest = serde_json::from_str(&raw).unwrap();
            std::fs::create_dir_all(output.parent().unwrap()).unwrap();
            std::fs::copy(&manifest.contents, output).unwrap();
            Ok(())
        }
    }

    /// Copies input to output and records the call.
    #[derive(Default)]
    struct CopyDevice {
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl DeviceConverter for CopyDevice {
        async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
            std::fs::copy(input, output).unwrap();
            self.calls
                .lock()
                .unwrap()
                .push((input.to_path_buf(), output.to_path_buf()));
            Ok(())
        }
    }

    struct FailingContainer;

    impl ContainerConverter for FailingContainer {
        async fn convert(&self, _manifest: &Path, _output: &Path) -> Result<()> {
            Err(QuillbookError::Conversion("pandoc exited with 1".into()))
        }
    }

    #[test]
    fn prepare_keeps_order_and_materializes_images() {
        let root = temp_dir();
        let a = write(&root, "a.md", "---\ntitle: Intro\n---\nHello\n");
        let b = write(
            &root,
            "b.md",
            "---\ntitle: Next\n---\n![alt](http://example.com/pic.png)\n",
        );
        let cfg = config(&root, vec![a, b]);

        let prepared = prepare_book(&cfg.inputs, &cfg.transform, false, &SilentProgress).unwrap();
        let texts: Vec<&str> = prepared.documents.iter().map(|d| d.markdown.as_str()).collect();
        let aggregate = assembler::concatenate(&texts);

        let intro = aggregate.find("# Intro").unwrap();
        let next = aggregate.find("# Next").unwrap();
        assert!(intro < next);
        assert!(aggregate.contains("Hello"));

        let cached = root.join("cache").join("pic-png.jpg");
        assert!(aggregate.contains(&format!("![]({})", cached.display())));
        assert!(!aggregate.contains("alt"));
        assert!(!aggregate.contains("http://"));

        assert_eq!(prepared.fetches.len(), 1);
        assert_eq!(prepared.fetches[0].url, "http://example.com/pic.png");
        assert_eq!(prepared.fetches[0].dest, cached);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn prepare_merges_fetches_across_documents() {
        let root = temp_dir();
        let a = write(&root, "a.md", "---\ntitle: A\n---\n![](https://x.test/logo.png)\n");
        let b = write(&root, "b.md", "---\ntitle: B\n---\n![](https://y.test/logo.png)\n");
        let cfg = config(&root, vec![a, b]);

        let prepared = prepare_book(&cfg.inputs, &cfg.transform, false, &SilentProgress).unwrap();
        assert_eq!(prepared.fetches.len(), 1);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn prepare_rejects_empty_input() {
        let err = prepare_book(&[], &TransformOptions::default(), false, &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, QuillbookError::Validation { .. }));
    }

    #[tokio::test]
    async fn build_produces_both_formats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pic.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let root = temp_dir();
        let a = write(&root, "a.md", "---\ntitle: Intro\n---\nHello\n");
        let b = write(
            &root,
            "b.md",
            &format!("---\ntitle: Next\n---\n![alt]({}/pic.png)\n", server.uri()),
        );
        let cfg = config(&root, vec![a, b]);
        let device = CopyDevice::default();

        let result = build_book(&cfg, &CopyContainer, &device, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.documents, 2);
        assert_eq!(result.fetch.downloaded, 1);
        assert_eq!(std::fs::read(root.join("cache/pic-png.jpg")).unwrap(), b"png");

        let epub = std::fs::read_to_string(&result.epub).unwrap();
        assert!(epub.starts_with("# Intro\n"));
        assert!(epub.contains("pic-png.jpg"));

        let mobi = result.mobi.unwrap();
        assert!(mobi.exists());
        assert_eq!(device.calls.lock().unwrap()[0].0, cfg.epub_output);

        assert!(!cfg.assemble.work_dir.join("book.md").exists());
        assert!(!cfg.assemble.work_dir.join("manifest.json").exists());

        // Cache is warm: a rebuild makes no further requests.
        let again = build_book(&cfg, &CopyContainer, &device, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(again.fetch.downloaded, 0);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn skip_mobi_and_keep_intermediates() {
        let root = temp_dir();
        let a = write(&root, "a.md", "---\ntitle: Only\n---\nText\n");
        let mut cfg = config(&root, vec![a]);
        cfg.mobi_output = None;
        cfg.keep_intermediates = true;
        let device = CopyDevice::default();

        let result = build_book(&cfg, &CopyContainer, &device, &SilentProgress)
            .await
            .unwrap();

        assert!(result.mobi.is_none());
        assert!(device.calls.lock().unwrap().is_empty());
        assert!(cfg.assemble.work_dir.join("book.md").exists());
        assert!(cfg.assemble.work_dir.join("manifest.json").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failed_download_stops_before_conversion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let root = temp_dir();
        let a = write(
            &root,
            "a.md",
            &format!("---\ntitle: A\n---\n![]({}/broken.png)\n", server.uri()),
        );
        let cfg = config(&root, vec![a]);
        let device = CopyDevice::default();

        let err = build_book(&cfg, &CopyContainer, &device, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, QuillbookError::Fetch { failed: 1, .. }));
        assert!(!cfg.epub_output.exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn container_failure_keeps_intermediates() {
        let root = temp_dir();
        let a = write(&root, "a.md", "---\ntitle: A\n---\nText\n");
        let cfg = config(&root, vec![a]);
        let device = CopyDevice::default();

        let err = build_book(&cfg, &FailingContainer, &device, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, QuillbookError::Conversion(_)));
        assert!(cfg.assemble.work_dir.join("book.md").exists());
        assert!(device.calls.lock().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&root);
    }
}
