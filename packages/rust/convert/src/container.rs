//! Manifest → EPUB conversion through an external command.

use std::path::Path;

use tracing::instrument;

use quillbook_shared::{BookManifest, ContainerToolConfig, QuillbookError, Result};

use crate::ContainerConverter;
use crate::command::{run_tool, tail};

/// Runs the configured container tool (pandoc by default).
///
/// The tool's arguments may reference `{manifest}`, `{output}` and, read
/// from the manifest file, `{contents}`, `{toc_depth}` and `{title}`.
#[derive(Debug, Clone, Default)]
pub struct CommandContainerConverter {
    tool: ContainerToolConfig,
}

impl CommandContainerConverter {
    pub fn new(tool: ContainerToolConfig) -> Self {
        Self { tool }
    }

    async fn run(&self, manifest: &Path, output: &Path) -> Result<()> {
        let raw = tokio::fs::read_to_string(manifest)
            .await
            .map_err(|e| QuillbookError::io(manifest, e))?;
        let parsed: BookManifest = serde_json::from_str(&raw).map_err(|e| {
            QuillbookError::parse(format!("invalid manifest {}: {e}", manifest.display()))
        })?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| QuillbookError::io(parent, e))?;
        }

        let vars = [
            ("manifest", manifest.display().to_string()),
            ("output", output.display().to_string()),
            ("contents", parsed.contents.display().to_string()),
            ("toc_depth", parsed.toc_depth.to_string()),
            ("title", parsed.title.clone()),
        ];
        let result = run_tool(&self.tool.program, &self.tool.args, &vars).await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(QuillbookError::Conversion(format!(
                "`{}` exited with {}: {}",
                self.tool.program,
                result.status,
                tail(&stderr, 5)
            )));
        }

        if !output.exists() {
            return Err(QuillbookError::Conversion(format!(
                "`{}` reported success but {} was not created",
                self.tool.program,
                output.display()
            )));
        }

        Ok(())
    }
}

impl ContainerConverter for CommandContainerConverter {
    #[instrument(skip_all, fields(manifest = %manifest.display(), output = %output.display()))]
    async fn convert(&self, manifest: &Path, output: &Path) -> Result<()> {
        self.run(manifest, output).await
    }
}
