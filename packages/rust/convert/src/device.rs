//! EPUB → MOBI conversion through an external command.
//!
//! kindlegen-style tools write their result next to the input under the name
//! given with `-o`, exit with 1 when they only emitted warnings, and print a
//! failure line (while sometimes still exiting 0) when nothing was produced.

use std::path::Path;

use tracing::{instrument, warn};

use quillbook_shared::{DeviceToolConfig, QuillbookError, Result};

use crate::DeviceConverter;
use crate::command::{run_tool, tail};

/// Decide whether a device tool run succeeded.
///
/// The failure marker wins over the exit code. Otherwise the exit code must be
/// one of `accepted_exit_codes`; a run killed by a signal (`None`) fails.
pub fn check_device_output(
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
    tool: &DeviceToolConfig,
) -> Result<()> {
    if !tool.failure_marker.is_empty()
        && (stdout.contains(&tool.failure_marker) || stderr.contains(&tool.failure_marker))
    {
        return Err(QuillbookError::Conversion(format!(
            "`{}` could not generate the output:\n{}",
            tool.program,
            tail(stdout, 5)
        )));
    }

    match code {
        Some(code) if tool.accepted_exit_codes.contains(&code) => Ok(()),
        Some(code) => Err(QuillbookError::Conversion(format!(
            "`{}` exited with status {code}: {}",
            tool.program,
            tail(stderr, 5)
        ))),
        None => Err(QuillbookError::Conversion(format!(
            "`{}` was terminated by a signal",
            tool.program
        ))),
    }
}

/// Runs the configured device tool (kindlegen by default).
///
/// Arguments may reference `{input}`, `{output}` and `{output_name}` (the
/// file name of `{output}`). Whatever the tool writes next to the input is
/// moved to the requested output path.
#[derive(Debug, Clone, Default)]
pub struct CommandDeviceConverter {
    tool: DeviceToolConfig,
}

impl CommandDeviceConverter {
    pub fn new(tool: DeviceToolConfig) -> Self {
        Self { tool }
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let output_name = output
            .file_name()
            .ok_or_else(|| {
                QuillbookError::validation(format!(
                    "device output {} has no file name",
                    output.display()
                ))
            })?
            .to_os_string();

        if output.exists() {
            tokio::fs::remove_file(output)
                .await
                .map_err(|e| QuillbookError::io(output, e))?;
        }

        let vars = [
            ("input", input.display().to_string()),
            ("output", output.display().to_string()),
            ("output_name", output_name.to_string_lossy().into_owned()),
        ];
        let result = run_tool(&self.tool.program, &self.tool.args, &vars).await?;

        let stdout = String::from_utf8_lossy(&result.stdout);
        let stderr = String::from_utf8_lossy(&result.stderr);
        check_device_output(result.status.code(), &stdout, &stderr, &self.tool)?;

        if result.status.code() != Some(0) {
            warn!(status = ?result.status.code(), "device converter finished with warnings");
        }

        let produced = input.with_file_name(&output_name);
        if produced != output && produced.exists() {
            move_file(&produced, output).await?;
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

impl DeviceConverter for CommandDeviceConverter {
    #[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        self.run(input, output).await
    }
}

/// Rename, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| QuillbookError::io(parent, e))?;
    }
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| QuillbookError::io(to, e))?;
    tokio::fs::remove_file(from)
        .await
        .map_err(|e| QuillbookError::io(from, e))?;
    Ok(())
}
