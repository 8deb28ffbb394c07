//! External tool invocation shared by both converters.

use std::io::ErrorKind;
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, info};

use quillbook_shared::{QuillbookError, Result};

/// Replace every `{name}` placeholder in `arg` with its value.
pub(crate) fn substitute(arg: &str, vars: &[(&str, String)]) -> String {
    let mut result = arg.to_string();
    for (name, value) in vars {
        result = result.replace(&format!("{{{name}}}"), value);
    }
    result
}

/// Run `program` with placeholder-substituted `args` and capture its output.
pub(crate) async fn run_tool(
    program: &str,
    args: &[String],
    vars: &[(&str, String)],
) -> Result<Output> {
    let args: Vec<String> = args.iter().map(|a| substitute(a, vars)).collect();
    info!(program, ?args, "running converter");

    let output = Command::new(program)
        .args(&args)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                QuillbookError::Conversion(format!(
                    "`{program}` not found. Is it installed and on PATH?"
                ))
            } else {
                QuillbookError::Conversion(format!("failed to run `{program}`: {e}"))
            }
        })?;

    debug!(
        program,
        status = ?output.status.code(),
        stdout = %String::from_utf8_lossy(&output.stdout),
        stderr = %String::from_utf8_lossy(&output.stderr),
        "converter finished"
    );

    Ok(output)
}

/// Last few non-empty lines of tool output, for error messages.
pub(crate) fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_replaces_all_placeholders() {
        let vars = [("input", "a.epub".to_string()), ("output", "b.mobi".to_string())];
        assert_eq!(substitute("{input}", &vars), "a.epub");
        assert_eq!(substitute("--in={input},out={output}", &vars), "--in=a.epub,out=b.mobi");
        assert_eq!(substitute("-c1", &vars), "-c1");
        assert_eq!(substitute("{unknown}", &vars), "{unknown}");
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\n\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("only", 5), "only");
        assert_eq!(tail("", 3), "");
    }

    #[tokio::test]
    async fn missing_program_gives_install_hint() {
        let err = run_tool("quillbook-no-such-tool", &[], &[]).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("quillbook-no-such-tool"));
        assert!(msg.contains("installed"));
    }
}
