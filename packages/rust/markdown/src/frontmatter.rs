//! YAML frontmatter splitting.
//!
//! A metadata block opens with a first line of `---` and closes with a line of
//! `---` or `...`. Everything after the closing line is the body.

use std::collections::BTreeMap;

use serde_yaml::Value;

use quillbook_shared::{QuillbookError, Result};

/// Parsed frontmatter fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    /// The `title` field, if present. Scalars are stringified.
    pub title: Option<String>,
    /// Every other top-level key.
    pub extra: BTreeMap<String, Value>,
}

/// Split a document into its frontmatter and body.
///
/// A document without an opening delimiter has empty frontmatter and the
/// whole text as body. An unterminated block is a parse error.
pub fn split_frontmatter(raw: &str) -> Result<(Frontmatter, &str)> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok((Frontmatter::default(), text));
    };
    if first.trim_end() != "---" {
        return Ok((Frontmatter::default(), text));
    }

    let mut offset = first.len();
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &text[first.len()..offset];
            let body = &text[offset + line.len()..];
            let frontmatter = parse_yaml(yaml)?;
            return Ok((
                frontmatter,
                body.trim_start_matches(|c| c == '\n' || c == '\r'),
            ));
        }
        offset += line.len();
    }

    Err(QuillbookError::parse(
        "frontmatter opened with `---` but never closed",
    ))
}

fn parse_yaml(yaml: &str) -> Result<Frontmatter> {
    if yaml.trim().is_empty() {
        return Ok(Frontmatter::default());
    }

    let mut extra: BTreeMap<String, Value> = serde_yaml::from_str(yaml)
        .map_err(|e| QuillbookError::parse(format!("invalid frontmatter: {e}")))?;

    let title = extra.remove("title").and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    });

    Ok(Frontmatter { title, extra })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_title_and_body() {
        let raw = "---\ntitle: Intro\ndate: 2024-01-01\n---\n\nHello\n";
        let (fm, body) = split_frontmatter(raw).unwrap();
        assert_eq!(fm.title.as_deref(), Some("Intro"));
        assert!(fm.extra.contains_key("date"));
        assert_eq!(body, "Hello\n");
    }

    #[test]
    fn accepts_dot_terminator_and_crlf() {
        let raw = "---\r\ntitle: \"Quoted: colon\"\r\n...\r\nBody";
        let (fm, body) = split_frontmatter(raw).unwrap();
        assert_eq!(fm.title.as_deref(), Some("Quoted: colon"));
        assert_eq!(body, "Body");
    }

    #[test]
    fn numeric_title_is_stringified() {
        let (fm, _) = split_frontmatter("---\ntitle: 1984\n---\nx").unwrap();
        assert_eq!(fm.title.as_deref(), Some("1984"));
    }

    #[test]
    fn no_frontmatter_returns_whole_text() {
        let raw = "# Already a heading\n\ntext";
        let (fm, body) = split_frontmatter(raw).unwrap();
        assert_eq!(fm, Frontmatter::default());
        assert_eq!(body, raw);
    }

    #[test]
    fn empty_block_has_no_title() {
        let (fm, body) = split_frontmatter("---\n---\nBody").unwrap();
        assert!(fm.title.is_none());
        assert_eq!(body, "Body");
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let err = split_frontmatter("---\ntitle: Oops\n\nno closing line").unwrap_err();
        assert!(err.to_string().contains("never closed"));
    }

    #[test]
    fn thematic_break_later_in_body_is_kept() {
        let raw = "---\ntitle: T\n---\nabove\n\n---\n\nbelow";
        let (_, body) = split_frontmatter(raw).unwrap();
        assert_eq!(body, "above\n\n---\n\nbelow");
    }
}
