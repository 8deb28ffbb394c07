//! Markdown transformation pipeline.
//!
//! Parses an article with `pulldown-cmark` and rewrites only the source ranges
//! that need to change; everything else is copied through byte for byte. The
//! rewrites are:
//!
//! 1. custom HTML blocks → blockquote / list item ([`custom_block`])
//! 2. image normalization (alt text cleared, absolute asset prefix made relative)
//! 3. remote image materialization (URL rewritten into the asset cache,
//!    [`FetchTask`] emitted for files not cached yet)
//!
//! Markdown generated by step 1 goes through the same pass again, so images it
//! introduces get steps 2 and 3.

pub mod custom_block;
pub mod frontmatter;
pub mod slug;

use std::ops::Range;
use std::path::{Path, PathBuf};

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd};
use tracing::{debug, instrument, warn};

use quillbook_shared::{AppConfig, FetchTask, MarkupConfig, Result, expand_tilde};

pub use custom_block::{CustomBlock, parse_custom_block, render_custom_block};
pub use frontmatter::{Frontmatter, split_frontmatter};
pub use slug::{asset_file_name, slugify};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Options for [`transform`].
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Custom markup names and asset prefixes.
    pub markup: MarkupConfig,
    /// Asset cache directory. Rewritten image URLs point into it.
    pub cache_dir: PathBuf,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for TransformOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            markup: config.markup.clone(),
            cache_dir: expand_tilde(&config.build.cache_dir),
        }
    }
}

/// Result of transforming one document.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// The rewritten Markdown.
    pub markdown: String,
    /// Remote images this document needs that are not cached yet.
    pub fetches: Vec<FetchTask>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run every pass over one document.
#[instrument(skip_all, fields(len = markdown.len()))]
pub fn transform(markdown: &str, opts: &TransformOptions) -> Result<TransformOutput> {
    let mut fetches = Vec::new();
    let rewritten = rewrite_source(markdown, opts, &mut fetches);
    let markdown = ensure_trailing_newline(&rewritten);

    debug!(
        final_len = markdown.len(),
        pending_fetches = fetches.len(),
        "transform complete"
    );

    Ok(TransformOutput { markdown, fetches })
}

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Replace `range` of the source with `text`.
#[derive(Debug)]
struct Splice {
    range: Range<usize>,
    text: String,
}

/// Collect the edits for one source text and apply them.
///
/// Candidates for custom blocks are HTML blocks, and paragraphs whose first
/// inline is the opening custom tag (a one-line
/// `<checkbox-container>…</checkbox-container>` is not an HTML block in
/// CommonMark). Blocks the custom-block parser rejects stay as they are and
/// their inline images are still rewritten.
fn rewrite_source(source: &str, opts: &TransformOptions, fetches: &mut Vec<FetchTask>) -> String {
    let markup = &opts.markup;
    let mut splices: Vec<Splice> = Vec::new();
    let mut image_depth = 0usize;
    let mut iter = Parser::new_ext(source, parser_options())
        .into_offset_iter()
        .peekable();

    while let Some((event, range)) = iter.next() {
        let closing = match &event {
            Event::Start(Tag::HtmlBlock) => Some(TagEnd::HtmlBlock),
            Event::Start(Tag::Paragraph)
                if matches!(
                    iter.peek(),
                    Some((Event::InlineHtml(html), _))
                        if custom_block::opens_custom_block(html, markup)
                ) =>
            {
                Some(TagEnd::Paragraph)
            }
            _ => None,
        };

        if let Some(closing) = closing {
            let raw = &source[range.clone()];
            let block = parse_custom_block(raw, markup);
            match render_custom_block(&block, markup) {
                Some(replacement) => {
                    debug!(kind = block_kind(&block), "rewrote custom block");
                    for (inner, _) in iter.by_ref() {
                        if matches!(&inner, Event::End(end) if *end == closing) {
                            break;
                        }
                    }
                    let text = rewrite_source(&replacement, opts, fetches);
                    let text = fit_to_context(source, &range, &text);
                    splices.push(Splice { range, text });
                }
                None => {
                    if custom_block::opens_custom_block(raw, markup) {
                        warn!(
                            snippet = %raw.chars().take(60).collect::<String>(),
                            "malformed custom block left unchanged"
                        );
                    }
                }
            }
            continue;
        }

        match event {
            Event::Start(Tag::Image {
                dest_url, title, ..
            }) => {
                image_depth += 1;
                // images nested in another image's alt text vanish with it
                if image_depth == 1 {
                    let text = render_image(dest_url, &title, opts, fetches);
                    splices.push(Splice { range, text });
                }
            }
            Event::End(TagEnd::Image) => {
                image_depth = image_depth.saturating_sub(1);
            }
            _ => {}
        }
    }

    apply_splices(source, &splices)
}

fn block_kind(block: &CustomBlock) -> &'static str {
    match block {
        CustomBlock::Aside { .. } => "aside",
        CustomBlock::Checkbox { .. } => "checkbox",
        CustomBlock::Unmatched => "unmatched",
    }
}

/// Adapt a block replacement to where it lands in the source.
///
/// Continuation lines repeat the container prefix of the first line (list
/// indentation becomes spaces, quote markers are kept), and the trailing
/// newline follows the replaced range.
fn fit_to_context(source: &str, range: &Range<usize>, text: &str) -> String {
    let line_start = source[..range.start].rfind('\n').map_or(0, |i| i + 1);
    let prefix: String = source[line_start..range.start]
        .chars()
        .map(|c| if c == '>' { '>' } else { ' ' })
        .collect();

    let mut fitted = String::with_capacity(text.len());
    for (i, line) in text.trim_end_matches('\n').split('\n').enumerate() {
        if i > 0 {
            fitted.push('\n');
            fitted.push_str(&prefix);
        }
        fitted.push_str(line);
    }
    if source[range.clone()].ends_with('\n') {
        fitted.push('\n');
    }
    fitted
}

/// Apply non-overlapping splices, given in source order.
fn apply_splices(source: &str, splices: &[Splice]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for splice in splices {
        out.push_str(&source[cursor..splice.range.start]);
        out.push_str(&splice.text);
        cursor = splice.range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Render one image as inline Markdown with no alt text.
///
/// The absolute asset prefix is made relative; a remote URL is pointed at the
/// cache and registered for download unless the file is already there.
fn render_image(
    dest_url: CowStr<'_>,
    title: &str,
    opts: &TransformOptions,
    fetches: &mut Vec<FetchTask>,
) -> String {
    let mut url = rewrite_absolute_prefix(&dest_url, &opts.markup);

    if is_remote(&url) {
        let file_name = asset_file_name(&url);
        let dest = opts.cache_dir.join(&file_name);

        if dest.exists() {
            debug!(%url, path = %dest.display(), "image already cached");
        } else if !fetches.iter().any(|t| t.dest == dest) {
            fetches.push(FetchTask {
                url: url.clone(),
                dest,
            });
        }
        url = cache_url(&opts.cache_dir, &file_name);
    }

    let destination = custom_block::link_destination(&url);
    if title.is_empty() {
        format!("![]({destination})")
    } else {
        let title = title.replace('\\', "\\\\").replace('"', "\\\"");
        format!("![]({destination} \"{title}\")")
    }
}

fn rewrite_absolute_prefix(url: &str, markup: &MarkupConfig) -> String {
    if markup.absolute_asset_prefix.is_empty() {
        return url.to_string();
    }
    match url.strip_prefix(markup.absolute_asset_prefix.as_str()) {
        Some(rest) => format!("{}{rest}", markup.asset_prefix_replacement),
        None => url.to_string(),
    }
}

/// Whether a URL uses a network scheme.
pub fn is_remote(url: &str) -> bool {
    let head = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    head.starts_with("http://") || head.starts_with("https://")
}

/// The URL written into the document for a cached file.
fn cache_url(cache_dir: &Path, file_name: &str) -> String {
    let prefix = cache_dir.to_string_lossy().replace('\\', "/");
    format!("{}/{file_name}", prefix.trim_end_matches('/'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
