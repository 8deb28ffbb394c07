//! Parser for the two custom HTML block shapes found in articles.
//!
//! - aside: `<aside><img src="…">Some text</aside>` becomes a blockquote
//!   whose first line is the image.
//! - checkbox container: `<checkbox-container><input type="checkbox"> Do it
//!   </checkbox-container>` becomes a single list item.
//!
//! Element names come from [`MarkupConfig`]. Fragments are parsed with
//! html5ever (via `scraper`), so attribute quoting, entities and nesting are
//! handled by a real HTML parser instead of pattern matching. A fragment with
//! anything besides whitespace or comments around the custom element is left
//! alone. Extracted text is entity-decoded, so it is escaped again before it
//! becomes Markdown.

use scraper::{ElementRef, Html, Node};

use quillbook_shared::MarkupConfig;

/// Elements whose boundaries become line breaks in extracted text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote",
    "section", "figure", "figcaption", "tr", "hr",
];

/// Classification of a raw HTML block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomBlock {
    /// An aside element: optional first image source plus its text content.
    Aside { image: Option<String>, text: String },
    /// A checkbox container: its text content.
    Checkbox { text: String },
    /// Anything else, including malformed custom blocks. Passed through untouched.
    Unmatched,
}

/// Whether `html` (leading whitespace ignored) starts with an opening `<tag`.
pub fn opens_tag(html: &str, tag: &str) -> bool {
    let Some(rest) = html.trim_start().strip_prefix('<') else {
        return false;
    };
    match rest.get(..tag.len()) {
        Some(name) if name.eq_ignore_ascii_case(tag) => {}
        _ => return false,
    }
    match rest[tag.len()..].chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || c == '>' || c == '/',
    }
}

/// Whether `html` opens either configured custom element.
pub fn opens_custom_block(html: &str, markup: &MarkupConfig) -> bool {
    opens_tag(html, &markup.aside_tag) || opens_tag(html, &markup.checkbox_tag)
}

/// Classify and parse a raw HTML block.
pub fn parse_custom_block(raw: &str, markup: &MarkupConfig) -> CustomBlock {
    if opens_tag(raw, &markup.aside_tag) {
        let fragment = Html::parse_fragment(raw);
        let Some(aside) = find_standalone_element(&fragment, &markup.aside_tag) else {
            return CustomBlock::Unmatched;
        };
        let image = aside
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "img")
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);
        let mut text = String::new();
        collect_text(aside, &mut text);
        return CustomBlock::Aside { image, text };
    }

    if opens_tag(raw, &markup.checkbox_tag) {
        let fragment = Html::parse_fragment(raw);
        let Some(container) = find_standalone_element(&fragment, &markup.checkbox_tag) else {
            return CustomBlock::Unmatched;
        };
        let mut text = String::new();
        collect_text(container, &mut text);
        return CustomBlock::Checkbox { text };
    }

    CustomBlock::Unmatched
}

/// Render a parsed block as Markdown. `None` for [`CustomBlock::Unmatched`].
pub fn render_custom_block(block: &CustomBlock, markup: &MarkupConfig) -> Option<String> {
    match block {
        CustomBlock::Aside { image, text } => Some(render_aside(image.as_deref(), text, markup)),
        CustomBlock::Checkbox { text } => Some(render_checkbox(text)),
        CustomBlock::Unmatched => None,
    }
}

/// Render an aside as a blockquote: image line first, then the text lines.
fn render_aside(image: Option<&str>, text: &str, markup: &MarkupConfig) -> String {
    let mut lines: Vec<String> = Vec::new();
    if let Some(src) = image {
        let src = rewrite_relative_prefix(src, markup);
        lines.push(format!("![]({})", link_destination(&src)));
    }
    lines.extend(
        tidy_lines(text)
            .iter()
            .map(|line| escape_markdown(&rewrite_relative_prefix(line, markup))),
    );

    let mut quote = String::new();
    for line in lines {
        if line.is_empty() {
            quote.push_str(">\n");
        } else {
            quote.push_str("> ");
            quote.push_str(&line);
            quote.push('\n');
        }
    }
    quote
}

/// Render a checkbox container as one list item on one line.
fn render_checkbox(text: &str) -> String {
    let item = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if item.is_empty() {
        "-\n".to_string()
    } else {
        format!("- {}\n", escape_markdown(&item))
    }
}

/// The top-level `tag` element, provided nothing but whitespace and comments
/// sits beside it.
fn find_standalone_element<'a>(fragment: &'a Html, tag: &str) -> Option<ElementRef<'a>> {
    let mut found = None;
    for child in fragment.root_element().children() {
        match child.value() {
            Node::Element(el) if found.is_none() && el.name().eq_ignore_ascii_case(tag) => {
                found = ElementRef::wrap(child);
            }
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Comment(_) => {}
            _ => return None,
        }
    }
    found
}

/// Concatenate text nodes, turning block element boundaries into newlines.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_ELEMENTS.contains(&element.name());
                if block {
                    out.push('\n');
                }
                collect_text(child_el, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Trim every line, drop leading/trailing blank lines, collapse blank runs.
fn tidy_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|l: &String| l.is_empty()) {
            continue;
        }
        lines.push(line.to_string());
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn rewrite_relative_prefix(line: &str, markup: &MarkupConfig) -> String {
    if markup.relative_asset_prefix.is_empty() {
        return line.to_string();
    }
    line.replace(&markup.relative_asset_prefix, &markup.asset_prefix_replacement)
}

/// Backslash-escape characters that would otherwise turn plain text into
/// Markdown or HTML.
pub(crate) fn escape_markdown(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 8);
    let mut chars = line.chars().peekable();
    let mut at_start = true;
    let mut leading_digits = false;

    while let Some(c) = chars.next() {
        let escape = match c {
            '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '>' | '~' => true,
            '&' => chars.peek().is_some_and(|n| n.is_ascii_alphanumeric() || *n == '#'),
            '#' | '-' | '+' | '=' => at_start,
            '.' | ')' => leading_digits,
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(c);
        leading_digits = c.is_ascii_digit() && (at_start || leading_digits);
        at_start = false;
    }
    out
}

/// Wrap a link destination in `<…>` when it contains whitespace or parens.
pub(crate) fn link_destination(src: &str) -> String {
    if src.contains(|c: char| c.is_whitespace() || c == '(' || c == ')') {
        format!("<{src}>")
    } else {
        src.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markup() -> MarkupConfig {
        MarkupConfig::default()
    }

    #[test]
    fn opens_tag_requires_delimiter() {
        assert!(opens_tag("<aside>", "aside"));
        assert!(opens_tag("  <aside class=\"tip\">", "aside"));
        assert!(opens_tag("<ASIDE>", "aside"));
        assert!(!opens_tag("<asides>", "aside"));
        assert!(!opens_tag("<div><aside>", "aside"));
        assert!(!opens_tag("aside", "aside"));
    }

    #[test]
    fn parses_aside_with_image() {
        let raw = r#"<aside>
  <img src="../assets/diagram.png" alt="Diagram">
  <p>Remember to check the diagram.</p>
</aside>
"#;
        let block = parse_custom_block(raw, &markup());
        let CustomBlock::Aside { image, .. } = &block else {
            panic!("expected aside, got {block:?}");
        };
        assert_eq!(image.as_deref(), Some("../assets/diagram.png"));

        let md = render_custom_block(&block, &markup()).unwrap();
        assert!(md.starts_with("> ![](assets/diagram.png)\n"));
        assert!(md.contains("> Remember to check the diagram."));
        assert!(!md.contains('<'));
        for line in md.lines().filter(|l| !l.is_empty()) {
            assert!(line.starts_with('>'), "line not quoted: {line:?}");
        }
    }

    #[test]
    fn aside_only_uses_first_image() {
        let raw = r#"<aside><img src="a.png"><img src="b.png">Text</aside>"#;
        match parse_custom_block(raw, &markup()) {
            CustomBlock::Aside { image, text } => {
                assert_eq!(image.as_deref(), Some("a.png"));
                assert_eq!(text, "Text");
            }
            other => panic!("expected aside, got {other:?}"),
        }
    }

    #[test]
    fn aside_without_image_is_text_only_quote() {
        let raw = "<aside>\n<p>First</p>\n<p>Second <em>line</em></p>\n</aside>";
        let block = parse_custom_block(raw, &markup());
        let md = render_custom_block(&block, &markup()).unwrap();
        assert_eq!(md, "> First\n>\n> Second line\n");
    }

    #[test]
    fn aside_decodes_entities() {
        let raw = "<aside>Fish &amp; chips</aside>";
        let md = render_custom_block(&parse_custom_block(raw, &markup()), &markup()).unwrap();
        assert_eq!(md, "> Fish & chips\n");
    }

    #[test]
    fn decoded_markup_is_escaped() {
        let raw = "<aside>Use the &lt;br&gt; tag, not *stars*</aside>";
        let md = render_custom_block(&parse_custom_block(raw, &markup()), &markup()).unwrap();
        assert_eq!(md, "> Use the \\<br\\> tag, not \\*stars\\*\n");
    }

    #[test]
    fn escape_covers_line_start_markers() {
        assert_eq!(escape_markdown("# not a heading"), "\\# not a heading");
        assert_eq!(escape_markdown("- not a list"), "\\- not a list");
        assert_eq!(escape_markdown("12. not a list"), "12\\. not a list");
        assert_eq!(escape_markdown("a-b 3.5 x#y"), "a-b 3.5 x#y");
        assert_eq!(escape_markdown("&amp; &#38; & done"), "\\&amp; \\&#38; & done");
    }

    #[test]
    fn content_beside_custom_element_is_unmatched() {
        let raw = "<checkbox-container><input type=\"checkbox\"> Do it</checkbox-container> \
                   and **more** text";
        assert_eq!(parse_custom_block(raw, &markup()), CustomBlock::Unmatched);

        let raw = "<aside>Tip</aside>\n<div>other</div>\n";
        assert_eq!(parse_custom_block(raw, &markup()), CustomBlock::Unmatched);

        let raw = "<aside>Tip</aside>\n<!-- note -->\n";
        assert!(matches!(parse_custom_block(raw, &markup()), CustomBlock::Aside { .. }));
    }

    #[test]
    fn image_with_spaces_is_wrapped() {
        let raw = r#"<aside><img src="../assets/my pic.png"></aside>"#;
        let md = render_custom_block(&parse_custom_block(raw, &markup()), &markup()).unwrap();
        assert_eq!(md, "> ![](<assets/my pic.png>)\n");
    }

    #[test]
    fn parses_checkbox_container() {
        let raw = "<checkbox-container>\n  <input type=\"checkbox\" checked>\n  \
                   <label>Back up\n  the database</label>\n</checkbox-container>";
        let block = parse_custom_block(raw, &markup());
        assert!(matches!(block, CustomBlock::Checkbox { .. }));
        let md = render_custom_block(&block, &markup()).unwrap();
        assert_eq!(md, "- Back up the database\n");
    }

    #[test]
    fn custom_tag_names_are_configurable() {
        let mut markup = markup();
        markup.aside_tag = "note-box".into();
        let raw = "<note-box>Heads up</note-box>";
        assert!(matches!(
            parse_custom_block(raw, &markup),
            CustomBlock::Aside { .. }
        ));
        assert_eq!(parse_custom_block("<aside>x</aside>", &markup), CustomBlock::Unmatched);
    }

    #[test]
    fn other_html_is_unmatched() {
        assert_eq!(
            parse_custom_block("<div class=\"note\">x</div>", &markup()),
            CustomBlock::Unmatched
        );
        assert_eq!(
            parse_custom_block("<!-- comment -->", &markup()),
            CustomBlock::Unmatched
        );
        assert!(render_custom_block(&CustomBlock::Unmatched, &markup()).is_none());
    }

    #[test]
    fn empty_checkbox_still_renders_one_item() {
        let md = render_custom_block(
            &parse_custom_block("<checkbox-container></checkbox-container>", &markup()),
            &markup(),
        )
        .unwrap();
        assert_eq!(md, "-\n");
    }
}
