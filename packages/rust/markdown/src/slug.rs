//! Deterministic cache file names for remote images.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Extension given to every cached asset, whatever the remote format.
pub const ASSET_EXTENSION: &str = "jpg";

/// Generate a filesystem/URL-safe slug.
///
/// Lowercases ASCII, keeps `[a-z0-9]`, turns every other run of characters
/// (including `.`) into a single `-`, and trims leading/trailing hyphens.
pub fn slugify(text: &str) -> String {
    static NON_SLUG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    NON_SLUG_RE
        .replace_all(&text.to_ascii_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Cache file name for a remote image URL: `<slug(basename)>.jpg`.
///
/// The basename is the last non-empty path segment (query and fragment are
/// ignored), falling back to the host. Distinct URLs sharing a basename map to
/// the same file.
pub fn asset_file_name(remote: &str) -> String {
    let basename = match Url::parse(remote) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .or_else(|| url.host_str().map(str::to_string))
            .unwrap_or_default(),
        Err(_) => remote
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').find(|s| !s.is_empty()))
            .unwrap_or_default()
            .to_string(),
    };

    let slug = slugify(&basename);
    let slug = if slug.is_empty() { "image".to_string() } else { slug };
    format!("{slug}.{ASSET_EXTENSION}")
}
