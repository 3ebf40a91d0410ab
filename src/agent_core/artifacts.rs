//! Best-effort extraction of structured artifacts from final answer text.
//!
//! This is a bounded post-processing pass over the answer only, never a
//! routing mechanism. It is documented as lossy: malformed markup is
//! skipped, not repaired.

use super::term_cache::is_canonical_id;
use super::types::{TermReference, ThumbnailRecord};

/// File extensions treated as image media.
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp"];

/// Extract `[label](ID)` entity references whose target is a canonical ID.
///
/// Duplicate ids collapse to the first occurrence.
pub fn extract_references(text: &str) -> Vec<TermReference> {
    let mut refs: Vec<TermReference> = Vec::new();
    for (label, target) in scan_markdown_links(text) {
        if !is_canonical_id(&target) {
            continue;
        }
        if refs.iter().any(|r| r.id == target) {
            continue;
        }
        refs.push(TermReference { label, id: target });
    }
    refs
}

/// Extract image references: markdown images `![alt](url)` plus bare URLs
/// with an image extension. The alt text (or the URL's file stem when alt
/// is empty) becomes the display label.
pub fn extract_thumbnails(text: &str) -> Vec<ThumbnailRecord> {
    let mut thumbs: Vec<ThumbnailRecord> = Vec::new();

    for (alt, url) in scan_markdown_images(text) {
        if !is_image_url(&url) {
            continue;
        }
        push_thumbnail(&mut thumbs, url, alt);
    }

    for url in scan_bare_urls(text) {
        if !is_image_url(&url) {
            continue;
        }
        push_thumbnail(&mut thumbs, url, String::new());
    }

    thumbs
}

fn push_thumbnail(thumbs: &mut Vec<ThumbnailRecord>, url: String, alt: String) {
    if thumbs.iter().any(|t| t.thumbnail == url) {
        return;
    }
    let label = if alt.is_empty() { file_stem(&url) } else { alt };
    thumbs.push(ThumbnailRecord { thumbnail: url, label });
}

pub(crate) fn is_image_url(url: &str) -> bool {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return false;
    }
    // Extension check ignores any query string.
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn file_stem(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name).to_string()
}

// ─── Markup scanning ────────────────────────────────────────────────────────

/// `[label](target)` pairs, skipping image syntax.
fn scan_markdown_links(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'[' || (i > 0 && bytes[i - 1] == b'!') {
            i += 1;
            continue;
        }
        match scan_span(text, i) {
            Some((label, target, end)) => {
                out.push((label, target));
                i = end;
            }
            None => i += 1,
        }
    }
    out
}

/// `![alt](url)` pairs.
fn scan_markdown_images(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] != b'!' || bytes[i + 1] != b'[' {
            i += 1;
            continue;
        }
        match scan_span(text, i + 1) {
            Some((alt, url, end)) => {
                out.push((alt, url));
                i = end;
            }
            None => i += 2,
        }
    }
    out
}

/// Parse `[..](..)` starting at the `[` byte offset. Returns
/// (bracket text, paren text, offset past the closing paren).
fn scan_span(text: &str, open: usize) -> Option<(String, String, usize)> {
    let close = text[open..].find(']')? + open;
    if text.as_bytes().get(close + 1) != Some(&b'(') {
        return None;
    }
    let paren = text[close + 1..].find(')')? + close + 1;
    Some((
        text[open + 1..close].to_string(),
        text[close + 2..paren].trim().to_string(),
        paren + 1,
    ))
}

/// Bare http(s) URLs outside markdown parentheses.
fn scan_bare_urls(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for token in text.split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>')) {
        let token = token.trim_end_matches(['.', ',', ';', '!', '?']);
        if token.starts_with("http://") || token.starts_with("https://") {
            out.push(token.to_string());
        }
    }
    out
}

// ─── Tests ───────────────────────────────────────────────────────────────────
