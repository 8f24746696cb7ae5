//! Filenames and titles derived from article titles.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Words of the title that go into the slug
pub const SLUG_WORDS: usize = 6;

/// Upper bound on the slug part of the filename
pub const SLUG_MAX_LEN: usize = 40;

/// Remove HTML tags and collapse whitespace
pub fn strip_html(text: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let re = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"));
    re.replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// URL-safe slug from the first `max_words` words of `title`.
///
/// Lower-cased; every run of non-ASCII-alphanumeric characters becomes a single
/// `-`; cut to `max_len` without a trailing separator. Falls back to `image`.
pub fn slugify(title: &str, max_words: usize, max_len: usize) -> String {
    let words: Vec<String> = strip_html(title)
        .split_whitespace()
        .take(max_words)
        .map(str::to_lowercase)
        .collect();

    let mut slug = String::with_capacity(max_len);
    let mut pending_sep = false;
    for c in words.join(" ").chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }

    if slug.len() > max_len {
        slug.truncate(max_len);
    }
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        "image".to_string()
    } else {
        slug.to_string()
    }
}

/// File extension for an image MIME type
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Deterministic upload filename: `<slug>-<hash6>.<ext>`.
///
/// The short hash of the full title keeps titles that share a prefix apart.
pub fn image_filename(title: &str, mime_type: &str) -> String {
    let digest = Sha256::digest(title.as_bytes());
    let hash: String = digest.iter().take(3).map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}.{}",
        slugify(title, SLUG_WORDS, SLUG_MAX_LEN),
        hash,
        extension_for_mime(mime_type)
    )
}

/// Readable media title: tags and punctuation removed, at most `max_chars`
/// characters with `...` when shortened. Keeps non-Latin scripts intact.
pub fn short_title(title: &str, max_chars: usize) -> String {
    let cleaned: String = strip_html(title)
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().count() <= max_chars {
        return cleaned;
    }
    let keep = max_chars.saturating_sub(3);
    let mut short: String = cleaned.chars().take(keep).collect();
    short.truncate(short.trim_end().len());
    short.push_str("...");
    short
}

/// Guess the MIME type from magic bytes
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.starts_with(b"GIF8") {
        Some("image/gif")
    } else {
        None
    }
}
