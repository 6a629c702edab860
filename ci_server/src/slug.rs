//! URL-safe names derived from human-readable aliases.

use std::sync::LazyLock;

use regex::Regex;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

const SUFFIX_LEN: usize = 6;

/// Transliterate `text` to ASCII, lower-case it and collapse every run of
/// other characters into `-`.
///
/// With `random`, a short random suffix is appended so repeated calls on the
/// same input give distinct names. `max_len` bounds the whole result,
/// suffix included.
pub fn slugify(text: &str, random: bool, max_len: Option<usize>) -> String {
    let lower = deunicode::deunicode(text).to_lowercase();
    let mut slug = NON_ALPHANUMERIC
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string();

    let suffix = if random {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Some(id[..SUFFIX_LEN].to_string())
    } else {
        None
    };

    if let Some(max) = max_len {
        let reserved = suffix.as_ref().map_or(0, |s| s.len() + 1);
        // slug is ASCII, so byte truncation is safe
        slug.truncate(max.saturating_sub(reserved));
        let trimmed = slug.trim_end_matches('-').len();
        slug.truncate(trimmed);
    }

    match suffix {
        Some(suffix) if slug.is_empty() => suffix,
        Some(suffix) => format!("{slug}-{suffix}"),
        None => slug,
    }
}
