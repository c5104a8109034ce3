//! URL-friendly slug generation from entity titles.
//!
//! Slugs produce human-readable filenames like `T-E04-F01-001-create-models.md`.
//! They are a readability aid only; lookups always go through the canonical key.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Maximum slug length, keeping generated filenames manageable.
const MAX_SLUG_LENGTH: usize = 100;

static NON_ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]+").unwrap());
static MULTIPLE_HYPHENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());

/// Creates a slug from a title.
///
/// Lowercases, strips diacritics via NFD decomposition (`é` -> `e`), maps
/// spaces, underscores, and periods to hyphens, drops everything outside
/// `[a-z0-9-]`, collapses repeated hyphens, trims, and truncates to 100
/// characters re-trimming a trailing partial hyphen.
///
/// Titles with no valid characters yield an empty slug; callers must then
/// fall back to the bare key.
pub fn generate(title: &str) -> String {
    if title.is_empty() {
        return String::new();
    }

    // Decompose and drop combining marks so accented letters reduce to ASCII.
    let decomposed: String = title
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();

    let mut slug = decomposed.to_lowercase();
    slug = slug.replace([' ', '_', '.'], "-");
    slug = NON_ALPHANUMERIC.replace_all(&slug, "").into_owned();
    slug = MULTIPLE_HYPHENS.replace_all(&slug, "-").into_owned();
    slug = slug.trim_matches('-').to_string();

    if slug.len() > MAX_SLUG_LENGTH {
        slug.truncate(MAX_SLUG_LENGTH);
        slug = slug.trim_end_matches('-').to_string();
    }

    slug
}

/// Builds a task filename from key and title: `{key}-{slug}.md`, or
/// `{key}.md` when the title yields no usable slug.
pub fn filename(key: &str, title: &str) -> String {
    let slug = generate(title);
    if slug.is_empty() {
        format!("{key}.md")
    } else {
        format!("{key}-{slug}.md")
    }
}
