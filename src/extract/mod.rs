//! Metadata extraction for discovered documents.
//!
//! Every field resolves through an independent, ordered fallback chain that
//! stops at the first source with a value. Frontmatter is always the highest
//! priority; below that the chains differ per field.

pub mod frontmatter;

pub use frontmatter::Frontmatter;

use std::sync::LazyLock;

use regex::Regex;

use crate::patterns::MatchOutcome;

/// Maximum extracted description length.
const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Title used when every resolver in the chain comes up empty.
pub const PLACEHOLDER_TITLE: &str = "Untitled";

/// Noise prefixes stripped from level-1 headings, case-insensitively.
static HEADING_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(task|prp|todo|wip):\s*").unwrap());

/// Field values resolved for one document.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub title: String,
    pub description: Option<String>,
    /// Workflow status as declared; the vocabulary is opaque to discovery.
    pub status: Option<String>,
    pub priority: Option<i64>,
    pub dependencies: Vec<String>,
}

/// Resolves metadata for one file, returning warnings for anything
/// recoverable (unterminated frontmatter, missing title).
pub fn extract_metadata(
    content: &str,
    filename: &str,
    pattern_match: Option<&MatchOutcome>,
) -> (Metadata, Vec<String>) {
    let mut warnings = Vec::new();

    // A frontmatter parse failure is localized: record it and fall back to
    // treating the whole file as body.
    let fm = match frontmatter::parse(content, filename) {
        Ok(fm) => fm.unwrap_or_default(),
        Err(err) => {
            warnings.push(err.to_string());
            Frontmatter::default()
        }
    };
    let body = frontmatter::body(content);

    // Each entry is one source in the title chain, tried in order.
    let title_resolvers: [&dyn Fn() -> Option<String>; 3] = [
        &|| fm.title.clone().filter(|t| !t.is_empty()),
        &|| title_from_filename(filename, pattern_match),
        &|| title_from_heading(body),
    ];
    let title = title_resolvers.iter().find_map(|resolve| resolve());
    let title = match title {
        Some(t) => t,
        None => {
            warnings.push(format!(
                "no title found for {filename}; using placeholder. \
                 Add a title to frontmatter, the filename, or an H1 heading."
            ));
            PLACEHOLDER_TITLE.to_string()
        }
    };

    let description_resolvers: [&dyn Fn() -> Option<String>; 2] = [
        &|| fm.description.clone().filter(|d| !d.is_empty()),
        &|| description_from_body(body),
    ];
    let description = description_resolvers.iter().find_map(|resolve| resolve());

    // Remaining scalars come from frontmatter only; absence is fine.
    let metadata = Metadata {
        title,
        description,
        status: fm.status,
        priority: fm.priority,
        dependencies: fm.dependencies,
    };

    (metadata, warnings)
}

/// Derives a title from the descriptive portion of the filename, using the
/// match's capture groups to strip the key or number prefix.
///
/// `"T-E04-F02-001-implement-caching.md"` -> `"Implement Caching"`.
fn title_from_filename(filename: &str, pattern_match: Option<&MatchOutcome>) -> Option<String> {
    let outcome = pattern_match?;
    let slug = outcome.captures.get("slug")?;
    if slug.is_empty() {
        return None;
    }
    Some(title_case(slug))
}

/// Extracts the first level-1 heading from the body, with noise prefixes
/// such as `Task:` stripped.
fn title_from_heading(body: &str) -> Option<String> {
    for line in body.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("# ") {
            let title = HEADING_NOISE.replace(heading.trim(), "").trim().to_string();
            if title.is_empty() {
                return None;
            }
            return Some(title);
        }
    }
    None
}

/// Extracts the first paragraph following the first heading, capped at 500
/// characters, terminated at a blank line or the next heading.
fn description_from_body(body: &str) -> Option<String> {
    let mut past_heading = false;
    let mut paragraph = String::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("# ") && !past_heading {
            past_heading = true;
            continue;
        }

        if !past_heading {
            continue;
        }

        if trimmed.is_empty() {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }

        if trimmed.starts_with('#') {
            break;
        }

        if !paragraph.is_empty() {
            paragraph.push('\n');
        }
        paragraph.push_str(trimmed);

        if paragraph.len() >= MAX_DESCRIPTION_LENGTH {
            break;
        }
    }

    if paragraph.is_empty() {
        return None;
    }
    if paragraph.len() > MAX_DESCRIPTION_LENGTH {
        paragraph = truncate_at_boundary(&paragraph, MAX_DESCRIPTION_LENGTH);
    }
    Some(paragraph)
}

/// Converts a hyphen-separated slug to spaced Title Case.
fn title_case(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_at_boundary(s: &str, max: usize) -> String {
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
