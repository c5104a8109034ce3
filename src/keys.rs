//! Canonical key validation and normalization.
//!
//! Keys have fixed shapes: epics are `E##`, features `E##-F##`, tasks
//! `T-E##-F##-###` with an optional readability slug appended. The slug is
//! never identity — canonical and slugged forms of the same key must resolve
//! to the same entity everywhere lookups occur.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static EPIC_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^E\d{2}$").unwrap());
static FEATURE_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^E\d{2}-F\d{2}$").unwrap());
static FEATURE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^F\d{2}$").unwrap());
static SHORT_TASK_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^E\d{2}-F\d{2}-\d{3}$").unwrap());

/// Converts a key to canonical uppercase form.
///
/// Idempotent for all valid keys: `e01` -> `E01`, `t-e04-f02-001` -> `T-E04-F02-001`.
pub fn normalize(key: &str) -> String {
    key.to_uppercase()
}

/// Validates the epic key shape (`E##`). Case insensitive.
pub fn is_epic_key(s: &str) -> bool {
    EPIC_KEY.is_match(&normalize(s))
}

/// Validates the feature key shape (`E##-F##`). Case insensitive.
pub fn is_feature_key(s: &str) -> bool {
    FEATURE_KEY.is_match(&normalize(s))
}

/// Validates a bare feature suffix (`F##`). Case insensitive.
pub fn is_feature_suffix(s: &str) -> bool {
    FEATURE_SUFFIX.is_match(&normalize(s))
}

/// Splits a feature key into its epic and feature parts.
///
/// `"e04-f01"` -> `("E04", "F01")`.
pub fn parse_feature_key(s: &str) -> Result<(String, String)> {
    let normalized = normalize(s);
    if !FEATURE_KEY.is_match(&normalized) {
        return Err(Error::Validation(format!(
            "invalid feature key format: {s:?}"
        )));
    }
    Ok((normalized[..3].to_string(), normalized[4..7].to_string()))
}

/// Validates the full task key shape (`T-E##-F##-###`), optionally followed
/// by `-slug`.
pub fn is_task_key(s: &str) -> bool {
    let normalized = normalize(s);
    let Some(rest) = normalized.strip_prefix("T-") else {
        return false;
    };
    if rest.len() < 11 || !rest.is_char_boundary(11) {
        return false;
    }
    let key_part = &rest[..11];
    if !SHORT_TASK_KEY.is_match(key_part) {
        return false;
    }
    // Anything beyond the number must be a slug separated by a hyphen.
    rest.len() == 11 || rest.as_bytes()[11] == b'-'
}

/// Validates the short task key shape (`E##-F##-###`), the form without the
/// `T-` prefix that users may type for brevity.
pub fn is_short_task_key(s: &str) -> bool {
    SHORT_TASK_KEY.is_match(&normalize(s))
}

/// Converts a task key to canonical form with the `T-` prefix.
///
/// Accepts full (`T-E##-F##-###`) and short (`E##-F##-###`) forms, any case,
/// with or without a trailing slug:
///
/// ```
/// # use waypoint::keys::normalize_task_key;
/// assert_eq!(normalize_task_key("e01-f02-001").unwrap(), "T-E01-F02-001");
/// assert_eq!(
///     normalize_task_key("e01-f02-001-task-name").unwrap(),
///     "T-E01-F02-001-TASK-NAME"
/// );
/// ```
pub fn normalize_task_key(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(Error::Validation("empty task key".to_string()));
    }

    let normalized = normalize(input);

    if normalized.starts_with("T-") {
        if is_task_key(&normalized) {
            return Ok(normalized);
        }
        return Err(Error::Validation(format!(
            "invalid task key format: {input:?}"
        )));
    }

    if is_short_task_key(&normalized) {
        return Ok(format!("T-{normalized}"));
    }

    // Slugged short form: E##-F##-###-some-slug
    if normalized.len() > 11
        && normalized.is_char_boundary(11)
        && is_short_task_key(&normalized[..11])
        && normalized.as_bytes()[11] == b'-'
    {
        return Ok(format!("T-{normalized}"));
    }

    Err(Error::Validation(format!(
        "invalid task key format: {input:?}"
    )))
}

/// Strips any readability slug, returning the bare canonical key.
///
/// `"T-E01-F02-001-TASK-NAME"` -> `"T-E01-F02-001"`. Canonical and slugged
/// forms are equivalent for lookups, so store access goes through this.
pub fn strip_task_slug(key: &str) -> String {
    let normalized = normalize(key);
    if let Some(rest) = normalized.strip_prefix("T-") {
        if rest.len() > 11 && rest.is_char_boundary(11) && is_short_task_key(&rest[..11]) {
            return format!("T-{}", &rest[..11]);
        }
    }
    normalized
}

/// Parses a task number string, accepting only values 1–999.
pub fn parse_task_number(s: &str) -> Result<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Validation(format!(
            "invalid task number: {s:?} (must be numeric 1-999)"
        )));
    }
    let num: u32 = s
        .parse()
        .map_err(|_| Error::Validation(format!("invalid task number: {s:?}")))?;
    if !(1..=999).contains(&num) {
        return Err(Error::Validation(format!(
            "invalid task number: {s:?} (must be between 1 and 999)"
        )));
    }
    Ok(num)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        for key in ["e01", "E01", "t-e04-f02-001-slug", "E04-F07"] {
            let once = normalize(key);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn epic_key_shapes() {
        assert!(is_epic_key("E01"));
        assert!(is_epic_key("e99"));
        assert!(!is_epic_key("E1"));
        assert!(!is_epic_key("E001"));
        assert!(!is_epic_key("F01"));
    }

    #[test]
    fn feature_key_shapes() {
        assert!(is_feature_key("E04-F01"));
        assert!(is_feature_key("e01-f99"));
        assert!(!is_feature_key("E04F01"));
        assert!(!is_feature_key("E4-F01"));
    }

    #[test]
    fn task_key_shapes() {
        assert!(is_task_key("T-E04-F01-001"));
        assert!(is_task_key("T-E04-F01-001-create-models"));
        assert!(!is_task_key("E04-F01-001"));
        assert!(!is_task_key("T-E04-F01-01"));
        assert!(!is_task_key("T-E04-F01-001x"));
    }

    #[test]
    fn normalize_task_key_accepts_both_forms() {
        assert_eq!(normalize_task_key("T-E01-F02-001").unwrap(), "T-E01-F02-001");
        assert_eq!(normalize_task_key("e01-f02-001").unwrap(), "T-E01-F02-001");
        assert_eq!(
            normalize_task_key("e01-f02-001-task-name").unwrap(),
            "T-E01-F02-001-TASK-NAME"
        );
        assert_eq!(
            normalize_task_key("e01-f02-001-task-name").unwrap(),
            normalize_task_key("T-E01-F02-001-TASK-NAME").unwrap()
        );
        assert!(normalize_task_key("").is_err());
        assert!(normalize_task_key("not-a-key").is_err());
    }

    #[test]
    fn strip_task_slug_reduces_to_canonical() {
        assert_eq!(strip_task_slug("T-E01-F02-001-TASK-NAME"), "T-E01-F02-001");
        assert_eq!(strip_task_slug("t-e01-f02-001"), "T-E01-F02-001");
    }

    #[test]
    fn task_number_range() {
        assert_eq!(parse_task_number("001").unwrap(), 1);
        assert_eq!(parse_task_number("999").unwrap(), 999);
        assert!(parse_task_number("000").is_err());
        assert!(parse_task_number("1000").is_err());
        assert!(parse_task_number("abc").is_err());
    }

    #[test]
    fn parse_feature_key_splits_parts() {
        let (epic, feature) = parse_feature_key("e04-f07").unwrap();
        assert_eq!(epic, "E04");
        assert_eq!(feature, "F07");
        assert!(parse_feature_key("E04").is_err());
    }
}
