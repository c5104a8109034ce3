use serde::Deserialize;

use crate::error::{Error, Result};

/// Structured YAML header at the top of a markdown document.
///
/// Declared fields always override filename- and heading-derived values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub task_key: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Parses frontmatter from document content.
///
/// Returns `Ok(None)` when the content does not open with the `---`
/// delimiter — no frontmatter is not an error. A missing closing delimiter
/// is a hard parse error that must reach the caller, who decides whether to
/// fall back to treating the whole file as body.
pub fn parse(content: &str, path: &str) -> Result<Option<Frontmatter>> {
    if !content.starts_with("---\n") && !content.starts_with("---\r\n") {
        return Ok(None);
    }

    let Some(end) = closing_delimiter(content) else {
        return Err(Error::Parse {
            path: path.to_string(),
            message: "frontmatter missing closing delimiter '---'".to_string(),
        });
    };

    let header = &content[4..end.start];
    let fm: Frontmatter = serde_yaml::from_str(header).map_err(|e| Error::Parse {
        path: path.to_string(),
        message: format!("invalid YAML frontmatter: {e}"),
    })?;

    Ok(Some(fm))
}

/// Returns the document body after the frontmatter block, or the whole
/// content when no frontmatter is present.
pub fn body(content: &str) -> &str {
    if !content.starts_with("---\n") && !content.starts_with("---\r\n") {
        return content;
    }
    match closing_delimiter(content) {
        Some(end) => &content[end.end..],
        None => content,
    }
}

struct Span {
    start: usize,
    end: usize,
}

/// Finds the line containing the closing `---`, returning byte offsets of
/// the line start and of the first byte after it.
fn closing_delimiter(content: &str) -> Option<Span> {
    let mut offset = content.find('\n')? + 1; // skip the opening delimiter line
    for line in content[offset..].split_inclusive('\n') {
        if line.trim() == "---" {
            return Some(Span {
                start: offset,
                end: offset + line.len(),
            });
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_frontmatter_is_none() {
        assert!(parse("# Just a heading\n", "a.md").unwrap().is_none());
        assert!(parse("", "a.md").unwrap().is_none());
        // An hrule later in the body is not frontmatter.
        assert!(parse("text\n---\nmore\n", "a.md").unwrap().is_none());
    }

    #[test]
    fn parses_declared_fields() {
        let content = "---\ntitle: Create Models\nstatus: in_progress\npriority: 2\n---\n# Body\n";
        let fm = parse(content, "a.md").unwrap().unwrap();
        assert_eq!(fm.title.as_deref(), Some("Create Models"));
        assert_eq!(fm.status.as_deref(), Some("in_progress"));
        assert_eq!(fm.priority, Some(2));
        assert!(fm.dependencies.is_empty());
    }

    #[test]
    fn unterminated_frontmatter_is_a_hard_error() {
        let content = "---\ntitle: Oops\n\n# Never closed\n";
        let err = parse(content, "a.md").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let content = "---\ntitle: [unclosed\n---\n";
        assert!(parse(content, "a.md").is_err());
    }

    #[test]
    fn body_skips_the_header() {
        let content = "---\ntitle: X\n---\n# Heading\ntext\n";
        assert_eq!(body(content), "# Heading\ntext\n");
        assert_eq!(body("no header\n"), "no header\n");
    }
}
