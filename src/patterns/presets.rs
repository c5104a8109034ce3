use serde::Serialize;

use super::{EntityScope, PatternConfig, PatternRule, RuleTarget};
use crate::error::{Error, Result};

/// Metadata about a built-in pattern preset.
#[derive(Debug, Clone, Serialize)]
pub struct PresetInfo {
    pub name: &'static str,
    pub description: &'static str,
}

const PRESET_ORDER: &[PresetInfo] = &[
    PresetInfo {
        name: "standard",
        description: "E##/E##-slug folders with epic.md, prd.md, and T-E##-F##-### task files",
    },
    PresetInfo {
        name: "numeric-only",
        description: "E###, E###-F### numbering without slugs",
    },
    PresetInfo {
        name: "legacy-prp",
        description: "##-name.prp.md task files in prps/ subfolders",
    },
];

/// Lists all built-in presets in a stable order.
pub fn list_presets() -> Vec<PresetInfo> {
    PRESET_ORDER.to_vec()
}

/// Returns the rule set for a named preset.
pub fn preset(name: &str) -> Result<PatternConfig> {
    match name {
        "standard" => Ok(standard()),
        "numeric-only" => Ok(numeric_only()),
        "legacy-prp" => Ok(legacy_prp()),
        other => Err(Error::Config(format!("unknown preset: {other}"))),
    }
}

fn rule(
    name: &str,
    scope: EntityScope,
    target: RuleTarget,
    pattern: &str,
    format: Option<&str>,
) -> PatternRule {
    PatternRule {
        name: name.to_string(),
        scope,
        target,
        pattern: pattern.to_string(),
        format: format.map(str::to_string),
    }
}

fn standard() -> PatternConfig {
    use EntityScope::*;
    use RuleTarget::*;

    PatternConfig {
        rules: vec![
            // Key-prefixed folders, slug optional: E04, E04-user-auth
            rule(
                "epic-folder",
                Epic,
                Folder,
                r"^E(?P<number>\d{2})(?:-(?P<slug>[a-z0-9-]+))?$",
                Some("E{number:02}-{slug}"),
            ),
            rule("epic-doc", Epic, File, r"^epic\.md$", None),
            // Feature folders with or without the epic prefix:
            // E04-F01-db-schema or F01-db-schema
            rule(
                "feature-folder",
                Feature,
                Folder,
                r"^(?:E(?P<epic_num>\d{2})-)?F(?P<number>\d{2})(?:-(?P<slug>[a-z0-9-]+))?$",
                Some("E{epic:02}-F{number:02}-{slug}"),
            ),
            rule("feature-prd", Feature, File, r"^prd\.md$", None),
            rule(
                "feature-prd-named",
                Feature,
                File,
                r"^PRD_F(?P<number>\d{2})-(?P<slug>.+)\.md$",
                None,
            ),
            // Full task key filenames, slug optional
            rule(
                "task-keyed",
                Task,
                File,
                r"^T-E(?P<epic_num>\d{2})-F(?P<feature_num>\d{2})-(?P<number>\d{3})(?:-(?P<slug>.+?))?\.md$",
                Some("T-E{epic:02}-F{feature:02}-{number:03}.md"),
            ),
            // Numbered task files: 001-create-models.md
            rule(
                "task-numbered",
                Task,
                File,
                r"^(?P<number>\d{3})-(?P<slug>.+)\.md$",
                None,
            ),
        ],
    }
}

fn numeric_only() -> PatternConfig {
    use EntityScope::*;
    use RuleTarget::*;

    PatternConfig {
        rules: vec![
            rule(
                "epic-numeric",
                Epic,
                Folder,
                r"^E(?P<number>\d{3})$",
                Some("E{number:03}"),
            ),
            rule("epic-doc", Epic, File, r"^epic\.md$", None),
            rule(
                "feature-numeric",
                Feature,
                Folder,
                r"^E(?P<epic_num>\d{3})-F(?P<number>\d{3})$",
                Some("E{epic:03}-F{number:03}"),
            ),
            rule("feature-prd", Feature, File, r"^prd\.md$", None),
            rule("feature-doc", Feature, File, r"^feature\.md$", None),
            rule(
                "task-numeric",
                Task,
                File,
                r"^T-E(?P<epic_num>\d{3})-F(?P<feature_num>\d{3})-(?P<number>\d{3})\.md$",
                Some("T-E{epic:03}-F{feature:03}-{number:03}.md"),
            ),
        ],
    }
}

fn legacy_prp() -> PatternConfig {
    use EntityScope::*;
    use RuleTarget::*;

    PatternConfig {
        rules: vec![
            rule(
                "task-prp-numbered",
                Task,
                File,
                r"^(?P<number>\d{2})-(?P<slug>.+)\.prp\.md$",
                Some("{number:02}-{slug}.prp.md"),
            ),
            rule(
                "task-prp",
                Task,
                File,
                r"^(?P<slug>[a-z0-9-]+)\.prp\.md$",
                None,
            ),
        ],
    }
}
