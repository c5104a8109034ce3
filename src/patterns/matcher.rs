use std::collections::HashMap;

use regex::Regex;

use super::{EntityScope, PatternConfig, RuleTarget};
use crate::error::{Error, Result};

/// A rule compiled for matching, retaining its position in config order.
struct CompiledRule {
    name: String,
    scope: EntityScope,
    target: RuleTarget,
    regex: Regex,
}

/// The result of classifying a filesystem name.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Name of the rule that matched.
    pub rule_name: String,
    pub scope: EntityScope,
    /// Named capture groups from the rule's pattern.
    pub captures: HashMap<String, String>,
}

/// Classifies filesystem names against an ordered rule set.
///
/// Rules are tried strictly in config order; the first match wins and no
/// partial matches are merged. A non-match is not an error — it means "not
/// this kind of entity".
pub struct Matcher {
    rules: Vec<CompiledRule>,
}

impl Matcher {
    /// Compiles all rules. A malformed pattern is a configuration-load-time
    /// error, never a per-file one.
    pub fn new(config: &PatternConfig) -> Result<Self> {
        let mut rules = Vec::with_capacity(config.rules.len());
        for (index, rule) in config.rules.iter().enumerate() {
            let regex = Regex::new(&rule.pattern).map_err(|e| {
                Error::Config(format!(
                    "rule #{} ({}): invalid pattern {:?}: {e}",
                    index + 1,
                    rule.name,
                    rule.pattern
                ))
            })?;
            rules.push(CompiledRule {
                name: rule.name.clone(),
                scope: rule.scope,
                target: rule.target,
                regex,
            });
        }
        Ok(Self { rules })
    }

    /// Matches a directory name against folder rules.
    pub fn match_folder(&self, name: &str) -> Option<MatchOutcome> {
        self.match_target(name, RuleTarget::Folder)
    }

    /// Matches a file name against file rules.
    pub fn match_file(&self, name: &str) -> Option<MatchOutcome> {
        self.match_target(name, RuleTarget::File)
    }

    fn match_target(&self, name: &str, target: RuleTarget) -> Option<MatchOutcome> {
        for rule in self.rules.iter().filter(|r| r.target == target) {
            let Some(caps) = rule.regex.captures(name) else {
                continue;
            };

            let mut captures = HashMap::new();
            for group in rule.regex.capture_names().flatten() {
                if let Some(value) = caps.name(group) {
                    captures.insert(group.to_string(), value.as_str().to_string());
                }
            }

            tracing::trace!(
                rule = %rule.name,
                scope = rule.scope.as_str(),
                %name,
                "pattern matched"
            );

            // First match wins.
            return Some(MatchOutcome {
                rule_name: rule.name.clone(),
                scope: rule.scope,
                captures,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternRule;

    fn config_with(rules: Vec<(&str, EntityScope, RuleTarget, &str)>) -> PatternConfig {
        PatternConfig {
            rules: rules
                .into_iter()
                .map(|(name, scope, target, pattern)| PatternRule {
                    name: name.to_string(),
                    scope,
                    target,
                    pattern: pattern.to_string(),
                    format: None,
                })
                .collect(),
        }
    }

    #[test]
    fn first_match_wins_in_config_order() {
        let config = config_with(vec![
            (
                "first",
                EntityScope::Task,
                RuleTarget::File,
                r"^(?P<number>\d{3})-(?P<slug>.+)\.md$",
            ),
            ("second", EntityScope::Task, RuleTarget::File, r"^.+\.md$"),
        ]);
        let matcher = Matcher::new(&config).unwrap();

        let outcome = matcher.match_file("001-setup.md").unwrap();
        assert_eq!(outcome.rule_name, "first");
        assert_eq!(outcome.captures["number"], "001");
        assert_eq!(outcome.captures["slug"], "setup");

        // Falls through to the catch-all only when the first rule misses.
        let outcome = matcher.match_file("notes.md").unwrap();
        assert_eq!(outcome.rule_name, "second");
    }

    #[test]
    fn folder_rules_never_match_files() {
        let config = config_with(vec![(
            "epics",
            EntityScope::Epic,
            RuleTarget::Folder,
            r"^E(?P<number>\d{2})$",
        )]);
        let matcher = Matcher::new(&config).unwrap();

        assert!(matcher.match_folder("E04").is_some());
        assert!(matcher.match_file("E04").is_none());
    }

    #[test]
    fn non_match_is_none_not_error() {
        let matcher = Matcher::new(&PatternConfig::standard()).unwrap();
        assert!(matcher.match_folder("random-notes").is_none());
    }

    #[test]
    fn standard_preset_classifies_common_layouts() {
        let matcher = Matcher::new(&PatternConfig::standard()).unwrap();

        let epic = matcher.match_folder("E04").unwrap();
        assert_eq!(epic.scope, EntityScope::Epic);
        assert_eq!(epic.captures["number"], "04");

        let epic = matcher.match_folder("E04-user-auth").unwrap();
        assert_eq!(epic.captures["slug"], "user-auth");

        let feature = matcher.match_folder("F01-db-schema").unwrap();
        assert_eq!(feature.scope, EntityScope::Feature);
        assert_eq!(feature.captures["number"], "01");

        let feature = matcher.match_folder("E04-F01-db-schema").unwrap();
        assert_eq!(feature.captures["epic_num"], "04");

        let task = matcher.match_file("T-E04-F01-001-create-models.md").unwrap();
        assert_eq!(task.scope, EntityScope::Task);
        assert_eq!(task.captures["number"], "001");

        assert_eq!(matcher.match_file("epic.md").unwrap().scope, EntityScope::Epic);
        assert_eq!(matcher.match_file("prd.md").unwrap().scope, EntityScope::Feature);
    }
}
