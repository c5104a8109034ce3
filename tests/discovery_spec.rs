use std::fs;
use std::path::Path;

use speculate2::speculate;
use waypoint::extract::extract_metadata;
use waypoint::patterns::{EntityScope, Matcher, PatternConfig};
use waypoint::scan::Scanner;
use waypoint::{keys, slug};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("relative path has parent")).expect("mkdir");
    fs::write(path, content).expect("write file");
}

speculate! {
    describe "standard preset" {
        before {
            let matcher = Matcher::new(&PatternConfig::standard()).expect("valid preset");
        }

        it "classifies the documented layout" {
            assert_eq!(matcher.match_folder("E04").unwrap().scope, EntityScope::Epic);
            assert_eq!(matcher.match_folder("E04-user-auth").unwrap().scope, EntityScope::Epic);
            assert_eq!(matcher.match_folder("F01-db-schema").unwrap().scope, EntityScope::Feature);
            assert_eq!(matcher.match_folder("E04-F01-db-schema").unwrap().scope, EntityScope::Feature);
            assert_eq!(
                matcher.match_file("T-E04-F01-001-create-models.md").unwrap().scope,
                EntityScope::Task
            );
            assert_eq!(matcher.match_file("epic.md").unwrap().scope, EntityScope::Epic);
            assert_eq!(matcher.match_file("prd.md").unwrap().scope, EntityScope::Feature);
        }

        it "leaves organizational names unmatched" {
            assert!(matcher.match_folder("docs").is_none());
            assert!(matcher.match_folder("tasks").is_none());
            assert!(matcher.match_file("README.md").is_none());
        }

        it "does not classify folders with file rules or vice versa" {
            assert!(matcher.match_file("E04").is_none());
            assert!(matcher.match_folder("epic.md").is_none());
        }
    }

    describe "project configuration" {
        it "a waypoint.json at the root replaces the standard rules" {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "waypoint.json", r#"{
                "rules": [
                    {
                        "name": "sprint-folder",
                        "scope": "epic",
                        "target": "folder",
                        "pattern": "^sprint-(?P<number>\\d{2})$"
                    },
                    {
                        "name": "story-file",
                        "scope": "task",
                        "target": "file",
                        "pattern": "^story-(?P<number>\\d{3})-(?P<slug>.+)\\.md$"
                    }
                ]
            }"#);

            let config = PatternConfig::load_or_standard(dir.path()).unwrap();
            let matcher = Matcher::new(&config).unwrap();
            assert_eq!(matcher.match_folder("sprint-01").unwrap().scope, EntityScope::Epic);
            assert!(matcher.match_folder("E04").is_none());
        }

        it "a malformed rule pattern fails fast with the rule name" {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "waypoint.json", r#"{
                "rules": [
                    {
                        "name": "broken",
                        "scope": "epic",
                        "target": "folder",
                        "pattern": "^E(\\d{2}$"
                    }
                ]
            }"#);

            let err = PatternConfig::load_or_standard(dir.path()).unwrap_err();
            assert!(err.to_string().contains("broken"));
        }

        it "a scanner is built from an explicit config, never a silent default" {
            let empty = PatternConfig { rules: Vec::new() };
            let scanner = Scanner::new(&empty).unwrap();
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "E01/F01-a/T-E01-F01-001-x.md", "# X\n");

            // No rules, no discoveries: the config given is the config used.
            let outcome = scanner.scan(dir.path()).unwrap();
            assert!(outcome.epics.is_empty());
            assert!(outcome.tasks.is_empty());
        }
    }

    describe "metadata extraction" {
        it "prefers frontmatter, then filename, then the first heading" {
            let (from_fm, _) = extract_metadata(
                "---\ntitle: From Frontmatter\n---\n# From Heading\n",
                "T-E01-F01-001-from-filename.md",
                None,
            );
            assert_eq!(from_fm.title, "From Frontmatter");

            let (from_heading, _) = extract_metadata("# From Heading\n", "prd.md", None);
            assert_eq!(from_heading.title, "From Heading");
        }

        it "strips noise prefixes from headings" {
            let (meta, _) = extract_metadata("# Task: Build Parser\n", "prd.md", None);
            assert_eq!(meta.title, "Build Parser");
        }

        it "caps descriptions at five hundred characters" {
            let body = format!("# T\n\n{}\n", "x".repeat(800));
            let (meta, _) = extract_metadata(&body, "prd.md", None);
            assert!(meta.description.unwrap().len() <= 500);
        }

        it "falls back to a placeholder with a warning when nothing is usable" {
            let (meta, warnings) = extract_metadata("", "prd.md", None);
            assert_eq!(meta.title, "Untitled");
            assert!(!warnings.is_empty());
        }
    }

    describe "keys and slugs" {
        it "accepts both task key forms and strips slugs" {
            assert!(keys::is_task_key("T-E04-F01-001"));
            assert!(keys::is_task_key("T-E04-F01-001-create-models"));
            assert_eq!(keys::strip_task_slug("T-E04-F01-001-create-models"), "T-E04-F01-001");
            assert_eq!(
                keys::normalize_task_key("e04-f01-001").unwrap(),
                "T-E04-F01-001"
            );
        }

        it "rejects out-of-range task numbers" {
            assert!(keys::parse_task_number("0").is_err());
            assert!(keys::parse_task_number("1000").is_err());
            assert_eq!(keys::parse_task_number("999").unwrap(), 999);
        }

        it "generates filesystem-safe slugs" {
            assert_eq!(slug::generate("Créer les modèles!"), "creer-les-modeles");
            assert_eq!(slug::generate("A  B__C"), "a-b-c");
            let long = slug::generate(&"word ".repeat(50));
            assert!(long.len() <= 100);
            assert!(!long.ends_with('-'));
        }
    }
}
