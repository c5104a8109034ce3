//! Pattern-driven discovery of entity structure from the file tree.
//!
//! The scanner walks a documentation root, classifies every directory and
//! file through the [`Matcher`](crate::patterns::Matcher), and rebuilds the
//! epic/feature/task forest from physical nesting. Parent links come from the
//! nearest matching ancestor folder, never from any key a file declares
//! internally. Discovered structures belong to one running scan and are
//! discarded after reconciliation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::db::Fingerprint;
use crate::error::Result;
use crate::extract::{self, Metadata};
use crate::keys;
use crate::patterns::{EntityScope, MatchOutcome, Matcher, PatternConfig};
use crate::sync::Checkpoint;

/// Files larger than this are skipped with a warning.
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// An epic candidate reconstructed from a folder.
#[derive(Debug, Clone)]
pub struct DiscoveredEpic {
    pub key: String,
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    /// Root-relative path of the defining document (`epic.md`), if present.
    pub file_path: Option<String>,
    /// The defining document exists but was gated out as unchanged, so the
    /// folder-derived fields above are placeholders; the stored row stands.
    pub doc_unchanged: bool,
}

/// A feature candidate reconstructed from a folder nested under an epic.
#[derive(Debug, Clone)]
pub struct DiscoveredFeature {
    pub key: String,
    /// Parent epic key, from the nearest matching ancestor folder.
    pub epic_key: String,
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    /// Root-relative path of the defining document (PRD), if present.
    pub file_path: Option<String>,
    /// Same contract as the epic flag: document present but unchanged.
    pub doc_unchanged: bool,
}

/// A task candidate reconstructed from a matched file.
#[derive(Debug, Clone)]
pub struct DiscoveredTask {
    /// Canonical key derived from nesting plus the file's number capture.
    pub key: String,
    pub feature_key: String,
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<i64>,
    /// Dependency keys declared in frontmatter, validated downstream.
    pub dependencies: Vec<String>,
    /// Root-relative path of the owning file.
    pub file_path: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStats {
    pub folders_scanned: usize,
    pub files_analyzed: usize,
    /// Matched files skipped by the incremental gate.
    pub files_skipped: usize,
}

/// Everything one scan produced, in deterministic traversal order.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub epics: Vec<DiscoveredEpic>,
    pub features: Vec<DiscoveredFeature>,
    pub tasks: Vec<DiscoveredTask>,
    pub warnings: Vec<String>,
    pub stats: ScanStats,
    /// Fingerprints of every matched file this scan read and consumed.
    /// Rejected files are deliberately absent so later runs re-examine them.
    pub fingerprints: HashMap<String, Fingerprint>,
    /// Root-relative paths of matched files the incremental gate skipped.
    pub skipped_files: Vec<String>,
}

/// Walks a root directory and builds the discovered entity forest.
///
/// The effective [`PatternConfig`] is a required constructor argument and is
/// threaded through every scan — there is no implicit default. Scan
/// correctness depends entirely on receiving the project's real config; a
/// substituted built-in default silently degrades discovery to zero matches.
pub struct Scanner {
    matcher: Matcher,
}

impl Scanner {
    pub fn new(config: &PatternConfig) -> Result<Self> {
        Ok(Self {
            matcher: Matcher::new(config)?,
        })
    }

    /// Full scan, ignoring any incremental state.
    pub fn scan(&self, root: &Path) -> Result<ScanOutcome> {
        self.scan_with_checkpoint(root, None)
    }

    /// Scan gated by an incremental checkpoint: matched files whose
    /// fingerprint is unchanged are not re-read or re-extracted.
    pub fn scan_with_checkpoint(
        &self,
        root: &Path,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<ScanOutcome> {
        if !root.is_dir() {
            return Err(crate::error::Error::Config(format!(
                "documentation root does not exist: {}",
                root.display()
            )));
        }

        let mut outcome = ScanOutcome::default();
        // Folder path -> discovered index, for nearest-ancestor lookups.
        let mut epic_dirs: HashMap<PathBuf, usize> = HashMap::new();
        let mut feature_dirs: HashMap<PathBuf, usize> = HashMap::new();

        // Name-sorted traversal keeps the duplicate-key tie-break in
        // reconciliation reproducible across runs.
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // Unreadable subtree: isolate and continue.
                    outcome.warnings.push(format!("walk error: {err}"));
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            if entry.file_type().is_dir() {
                outcome.stats.folders_scanned += 1;
                self.classify_folder(
                    &entry,
                    &mut outcome,
                    &mut epic_dirs,
                    &mut feature_dirs,
                );
            } else if entry.file_type().is_file() {
                self.classify_file(
                    root,
                    &entry,
                    checkpoint,
                    &mut outcome,
                    &epic_dirs,
                    &feature_dirs,
                );
            }
            // Symlinks and other non-regular entries are ignored.
        }

        Ok(outcome)
    }

    fn classify_folder(
        &self,
        entry: &walkdir::DirEntry,
        outcome: &mut ScanOutcome,
        epic_dirs: &mut HashMap<PathBuf, usize>,
        feature_dirs: &mut HashMap<PathBuf, usize>,
    ) {
        let name = entry.file_name().to_string_lossy();
        // Non-matching folders are organizational: recursion continues
        // through them and siblings are unaffected.
        let Some(outcome_match) = self.matcher.match_folder(&name) else {
            return;
        };

        match outcome_match.scope {
            EntityScope::Epic => {
                let Some(key) = epic_key_from(&outcome_match) else {
                    outcome
                        .warnings
                        .push(format!("epic folder {name:?}: rule matched but no number captured"));
                    return;
                };
                let slug = outcome_match.captures.get("slug").cloned();
                let title = slug
                    .as_deref()
                    .map(title_from_slug)
                    .unwrap_or_else(|| key.clone());
                outcome.epics.push(DiscoveredEpic {
                    key,
                    slug,
                    title,
                    description: None,
                    status: None,
                    file_path: None,
                    doc_unchanged: false,
                });
                epic_dirs.insert(entry.path().to_path_buf(), outcome.epics.len() - 1);
            }
            EntityScope::Feature => {
                // Nesting decides the parent; a captured epic number is only
                // a fallback for trees without epic folders.
                let epic_key = nearest(epic_dirs, entry.path())
                    .map(|idx| outcome.epics[idx].key.clone())
                    .or_else(|| {
                        outcome_match
                            .captures
                            .get("epic_num")
                            .map(|n| format!("E{n}"))
                    });
                let Some(epic_key) = epic_key else {
                    outcome.warnings.push(format!(
                        "feature folder {name:?} has no epic ancestor; skipped"
                    ));
                    return;
                };
                let Some(number) = outcome_match.captures.get("number") else {
                    outcome
                        .warnings
                        .push(format!("feature folder {name:?}: no number captured"));
                    return;
                };
                let key = format!("{epic_key}-F{number}");
                let slug = outcome_match.captures.get("slug").cloned();
                let title = slug
                    .as_deref()
                    .map(title_from_slug)
                    .unwrap_or_else(|| key.clone());
                outcome.features.push(DiscoveredFeature {
                    key,
                    epic_key,
                    slug,
                    title,
                    description: None,
                    status: None,
                    file_path: None,
                    doc_unchanged: false,
                });
                feature_dirs.insert(entry.path().to_path_buf(), outcome.features.len() - 1);
            }
            EntityScope::Task => {
                // Task-scoped folder rules exist for custom configs; the
                // folder itself carries no metadata, so nothing to record.
            }
        }
    }

    fn classify_file(
        &self,
        root: &Path,
        entry: &walkdir::DirEntry,
        checkpoint: Option<&Checkpoint>,
        outcome: &mut ScanOutcome,
        epic_dirs: &HashMap<PathBuf, usize>,
        feature_dirs: &HashMap<PathBuf, usize>,
    ) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(file_match) = self.matcher.match_file(&name) else {
            return;
        };

        let rel_path = relative_path(root, entry.path());

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                outcome
                    .warnings
                    .push(format!("cannot stat {rel_path}: {err}"));
                return;
            }
        };
        if metadata.len() > MAX_FILE_SIZE {
            outcome.warnings.push(format!(
                "{rel_path} exceeds {MAX_FILE_SIZE} bytes; skipped"
            ));
            return;
        }

        let fingerprint = Fingerprint {
            mtime: mtime_of(&metadata),
            size: metadata.len(),
        };

        // Incremental gate: unchanged files are not re-read at all. A gated
        // epic/feature document marks its entity so reconciliation does not
        // mistake the folder-derived placeholder fields for file edits.
        if let Some(cp) = checkpoint {
            if cp.is_unchanged(&rel_path, &fingerprint) {
                match file_match.scope {
                    EntityScope::Epic => {
                        if let Some(idx) = nearest(epic_dirs, entry.path()) {
                            let epic = &mut outcome.epics[idx];
                            if epic.file_path.is_none() {
                                epic.doc_unchanged = true;
                            }
                        }
                    }
                    EntityScope::Feature => {
                        if let Some(idx) = nearest(feature_dirs, entry.path()) {
                            let feature = &mut outcome.features[idx];
                            if feature.file_path.is_none() {
                                feature.doc_unchanged = true;
                            }
                        }
                    }
                    // A gated task file yields no candidate at all.
                    EntityScope::Task => {}
                }
                outcome.stats.files_skipped += 1;
                outcome.skipped_files.push(rel_path);
                return;
            }
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(c) => c,
            Err(err) => {
                outcome
                    .warnings
                    .push(format!("cannot read {rel_path}: {err}"));
                return;
            }
        };

        outcome.stats.files_analyzed += 1;
        let (meta, mut warnings) = extract::extract_metadata(&content, &name, Some(&file_match));
        outcome.warnings.append(&mut warnings);

        let consumed = match file_match.scope {
            EntityScope::Epic => {
                self.attach_epic_doc(entry, rel_path, meta, outcome, epic_dirs)
            }
            EntityScope::Feature => {
                self.attach_feature_doc(entry, rel_path, meta, outcome, feature_dirs)
            }
            EntityScope::Task => self.record_task(
                entry,
                rel_path,
                &file_match,
                meta,
                outcome,
                feature_dirs,
            ),
        };

        // Fingerprint recorded only for files this scan actually consumed;
        // a rejected file stays unindexed and is re-examined next run.
        if consumed {
            outcome.fingerprints.insert(
                relative_path(root, entry.path()),
                fingerprint,
            );
        }
    }

    fn attach_epic_doc(
        &self,
        entry: &walkdir::DirEntry,
        rel_path: String,
        meta: Metadata,
        outcome: &mut ScanOutcome,
        epic_dirs: &HashMap<PathBuf, usize>,
    ) -> bool {
        let Some(idx) = nearest(epic_dirs, entry.path()) else {
            outcome.warnings.push(format!(
                "{rel_path}: epic document outside any epic folder; skipped"
            ));
            return false;
        };
        let epic = &mut outcome.epics[idx];
        if epic.file_path.is_some() || epic.doc_unchanged {
            // First defining document in traversal order wins.
            return true;
        }
        epic.file_path = Some(rel_path);
        // A placeholder title means the document had nothing usable; the
        // folder-derived title stands in that case.
        if meta.title != extract::PLACEHOLDER_TITLE {
            epic.title = meta.title;
        }
        epic.description = meta.description;
        epic.status = meta.status;
        true
    }

    fn attach_feature_doc(
        &self,
        entry: &walkdir::DirEntry,
        rel_path: String,
        meta: Metadata,
        outcome: &mut ScanOutcome,
        feature_dirs: &HashMap<PathBuf, usize>,
    ) -> bool {
        let Some(idx) = nearest(feature_dirs, entry.path()) else {
            outcome.warnings.push(format!(
                "{rel_path}: feature document outside any feature folder; skipped"
            ));
            return false;
        };
        let feature = &mut outcome.features[idx];
        if feature.file_path.is_some() || feature.doc_unchanged {
            return true;
        }
        feature.file_path = Some(rel_path);
        if meta.title != extract::PLACEHOLDER_TITLE {
            feature.title = meta.title;
        }
        feature.description = meta.description;
        feature.status = meta.status;
        true
    }

    fn record_task(
        &self,
        entry: &walkdir::DirEntry,
        rel_path: String,
        file_match: &MatchOutcome,
        meta: Metadata,
        outcome: &mut ScanOutcome,
        feature_dirs: &HashMap<PathBuf, usize>,
    ) -> bool {
        // Parentage from nesting first; full-key filenames are only a
        // fallback for flat legacy layouts.
        let feature_key = nearest(feature_dirs, entry.path())
            .map(|idx| outcome.features[idx].key.clone())
            .or_else(|| {
                match (
                    file_match.captures.get("epic_num"),
                    file_match.captures.get("feature_num"),
                ) {
                    (Some(e), Some(f)) => Some(format!("E{e}-F{f}")),
                    _ => None,
                }
            });
        let Some(feature_key) = feature_key else {
            outcome.warnings.push(format!(
                "{rel_path}: task file has no feature ancestor and no key in its name; skipped"
            ));
            return false;
        };

        let Some(number) = file_match.captures.get("number") else {
            outcome.warnings.push(format!(
                "{rel_path}: task rule {:?} captured no number; skipped",
                file_match.rule_name
            ));
            return false;
        };
        let number = match keys::parse_task_number(number) {
            Ok(n) => n,
            Err(err) => {
                outcome.warnings.push(format!("{rel_path}: {err}"));
                return false;
            }
        };

        let key = format!("T-{feature_key}-{number:03}");
        outcome.tasks.push(DiscoveredTask {
            key,
            feature_key,
            slug: file_match.captures.get("slug").cloned(),
            title: meta.title,
            description: meta.description,
            status: meta.status,
            priority: meta.priority,
            dependencies: meta.dependencies,
            file_path: rel_path,
        });
        true
    }
}

fn epic_key_from(outcome: &MatchOutcome) -> Option<String> {
    outcome.captures.get("number").map(|n| format!("E{n}"))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Finds the deepest recorded folder that is an ancestor of `path`.
fn nearest(dirs: &HashMap<PathBuf, usize>, path: &Path) -> Option<usize> {
    path.ancestors()
        .skip(1)
        .find_map(|ancestor| dirs.get(ancestor).copied())
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn title_from_slug(slug: &str) -> String {
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

fn mtime_of(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}
