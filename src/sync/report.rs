//! Sync run summary, renderable as text or JSON.

use serde::Serialize;

use super::reconcile::ConflictRecord;

/// One entity the run deliberately left alone, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    pub key: String,
    pub reason: String,
}

/// Full accounting of one sync run. Serialized as-is for `--json` output.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub root: String,
    pub strategy: String,
    pub dry_run: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<SkippedRecord>,
    pub unchanged: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub folders_scanned: usize,
    pub files_analyzed: usize,
    /// Matched files the incremental gate skipped without reading.
    pub files_skipped: usize,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.updated.is_empty()
    }

    /// True when anything went wrong enough to warrant a nonzero exit.
    pub fn has_problems(&self) -> bool {
        !self.conflicts.is_empty() || !self.errors.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry run)" } else { "" };
        out.push_str(&format!(
            "Sync of {} with strategy {}{}\n",
            self.root, self.strategy, mode
        ));
        out.push_str(&format!(
            "  scanned {} folders, analyzed {} files, skipped {} unchanged\n",
            self.folders_scanned, self.files_analyzed, self.files_skipped
        ));
        out.push_str(&format!(
            "  created {}, updated {}, unchanged {}, skipped {}\n",
            self.created.len(),
            self.updated.len(),
            self.unchanged,
            self.skipped.len()
        ));
        for key in &self.created {
            out.push_str(&format!("  + {key}\n"));
        }
        for key in &self.updated {
            out.push_str(&format!("  ~ {key}\n"));
        }
        for skip in &self.skipped {
            out.push_str(&format!("  - {} ({})\n", skip.key, skip.reason));
        }
        if !self.conflicts.is_empty() {
            out.push_str(&format!("  {} conflict(s):\n", self.conflicts.len()));
            for c in &self.conflicts {
                out.push_str(&format!(
                    "  ! {} {}: {}\n",
                    c.kind.as_str(),
                    c.key,
                    c.message
                ));
            }
        }
        for w in &self.warnings {
            out.push_str(&format!("  warning: {w}\n"));
        }
        for e in &self.errors {
            out.push_str(&format!("  error: {e}\n"));
        }
        out.push_str(&format!("  finished in {}ms\n", self.duration_ms));
        out
    }
}
