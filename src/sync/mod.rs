//! Orchestration of one sync run: scan, reconcile, apply, checkpoint.
//!
//! The store and the file tree are both mutable; neither is authoritative by
//! default. A strategy names whose values win when they disagree, and every
//! disagreement the strategy does not resolve becomes a reported conflict.
//! Entities are processed parent-first in traversal order so that features
//! find their epics and tasks find their features already persisted.

pub mod apply;
pub mod checkpoint;
pub mod reconcile;
pub mod report;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use chrono::Utc;

use crate::db::{Database, Fingerprint};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::keys;
use crate::models::EntityKind;
use crate::patterns::PatternConfig;
use crate::scan::{ScanOutcome, Scanner};

pub use checkpoint::Checkpoint;
pub use reconcile::{Classification, ConflictRecord};
pub use report::{SkippedRecord, SyncReport};

/// Whose values win when the store and a file disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Classify and report only; never write.
    DryRun,
    /// Declared file values overwrite the store.
    FileAuthoritative,
    /// Stored values stand; disagreeing files are reported and skipped.
    StoreAuthoritative,
    /// Create entities the store lacks; never touch existing rows.
    CreateMissing,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DryRun => "dry-run",
            Self::FileAuthoritative => "file-authoritative",
            Self::StoreAuthoritative => "store-authoritative",
            Self::CreateMissing => "create-missing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "dry-run" => Some(Self::DryRun),
            "file-authoritative" | "file" => Some(Self::FileAuthoritative),
            "store-authoritative" | "store" => Some(Self::StoreAuthoritative),
            "create-missing" | "create" => Some(Self::CreateMissing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub strategy: SyncStrategy,
    /// Forces a report-only run regardless of strategy.
    pub dry_run: bool,
    /// Allows file-authoritative runs to reassign path ownership.
    pub force: bool,
    /// Refresh the incremental file index without reconciling entities.
    pub index_only: bool,
    /// Ignore the checkpoint and re-read every matched file.
    pub force_full: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::DryRun,
            dry_run: false,
            force: false,
            index_only: false,
            force_full: false,
        }
    }
}

pub struct SyncEngine {
    db: Database,
    config: PatternConfig,
}

impl SyncEngine {
    pub fn new(db: Database, config: PatternConfig) -> Self {
        Self { db, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Runs one full sync of `root` and returns the accounting.
    ///
    /// The checkpoint advances only when the run wrote (i.e. was not a dry
    /// run) and completed; a run that errors out leaves it untouched, so the
    /// next run re-examines the same files.
    pub fn sync(&self, root: &Path, options: &SyncOptions) -> Result<SyncReport> {
        let started = Instant::now();
        let root = root.canonicalize().map_err(|err| {
            Error::Config(format!("cannot resolve root {}: {err}", root.display()))
        })?;
        let root_key = root.to_string_lossy().into_owned();
        let dry_run = options.dry_run || options.strategy == SyncStrategy::DryRun;

        tracing::info!(
            root = %root_key,
            strategy = options.strategy.as_str(),
            dry_run,
            "starting sync"
        );

        let checkpoint = if options.force_full {
            None
        } else {
            Checkpoint::load(&self.db, &root_key)?
        };

        let scanner = Scanner::new(&self.config)?;
        let outcome = scanner.scan_with_checkpoint(&root, checkpoint.as_ref())?;

        let mut report = SyncReport {
            root: root_key.clone(),
            strategy: options.strategy.as_str().to_string(),
            dry_run,
            warnings: outcome.warnings.clone(),
            folders_scanned: outcome.stats.folders_scanned,
            files_analyzed: outcome.stats.files_analyzed,
            files_skipped: outcome.stats.files_skipped,
            ..Default::default()
        };

        // Files whose entities ended unresolved (conflict, error, or a
        // strategy skip) are kept out of the checkpoint so later runs, a
        // forced retry included, re-read them.
        let mut unresolved: HashSet<String> = HashSet::new();
        if !options.index_only {
            self.reconcile_all(&outcome, options, dry_run, &mut report, &mut unresolved)?;
            self.sync_dependencies(&outcome, dry_run, &mut report, &mut unresolved)?;
        }

        if !dry_run {
            let mut merged = merge_fingerprints(&outcome, checkpoint.as_ref());
            for path in &unresolved {
                merged.remove(path);
            }
            self.db.save_checkpoint(&root_key, Utc::now(), &merged)?;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            created = report.created.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged,
            conflicts = report.conflicts.len(),
            "sync finished"
        );
        Ok(report)
    }

    fn reconcile_all(
        &self,
        outcome: &ScanOutcome,
        options: &SyncOptions,
        dry_run: bool,
        report: &mut SyncReport,
        unresolved: &mut HashSet<String>,
    ) -> Result<()> {
        // First occurrence in traversal order wins a key; later ones are
        // conflicts, never silent drops.
        let mut seen: HashSet<String> = HashSet::new();

        for d in &outcome.epics {
            if !seen.insert(d.key.clone()) {
                report.conflicts.push(duplicate_key(
                    EntityKind::Epic,
                    &d.key,
                    d.file_path.as_deref(),
                ));
                if let Some(path) = &d.file_path {
                    unresolved.insert(path.clone());
                }
                continue;
            }
            let classification = reconcile::classify_epic(&self.db, d)?;
            let settled = self.dispatch(
                classification,
                EntityKind::Epic,
                &d.key,
                options,
                dry_run,
                report,
                || apply::create_epic(&self.db, d, false),
                |force| {
                    let existing = self
                        .db
                        .get_epic(&d.key)?
                        .ok_or_else(|| Error::Validation(format!("epic vanished: {}", d.key)))?;
                    let diffs = reconcile::epic_diffs(&existing, d);
                    apply::update_epic(&self.db, existing, d, &diffs, force)
                },
                |force| match self.db.get_epic(&d.key)? {
                    Some(existing) => {
                        let diffs = reconcile::epic_diffs(&existing, d);
                        apply::update_epic(&self.db, existing, d, &diffs, force)
                    }
                    None => apply::create_epic(&self.db, d, force),
                },
            );
            if !settled {
                if let Some(path) = &d.file_path {
                    unresolved.insert(path.clone());
                }
            }
        }

        for d in &outcome.features {
            if !seen.insert(d.key.clone()) {
                report.conflicts.push(duplicate_key(
                    EntityKind::Feature,
                    &d.key,
                    d.file_path.as_deref(),
                ));
                if let Some(path) = &d.file_path {
                    unresolved.insert(path.clone());
                }
                continue;
            }
            let classification = reconcile::classify_feature(&self.db, d)?;
            let settled = self.dispatch(
                classification,
                EntityKind::Feature,
                &d.key,
                options,
                dry_run,
                report,
                || apply::create_feature(&self.db, d, false),
                |force| {
                    let existing = self
                        .db
                        .get_feature(&d.key)?
                        .ok_or_else(|| Error::Validation(format!("feature vanished: {}", d.key)))?;
                    let diffs = reconcile::feature_diffs(&existing, d);
                    apply::update_feature(&self.db, existing, d, &diffs, force)
                },
                |force| match self.db.get_feature(&d.key)? {
                    Some(existing) => {
                        let diffs = reconcile::feature_diffs(&existing, d);
                        apply::update_feature(&self.db, existing, d, &diffs, force)
                    }
                    None => apply::create_feature(&self.db, d, force),
                },
            );
            if !settled {
                if let Some(path) = &d.file_path {
                    unresolved.insert(path.clone());
                }
            }
        }

        for d in &outcome.tasks {
            if !seen.insert(d.key.clone()) {
                report.conflicts.push(duplicate_key(
                    EntityKind::Task,
                    &d.key,
                    Some(&d.file_path),
                ));
                unresolved.insert(d.file_path.clone());
                continue;
            }
            let classification = reconcile::classify_task(&self.db, d)?;
            let settled = self.dispatch(
                classification,
                EntityKind::Task,
                &d.key,
                options,
                dry_run,
                report,
                || apply::create_task(&self.db, d, false),
                |force| {
                    let existing = self
                        .db
                        .get_task(&d.key)?
                        .ok_or_else(|| Error::Validation(format!("task vanished: {}", d.key)))?;
                    let diffs = reconcile::task_diffs(&existing, d);
                    apply::update_task(&self.db, existing, d, &diffs, force)
                },
                |force| match self.db.get_task(&d.key)? {
                    Some(existing) => {
                        let diffs = reconcile::task_diffs(&existing, d);
                        apply::update_task(&self.db, existing, d, &diffs, force)
                    }
                    None => apply::create_task(&self.db, d, force),
                },
            );
            if !settled {
                unresolved.insert(d.file_path.clone());
            }
        }

        Ok(())
    }

    /// Strategy dispatch for one classified entity. Apply errors are
    /// isolated: a constraint violation becomes a conflict record, anything
    /// else an error line, and the run continues either way.
    ///
    /// Returns whether the entity's file content is now settled in the
    /// store. A conflict, error, or strategy skip returns `false`, and the
    /// caller keeps that file out of the checkpoint.
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        classification: Classification,
        kind: EntityKind,
        key: &str,
        options: &SyncOptions,
        dry_run: bool,
        report: &mut SyncReport,
        create: impl FnOnce() -> Result<()>,
        update: impl FnOnce(bool) -> Result<()>,
        claim: impl FnOnce(bool) -> Result<()>,
    ) -> bool {
        match classification {
            Classification::Unchanged => {
                report.unchanged += 1;
                true
            }
            Classification::New => {
                if dry_run {
                    report.created.push(key.to_string());
                    return true;
                }
                match create() {
                    Ok(()) => {
                        report.created.push(key.to_string());
                        true
                    }
                    Err(err) => {
                        record_apply_error(report, kind, key, err);
                        false
                    }
                }
            }
            Classification::Changed(_) => match options.strategy {
                SyncStrategy::DryRun | SyncStrategy::FileAuthoritative => {
                    if dry_run {
                        report.updated.push(key.to_string());
                        return true;
                    }
                    match update(options.force) {
                        Ok(()) => {
                            report.updated.push(key.to_string());
                            true
                        }
                        Err(err) => {
                            record_apply_error(report, kind, key, err);
                            false
                        }
                    }
                }
                SyncStrategy::StoreAuthoritative => {
                    report.skipped.push(SkippedRecord {
                        key: key.to_string(),
                        reason: "store-authoritative keeps existing values".to_string(),
                    });
                    false
                }
                SyncStrategy::CreateMissing => {
                    report.skipped.push(SkippedRecord {
                        key: key.to_string(),
                        reason: "exists; create-missing never updates".to_string(),
                    });
                    false
                }
            },
            Classification::PathConflict(record) => {
                match options.strategy {
                    SyncStrategy::FileAuthoritative if options.force => {
                        if dry_run {
                            report.updated.push(key.to_string());
                            return true;
                        }
                        match claim(true) {
                            Ok(()) => {
                                report.updated.push(key.to_string());
                                true
                            }
                            Err(err) => {
                                record_apply_error(report, kind, key, err);
                                false
                            }
                        }
                    }
                    SyncStrategy::CreateMissing => {
                        // Owned paths are out of scope for create-missing.
                        report.skipped.push(SkippedRecord {
                            key: key.to_string(),
                            reason: record.message,
                        });
                        false
                    }
                    _ => {
                        report.conflicts.push(record);
                        false
                    }
                }
            }
        }
    }

    /// Validates and persists dependency edges declared by synced tasks.
    ///
    /// Edges already persisted are left alone; a new edge that would close a
    /// cycle is rejected for that task only, with the cycle path in the
    /// error line.
    fn sync_dependencies(
        &self,
        outcome: &ScanOutcome,
        dry_run: bool,
        report: &mut SyncReport,
        unresolved: &mut HashSet<String>,
    ) -> Result<()> {
        if outcome.tasks.iter().all(|t| t.dependencies.is_empty()) {
            return Ok(());
        }

        let edges = self.db.list_task_dependencies()?;
        let mut persisted: HashSet<(String, String)> = edges.iter().cloned().collect();
        let mut graph = DependencyGraph::from_edges(edges);

        for task in &outcome.tasks {
            for raw in &task.dependencies {
                let dep = match keys::normalize_task_key(raw) {
                    Ok(normalized) => keys::strip_task_slug(&normalized),
                    Err(err) => {
                        report
                            .errors
                            .push(format!("{}: dependency {raw:?}: {err}", task.key));
                        unresolved.insert(task.file_path.clone());
                        continue;
                    }
                };
                let edge = (task.key.clone(), dep.clone());
                if persisted.contains(&edge) {
                    continue;
                }
                match graph.validate_dependency(&task.key, &dep) {
                    Ok(()) => {
                        if !dry_run {
                            if let Err(err) = self.db.add_task_dependency(&task.key, &dep) {
                                record_apply_error(report, EntityKind::Task, &task.key, err);
                                unresolved.insert(task.file_path.clone());
                                continue;
                            }
                        }
                        graph.add_dependency(&task.key, &dep);
                        persisted.insert(edge);
                    }
                    Err(err) => {
                        report.errors.push(err.to_string());
                        unresolved.insert(task.file_path.clone());
                    }
                }
            }
        }

        Ok(())
    }
}

fn duplicate_key(kind: EntityKind, key: &str, file_path: Option<&str>) -> ConflictRecord {
    ConflictRecord {
        kind,
        key: key.to_string(),
        file_path: file_path.map(str::to_string),
        message: "duplicate key; an earlier file in traversal order already claimed it"
            .to_string(),
    }
}

fn record_apply_error(report: &mut SyncReport, kind: EntityKind, key: &str, err: Error) {
    if err.is_constraint_violation() {
        report.conflicts.push(ConflictRecord {
            kind,
            key: key.to_string(),
            file_path: None,
            message: format!("constraint violation: {err}"),
        });
    } else {
        report.errors.push(format!("{} {}: {err}", kind.as_str(), key));
    }
}

/// New fingerprints from this scan, plus carried-forward ones for files the
/// incremental gate skipped. Files deleted since last sync drop out.
fn merge_fingerprints(
    outcome: &ScanOutcome,
    checkpoint: Option<&Checkpoint>,
) -> HashMap<String, Fingerprint> {
    let mut merged = outcome.fingerprints.clone();
    if let Some(cp) = checkpoint {
        for path in &outcome.skipped_files {
            if let Some(fp) = cp.carry_forward(path) {
                merged.insert(path.clone(), fp);
            }
        }
    }
    merged
}
