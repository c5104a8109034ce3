//! Classification of discovered entities against the persisted store.
//!
//! Reconciliation is read-only: it looks up each discovered entity by key,
//! computes field-level differences, and checks path ownership. What happens
//! to each classification is the strategy dispatch in the engine.

use serde::Serialize;

use crate::db::Database;
use crate::error::Result;
use crate::models::{Epic, EntityKind, Feature, FieldDiff, Task};
use crate::scan::{DiscoveredEpic, DiscoveredFeature, DiscoveredTask};

/// An unresolved disagreement surfaced during sync, reported, never dropped.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictRecord {
    pub kind: EntityKind,
    pub key: String,
    pub file_path: Option<String>,
    pub message: String,
}

/// What the store knows about one discovered entity.
#[derive(Debug)]
pub enum Classification {
    /// No row with this key exists.
    New,
    /// A row exists and every compared field agrees.
    Unchanged,
    /// A row exists and these fields disagree.
    Changed(Vec<FieldDiff>),
    /// The discovered file path is owned by a different entity.
    PathConflict(ConflictRecord),
}

pub fn classify_epic(db: &Database, d: &DiscoveredEpic) -> Result<Classification> {
    if let Some(conflict) = path_conflict(db, EntityKind::Epic, &d.key, d.file_path.as_deref())? {
        return Ok(Classification::PathConflict(conflict));
    }
    let Some(existing) = db.get_epic(&d.key)? else {
        return Ok(Classification::New);
    };
    // The defining document was gated out as unchanged: the candidate only
    // carries folder-derived placeholders, so the stored row stands.
    if d.doc_unchanged {
        return Ok(Classification::Unchanged);
    }
    Ok(classification_from(epic_diffs(&existing, d)))
}

pub fn classify_feature(db: &Database, d: &DiscoveredFeature) -> Result<Classification> {
    if let Some(conflict) = path_conflict(db, EntityKind::Feature, &d.key, d.file_path.as_deref())?
    {
        return Ok(Classification::PathConflict(conflict));
    }
    let Some(existing) = db.get_feature(&d.key)? else {
        return Ok(Classification::New);
    };
    if d.doc_unchanged {
        return Ok(Classification::Unchanged);
    }
    Ok(classification_from(feature_diffs(&existing, d)))
}

pub fn classify_task(db: &Database, d: &DiscoveredTask) -> Result<Classification> {
    if let Some(conflict) = path_conflict(db, EntityKind::Task, &d.key, Some(&d.file_path))? {
        return Ok(Classification::PathConflict(conflict));
    }
    let Some(existing) = db.get_task(&d.key)? else {
        return Ok(Classification::New);
    };
    Ok(classification_from(task_diffs(&existing, d)))
}

fn classification_from(diffs: Vec<FieldDiff>) -> Classification {
    if diffs.is_empty() {
        Classification::Unchanged
    } else {
        Classification::Changed(diffs)
    }
}

/// A path owned by any *other* entity is a conflict, across all kinds.
fn path_conflict(
    db: &Database,
    kind: EntityKind,
    key: &str,
    file_path: Option<&str>,
) -> Result<Option<ConflictRecord>> {
    let Some(path) = file_path else {
        return Ok(None);
    };
    let Some((owner_kind, owner_key)) = db.find_path_owner(path)? else {
        return Ok(None);
    };
    if owner_kind == kind && owner_key == key {
        return Ok(None);
    }
    Ok(Some(ConflictRecord {
        kind,
        key: key.to_string(),
        file_path: Some(path.to_string()),
        message: format!(
            "path already owned by {} {}",
            owner_kind.as_str(),
            owner_key
        ),
    }))
}

pub fn epic_diffs(existing: &Epic, d: &DiscoveredEpic) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    diff_required(&mut diffs, "title", &existing.title, &d.title);
    diff_optional(&mut diffs, "description", &existing.description, &d.description);
    diff_declared(&mut diffs, "status", &existing.status, &d.status);
    diff_path(&mut diffs, &existing.file_path, &d.file_path);
    diffs
}

pub fn feature_diffs(existing: &Feature, d: &DiscoveredFeature) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    diff_required(&mut diffs, "title", &existing.title, &d.title);
    diff_optional(&mut diffs, "description", &existing.description, &d.description);
    diff_declared(&mut diffs, "status", &existing.status, &d.status);
    diff_path(&mut diffs, &existing.file_path, &d.file_path);
    diffs
}

pub fn task_diffs(existing: &Task, d: &DiscoveredTask) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    diff_required(&mut diffs, "title", &existing.title, &d.title);
    diff_optional(&mut diffs, "description", &existing.description, &d.description);
    diff_declared(&mut diffs, "status", &existing.status, &d.status);
    if let Some(priority) = d.priority {
        if existing.priority != Some(priority) {
            diffs.push(FieldDiff {
                field: "priority".to_string(),
                store_value: existing.priority.map(|p| p.to_string()),
                file_value: Some(priority.to_string()),
            });
        }
    }
    diff_path(&mut diffs, &existing.file_path, &Some(d.file_path.clone()));
    diffs
}

fn diff_required(diffs: &mut Vec<FieldDiff>, field: &str, store: &str, file: &str) {
    if store != file {
        diffs.push(FieldDiff {
            field: field.to_string(),
            store_value: Some(store.to_string()),
            file_value: Some(file.to_string()),
        });
    }
}

/// A file value of `None` means "not declared", never "clear the field".
fn diff_optional(
    diffs: &mut Vec<FieldDiff>,
    field: &str,
    store: &Option<String>,
    file: &Option<String>,
) {
    let Some(file_value) = file else {
        return;
    };
    if store.as_deref() != Some(file_value) {
        diffs.push(FieldDiff {
            field: field.to_string(),
            store_value: store.clone(),
            file_value: Some(file_value.clone()),
        });
    }
}

fn diff_declared(
    diffs: &mut Vec<FieldDiff>,
    field: &str,
    store: &str,
    file: &Option<String>,
) {
    let Some(file_value) = file else {
        return;
    };
    if store != file_value {
        diffs.push(FieldDiff {
            field: field.to_string(),
            store_value: Some(store.to_string()),
            file_value: Some(file_value.clone()),
        });
    }
}

fn diff_path(
    diffs: &mut Vec<FieldDiff>,
    store: &Option<String>,
    file: &Option<String>,
) {
    let Some(file_value) = file else {
        return;
    };
    if store.as_deref() != Some(file_value.as_str()) {
        diffs.push(FieldDiff {
            field: "file_path".to_string(),
            store_value: store.clone(),
            file_value: Some(file_value.clone()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::DEFAULT_STATUS;

    fn discovered_task() -> DiscoveredTask {
        DiscoveredTask {
            key: "T-E01-F01-001".to_string(),
            feature_key: "E01-F01".to_string(),
            slug: Some("setup".to_string()),
            title: "Setup".to_string(),
            description: None,
            status: None,
            priority: None,
            dependencies: Vec::new(),
            file_path: "E01/F01-a/T-E01-F01-001-setup.md".to_string(),
        }
    }

    fn stored_task() -> Task {
        let now = Utc::now();
        Task {
            key: "T-E01-F01-001".to_string(),
            feature_key: "E01-F01".to_string(),
            slug: Some("setup".to_string()),
            title: "Setup".to_string(),
            description: None,
            status: DEFAULT_STATUS.to_string(),
            priority: None,
            file_path: Some("E01/F01-a/T-E01-F01-001-setup.md".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn identical_entities_produce_no_diffs() {
        assert!(task_diffs(&stored_task(), &discovered_task()).is_empty());
    }

    #[test]
    fn undeclared_file_fields_are_not_diffs() {
        let mut stored = stored_task();
        stored.description = Some("store-only detail".to_string());
        stored.status = "in_progress".to_string();
        // Discovered has no description and no status: the store stands.
        assert!(task_diffs(&stored, &discovered_task()).is_empty());
    }

    #[test]
    fn declared_differences_become_field_diffs() {
        let mut d = discovered_task();
        d.title = "Setup Project".to_string();
        d.status = Some("done".to_string());
        d.priority = Some(2);

        let diffs = task_diffs(&stored_task(), &d);
        let fields: Vec<_> = diffs.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "status", "priority"]);
        assert_eq!(diffs[0].store_value.as_deref(), Some("Setup"));
        assert_eq!(diffs[0].file_value.as_deref(), Some("Setup Project"));
    }

    #[test]
    fn moved_file_is_a_path_diff() {
        let mut d = discovered_task();
        d.file_path = "E01/F01-a/moved/T-E01-F01-001-setup.md".to_string();
        let diffs = task_diffs(&stored_task(), &d);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "file_path");
    }

    #[test]
    fn classification_against_store() {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();

        let d = discovered_task();
        assert!(matches!(classify_task(&db, &d).unwrap(), Classification::New));
    }

    #[test]
    fn gated_document_keeps_the_stored_row() {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();

        crate::sync::apply::create_epic(
            &db,
            &DiscoveredEpic {
                key: "E01".to_string(),
                slug: Some("infra".to_string()),
                title: "Infrastructure Work".to_string(),
                description: None,
                status: None,
                file_path: Some("E01-infra/epic.md".to_string()),
                doc_unchanged: false,
            },
            false,
        )
        .unwrap();

        // Rescan with the document gated out: only placeholders remain.
        let rescan = DiscoveredEpic {
            key: "E01".to_string(),
            slug: Some("infra".to_string()),
            title: "Infra".to_string(),
            description: None,
            status: None,
            file_path: None,
            doc_unchanged: true,
        };
        assert!(matches!(
            classify_epic(&db, &rescan).unwrap(),
            Classification::Unchanged
        ));
    }
}
