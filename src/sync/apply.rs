//! Writes discovered entities into the store.
//!
//! Each function is one entity, one transaction (the database layer wraps
//! the row write, path claim, and history append together). Updates merge
//! declared file values onto the existing row; fields the file does not
//! declare keep their stored values.

use chrono::Utc;

use crate::db::Database;
use crate::error::Result;
use crate::models::{Epic, Feature, FieldDiff, Task, DEFAULT_STATUS};
use crate::scan::{DiscoveredEpic, DiscoveredFeature, DiscoveredTask};
use crate::slug;

pub fn create_epic(db: &Database, d: &DiscoveredEpic, force_claim: bool) -> Result<()> {
    let now = Utc::now();
    let epic = Epic {
        key: d.key.clone(),
        slug: effective_slug(&d.slug, &d.title),
        title: d.title.clone(),
        description: d.description.clone(),
        status: d.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        file_path: d.file_path.clone(),
        created_at: now,
        updated_at: now,
    };
    db.create_epic(&epic, force_claim)
}

pub fn create_feature(db: &Database, d: &DiscoveredFeature, force_claim: bool) -> Result<()> {
    let now = Utc::now();
    let feature = Feature {
        key: d.key.clone(),
        epic_key: d.epic_key.clone(),
        slug: effective_slug(&d.slug, &d.title),
        title: d.title.clone(),
        description: d.description.clone(),
        status: d.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        file_path: d.file_path.clone(),
        created_at: now,
        updated_at: now,
    };
    db.create_feature(&feature, force_claim)
}

pub fn create_task(db: &Database, d: &DiscoveredTask, force_claim: bool) -> Result<()> {
    let now = Utc::now();
    let task = Task {
        key: d.key.clone(),
        feature_key: d.feature_key.clone(),
        slug: effective_slug(&d.slug, &d.title),
        title: d.title.clone(),
        description: d.description.clone(),
        status: d.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        priority: d.priority,
        file_path: Some(d.file_path.clone()),
        created_at: now,
        updated_at: now,
    };
    db.create_task(&task, force_claim)
}

pub fn update_epic(
    db: &Database,
    existing: Epic,
    d: &DiscoveredEpic,
    diffs: &[FieldDiff],
    force_claim: bool,
) -> Result<()> {
    let mut epic = existing;
    epic.title = d.title.clone();
    if d.description.is_some() {
        epic.description = d.description.clone();
    }
    if let Some(status) = &d.status {
        epic.status = status.clone();
    }
    if d.file_path.is_some() {
        epic.file_path = d.file_path.clone();
    }
    if d.slug.is_some() {
        epic.slug = d.slug.clone();
    }
    epic.updated_at = Utc::now();
    db.update_epic(&epic, diffs, force_claim)
}

pub fn update_feature(
    db: &Database,
    existing: Feature,
    d: &DiscoveredFeature,
    diffs: &[FieldDiff],
    force_claim: bool,
) -> Result<()> {
    let mut feature = existing;
    feature.title = d.title.clone();
    if d.description.is_some() {
        feature.description = d.description.clone();
    }
    if let Some(status) = &d.status {
        feature.status = status.clone();
    }
    if d.file_path.is_some() {
        feature.file_path = d.file_path.clone();
    }
    if d.slug.is_some() {
        feature.slug = d.slug.clone();
    }
    feature.updated_at = Utc::now();
    db.update_feature(&feature, diffs, force_claim)
}

pub fn update_task(
    db: &Database,
    existing: Task,
    d: &DiscoveredTask,
    diffs: &[FieldDiff],
    force_claim: bool,
) -> Result<()> {
    let mut task = existing;
    task.title = d.title.clone();
    if d.description.is_some() {
        task.description = d.description.clone();
    }
    if let Some(status) = &d.status {
        task.status = status.clone();
    }
    if d.priority.is_some() {
        task.priority = d.priority;
    }
    task.file_path = Some(d.file_path.clone());
    if d.slug.is_some() {
        task.slug = d.slug.clone();
    }
    task.updated_at = Utc::now();
    db.update_task(&task, diffs, force_claim)
}

/// Captured slug when the layout provides one, derived from title otherwise.
fn effective_slug(captured: &Option<String>, title: &str) -> Option<String> {
    if let Some(s) = captured {
        return Some(s.clone());
    }
    let generated = slug::generate(title);
    if generated.is_empty() {
        None
    } else {
        Some(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn seed_parents(db: &Database) {
        create_epic(
            db,
            &DiscoveredEpic {
                key: "E01".to_string(),
                slug: None,
                title: "Infra".to_string(),
                description: None,
                status: None,
                file_path: None,
                doc_unchanged: false,
            },
            false,
        )
        .unwrap();
        create_feature(
            db,
            &DiscoveredFeature {
                key: "E01-F01".to_string(),
                epic_key: "E01".to_string(),
                slug: Some("ci".to_string()),
                title: "CI".to_string(),
                description: None,
                status: None,
                file_path: None,
                doc_unchanged: false,
            },
            false,
        )
        .unwrap();
    }

    fn discovered_task() -> DiscoveredTask {
        DiscoveredTask {
            key: "T-E01-F01-001".to_string(),
            feature_key: "E01-F01".to_string(),
            slug: None,
            title: "Wire Up Runners".to_string(),
            description: Some("Provision build runners.".to_string()),
            status: None,
            priority: None,
            dependencies: Vec::new(),
            file_path: "E01/F01-ci/T-E01-F01-001-wire-up-runners.md".to_string(),
        }
    }

    #[test]
    fn create_fills_defaults_and_generates_slug() {
        let db = db();
        seed_parents(&db);
        create_task(&db, &discovered_task(), false).unwrap();

        let task = db.get_task("T-E01-F01-001").unwrap().unwrap();
        assert_eq!(task.status, DEFAULT_STATUS);
        assert_eq!(task.slug.as_deref(), Some("wire-up-runners"));
        assert_eq!(
            db.find_path_owner("E01/F01-ci/T-E01-F01-001-wire-up-runners.md")
                .unwrap()
                .map(|(_, k)| k)
                .as_deref(),
            Some("T-E01-F01-001")
        );
    }

    #[test]
    fn update_keeps_undeclared_store_fields() {
        let db = db();
        seed_parents(&db);
        create_task(&db, &discovered_task(), false).unwrap();

        let existing = db.get_task("T-E01-F01-001").unwrap().unwrap();
        let mut d = discovered_task();
        d.title = "Wire Up Runners v2".to_string();
        d.description = None; // undeclared, store value must survive

        let diffs = crate::sync::reconcile::task_diffs(&existing, &d);
        update_task(&db, existing, &d, &diffs, false).unwrap();

        let task = db.get_task("T-E01-F01-001").unwrap().unwrap();
        assert_eq!(task.title, "Wire Up Runners v2");
        assert_eq!(
            task.description.as_deref(),
            Some("Provision build runners.")
        );
    }

    #[test]
    fn update_records_history_per_diff() {
        let db = db();
        seed_parents(&db);
        create_task(&db, &discovered_task(), false).unwrap();

        let existing = db.get_task("T-E01-F01-001").unwrap().unwrap();
        let mut d = discovered_task();
        d.status = Some("in_progress".to_string());
        let diffs = crate::sync::reconcile::task_diffs(&existing, &d);
        assert_eq!(diffs.len(), 1);
        update_task(&db, existing, &d, &diffs, false).unwrap();

        let history = db
            .get_history(crate::models::EntityKind::Task, "T-E01-F01-001")
            .unwrap();
        assert!(history
            .iter()
            .any(|h| h.field == "status" && h.new_value.as_deref() == Some("in_progress")));
    }
}
