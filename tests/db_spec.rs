use chrono::Utc;
use speculate2::speculate;
use waypoint::db::Database;
use waypoint::models::*;

fn epic(key: &str) -> Epic {
    let now = Utc::now();
    Epic {
        key: key.to_string(),
        slug: Some("payments".to_string()),
        title: "Payments".to_string(),
        description: None,
        status: DEFAULT_STATUS.to_string(),
        file_path: Some(format!("{key}-payments/epic.md")),
        created_at: now,
        updated_at: now,
    }
}

fn feature(key: &str, epic_key: &str) -> Feature {
    let now = Utc::now();
    Feature {
        key: key.to_string(),
        epic_key: epic_key.to_string(),
        slug: None,
        title: "Checkout".to_string(),
        description: None,
        status: DEFAULT_STATUS.to_string(),
        file_path: None,
        created_at: now,
        updated_at: now,
    }
}

fn task(key: &str, feature_key: &str, file_path: &str) -> Task {
    let now = Utc::now();
    Task {
        key: key.to_string(),
        feature_key: feature_key.to_string(),
        slug: None,
        title: "Add card form".to_string(),
        description: None,
        status: DEFAULT_STATUS.to_string(),
        priority: None,
        file_path: Some(file_path.to_string()),
        created_at: now,
        updated_at: now,
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "entities" {
        it "creates and fetches the full hierarchy" {
            db.create_epic(&epic("E01"), false).expect("create epic");
            db.create_feature(&feature("E01-F01", "E01"), false).expect("create feature");
            db.create_task(&task("T-E01-F01-001", "E01-F01", "a.md"), false).expect("create task");

            assert_eq!(db.get_epic("E01").unwrap().unwrap().title, "Payments");
            assert_eq!(db.get_feature("E01-F01").unwrap().unwrap().epic_key, "E01");
            assert_eq!(db.get_task("T-E01-F01-001").unwrap().unwrap().feature_key, "E01-F01");
        }

        it "rejects children of missing parents" {
            let err = db.create_feature(&feature("E09-F01", "E09"), false).unwrap_err();
            assert!(err.is_constraint_violation());
        }

        it "looks up tasks by slugged key form" {
            db.create_epic(&epic("E01"), false).unwrap();
            db.create_feature(&feature("E01-F01", "E01"), false).unwrap();
            db.create_task(&task("T-E01-F01-001", "E01-F01", "a.md"), false).unwrap();

            let found = db.get_task("T-E01-F01-001-add-card-form").unwrap();
            assert_eq!(found.unwrap().key, "T-E01-F01-001");
        }

        it "rejects duplicate keys" {
            db.create_epic(&epic("E01"), false).unwrap();
            let mut other = epic("E01");
            other.file_path = Some("elsewhere/epic.md".to_string());
            let err = db.create_epic(&other, false).unwrap_err();
            assert!(err.is_constraint_violation());
        }
    }

    describe "path ownership" {
        before {
            db.create_epic(&epic("E01"), false).unwrap();
        }

        it "records the owner on create" {
            let owner = db.find_path_owner("E01-payments/epic.md").unwrap();
            assert_eq!(owner, Some((EntityKind::Epic, "E01".to_string())));
        }

        it "refuses a claim on an owned path without force" {
            let mut intruder = epic("E02");
            intruder.file_path = Some("E01-payments/epic.md".to_string());
            let err = db.create_epic(&intruder, false).unwrap_err();
            assert!(matches!(err, waypoint::Error::Conflict { .. }));
        }

        it "reassigns ownership with force and clears the prior owner" {
            let mut intruder = epic("E02");
            intruder.file_path = Some("E01-payments/epic.md".to_string());
            db.create_epic(&intruder, true).expect("forced claim");

            let owner = db.find_path_owner("E01-payments/epic.md").unwrap();
            assert_eq!(owner, Some((EntityKind::Epic, "E02".to_string())));
            assert!(db.get_epic("E01").unwrap().unwrap().file_path.is_none());
        }

        it "enforces uniqueness across entity kinds" {
            db.create_feature(&feature("E01-F01", "E01"), false).unwrap();
            let mut t = task("T-E01-F01-001", "E01-F01", "E01-payments/epic.md");
            t.file_path = Some("E01-payments/epic.md".to_string());
            let err = db.create_task(&t, false).unwrap_err();
            assert!(matches!(err, waypoint::Error::Conflict { .. }));
        }
    }

    describe "history" {
        it "appends one row per changed field on update" {
            db.create_epic(&epic("E01"), false).unwrap();
            let mut updated = db.get_epic("E01").unwrap().unwrap();
            updated.title = "Payments v2".to_string();
            updated.status = "in_progress".to_string();

            let diffs = vec![
                FieldDiff {
                    field: "title".to_string(),
                    store_value: Some("Payments".to_string()),
                    file_value: Some("Payments v2".to_string()),
                },
                FieldDiff {
                    field: "status".to_string(),
                    store_value: Some(DEFAULT_STATUS.to_string()),
                    file_value: Some("in_progress".to_string()),
                },
            ];
            db.update_epic(&updated, &diffs, false).unwrap();

            let history = db.get_history(EntityKind::Epic, "E01").unwrap();
            let fields: Vec<_> = history.iter().map(|h| h.field.as_str()).collect();
            assert!(fields.contains(&"title"));
            assert!(fields.contains(&"status"));
        }
    }

    describe "dependencies" {
        before {
            db.create_epic(&epic("E01"), false).unwrap();
            db.create_feature(&feature("E01-F01", "E01"), false).unwrap();
            db.create_task(&task("T-E01-F01-001", "E01-F01", "a.md"), false).unwrap();
            db.create_task(&task("T-E01-F01-002", "E01-F01", "b.md"), false).unwrap();
        }

        it "persists and lists edges" {
            db.add_task_dependency("T-E01-F01-002", "T-E01-F01-001").unwrap();
            let edges = db.list_task_dependencies().unwrap();
            assert_eq!(edges, vec![("T-E01-F01-002".to_string(), "T-E01-F01-001".to_string())]);
        }

        it "rejects a duplicate edge" {
            db.add_task_dependency("T-E01-F01-002", "T-E01-F01-001").unwrap();
            let err = db.add_task_dependency("T-E01-F01-002", "T-E01-F01-001").unwrap_err();
            assert!(err.is_constraint_violation());
        }
    }

    describe "checkpoints" {
        it "returns None for an unknown root" {
            assert!(db.load_checkpoint("/nowhere").unwrap().is_none());
        }

        it "replaces the fingerprint set on save" {
            let mut fps = std::collections::HashMap::new();
            fps.insert("a.md".to_string(), waypoint::db::Fingerprint {
                mtime: Utc::now(),
                size: 10,
            });
            db.save_checkpoint("/docs", Utc::now(), &fps).unwrap();

            let mut next = std::collections::HashMap::new();
            next.insert("b.md".to_string(), waypoint::db::Fingerprint {
                mtime: Utc::now(),
                size: 20,
            });
            db.save_checkpoint("/docs", Utc::now(), &next).unwrap();

            let (_, loaded) = db.load_checkpoint("/docs").unwrap().unwrap();
            assert_eq!(loaded.len(), 1);
            assert!(loaded.contains_key("b.md"));
        }
    }
}
