mod schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};

use crate::error::{Error, Result};
use crate::keys;
use crate::models::*;

/// A per-file change marker used by the incremental sync controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub mtime: DateTime<Utc>,
    pub size: u64,
}

/// The persisted store.
///
/// All writes from the sync engine go through the per-entity transaction
/// methods here, so concurrent readers never observe a partial write. The
/// UNIQUE constraints on key and file_path are the last defense against two
/// concurrent syncs claiming the same identity; violations surface as
/// [`Error::Conflict`], never a crash.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "waypoint")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("waypoint.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Lookups
    // ============================================================

    pub fn get_epic(&self, key: &str) -> Result<Option<Epic>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT key, slug, title, description, status, file_path, created_at, updated_at
             FROM epics WHERE key = ?",
        )?;
        let mut rows = stmt.query([keys::normalize(key)])?;
        match rows.next()? {
            Some(row) => Ok(Some(Epic {
                key: row.get(0)?,
                slug: row.get(1)?,
                title: row.get(2)?,
                description: row.get(3)?,
                status: row.get(4)?,
                file_path: row.get(5)?,
                created_at: parse_datetime(row.get::<_, String>(6)?),
                updated_at: parse_datetime(row.get::<_, String>(7)?),
            })),
            None => Ok(None),
        }
    }

    pub fn get_feature(&self, key: &str) -> Result<Option<Feature>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT key, epic_key, slug, title, description, status, file_path, created_at, updated_at
             FROM features WHERE key = ?",
        )?;
        let mut rows = stmt.query([keys::normalize(key)])?;
        match rows.next()? {
            Some(row) => Ok(Some(map_feature(row)?)),
            None => Ok(None),
        }
    }

    /// Looks up a task by key. Canonical and slugged forms are equivalent:
    /// the slug is stripped before the lookup.
    pub fn get_task(&self, key: &str) -> Result<Option<Task>> {
        let canonical = keys::strip_task_slug(key);
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT key, feature_key, slug, title, description, status, priority, file_path,
                    created_at, updated_at
             FROM tasks WHERE key = ?",
        )?;
        let mut rows = stmt.query([canonical])?;
        match rows.next()? {
            Some(row) => Ok(Some(map_task(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_epics(&self) -> Result<Vec<Epic>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT key, slug, title, description, status, file_path, created_at, updated_at
             FROM epics ORDER BY key",
        )?;
        let epics = stmt
            .query_map([], |row| {
                Ok(Epic {
                    key: row.get(0)?,
                    slug: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    status: row.get(4)?,
                    file_path: row.get(5)?,
                    created_at: parse_datetime(row.get::<_, String>(6)?),
                    updated_at: parse_datetime(row.get::<_, String>(7)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(epics)
    }

    pub fn list_features(&self) -> Result<Vec<Feature>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT key, epic_key, slug, title, description, status, file_path, created_at, updated_at
             FROM features ORDER BY key",
        )?;
        let features = stmt
            .query_map([], |row| map_feature(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(features)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT key, feature_key, slug, title, description, status, priority, file_path,
                    created_at, updated_at
             FROM tasks ORDER BY key",
        )?;
        let tasks = stmt
            .query_map([], |row| map_task(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Resolves which entity, of any kind, owns a file path.
    pub fn find_path_owner(&self, file_path: &str) -> Result<Option<(EntityKind, String)>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        owner_of(&conn, file_path)
    }

    // ============================================================
    // Sync applier writes
    //
    // Each create/update is one transaction covering the entity row, the
    // file-path ownership claim, and the history append.
    // ============================================================

    pub fn create_epic(&self, epic: &Epic, force_claim: bool) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO epics (key, slug, title, description, status, file_path, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &epic.key,
                &epic.slug,
                &epic.title,
                &epic.description,
                &epic.status,
                &epic.file_path,
                epic.created_at.to_rfc3339(),
                epic.updated_at.to_rfc3339(),
            ),
        )?;
        if let Some(path) = &epic.file_path {
            claim_path(&tx, EntityKind::Epic, &epic.key, path, force_claim)?;
        }
        append_history(&tx, EntityKind::Epic, &epic.key, "created", None, Some(&epic.title))?;
        tx.commit()?;
        Ok(())
    }

    pub fn create_feature(&self, feature: &Feature, force_claim: bool) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO features (key, epic_key, slug, title, description, status, file_path,
                                   created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &feature.key,
                &feature.epic_key,
                &feature.slug,
                &feature.title,
                &feature.description,
                &feature.status,
                &feature.file_path,
                feature.created_at.to_rfc3339(),
                feature.updated_at.to_rfc3339(),
            ),
        )?;
        if let Some(path) = &feature.file_path {
            claim_path(&tx, EntityKind::Feature, &feature.key, path, force_claim)?;
        }
        append_history(
            &tx,
            EntityKind::Feature,
            &feature.key,
            "created",
            None,
            Some(&feature.title),
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn create_task(&self, task: &Task, force_claim: bool) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO tasks (key, feature_key, slug, title, description, status, priority,
                                file_path, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &task.key,
                &task.feature_key,
                &task.slug,
                &task.title,
                &task.description,
                &task.status,
                task.priority,
                &task.file_path,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ),
        )?;
        if let Some(path) = &task.file_path {
            claim_path(&tx, EntityKind::Task, &task.key, path, force_claim)?;
        }
        append_history(&tx, EntityKind::Task, &task.key, "created", None, Some(&task.title))?;
        tx.commit()?;
        Ok(())
    }

    pub fn update_epic(&self, epic: &Epic, diffs: &[FieldDiff], force_claim: bool) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE epics SET slug = ?, title = ?, description = ?, status = ?, file_path = ?,
                              updated_at = ? WHERE key = ?",
            (
                &epic.slug,
                &epic.title,
                &epic.description,
                &epic.status,
                &epic.file_path,
                epic.updated_at.to_rfc3339(),
                &epic.key,
            ),
        )?;
        reclaim_path(&tx, EntityKind::Epic, &epic.key, epic.file_path.as_deref(), force_claim)?;
        for diff in diffs {
            append_history(
                &tx,
                EntityKind::Epic,
                &epic.key,
                &diff.field,
                diff.store_value.as_deref(),
                diff.file_value.as_deref(),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn update_feature(
        &self,
        feature: &Feature,
        diffs: &[FieldDiff],
        force_claim: bool,
    ) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE features SET slug = ?, title = ?, description = ?, status = ?, file_path = ?,
                                 updated_at = ? WHERE key = ?",
            (
                &feature.slug,
                &feature.title,
                &feature.description,
                &feature.status,
                &feature.file_path,
                feature.updated_at.to_rfc3339(),
                &feature.key,
            ),
        )?;
        reclaim_path(
            &tx,
            EntityKind::Feature,
            &feature.key,
            feature.file_path.as_deref(),
            force_claim,
        )?;
        for diff in diffs {
            append_history(
                &tx,
                EntityKind::Feature,
                &feature.key,
                &diff.field,
                diff.store_value.as_deref(),
                diff.file_value.as_deref(),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn update_task(&self, task: &Task, diffs: &[FieldDiff], force_claim: bool) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE tasks SET slug = ?, title = ?, description = ?, status = ?, priority = ?,
                              file_path = ?, updated_at = ? WHERE key = ?",
            (
                &task.slug,
                &task.title,
                &task.description,
                &task.status,
                task.priority,
                &task.file_path,
                task.updated_at.to_rfc3339(),
                &task.key,
            ),
        )?;
        reclaim_path(&tx, EntityKind::Task, &task.key, task.file_path.as_deref(), force_claim)?;
        for diff in diffs {
            append_history(
                &tx,
                EntityKind::Task,
                &task.key,
                &diff.field,
                diff.store_value.as_deref(),
                diff.file_value.as_deref(),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_history(&self, kind: EntityKind, key: &str) -> Result<Vec<EntityHistory>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, entity_kind, entity_key, field, old_value, new_value, changed_at
             FROM entity_history WHERE entity_kind = ? AND entity_key = ? ORDER BY id",
        )?;
        let entries = stmt
            .query_map((kind.as_str(), keys::normalize(key)), |row| {
                Ok(EntityHistory {
                    id: row.get(0)?,
                    entity_kind: EntityKind::from_str(&row.get::<_, String>(1)?)
                        .unwrap_or(EntityKind::Task),
                    entity_key: row.get(2)?,
                    field: row.get(3)?,
                    old_value: row.get(4)?,
                    new_value: row.get(5)?,
                    changed_at: parse_datetime(row.get::<_, String>(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ============================================================
    // Task dependencies
    // ============================================================

    /// Records a validated dependency edge. Callers run cycle validation
    /// first; the primary key rejects exact duplicates.
    pub fn add_task_dependency(&self, task_key: &str, depends_on: &str) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO task_dependencies (task_key, depends_on, created_at) VALUES (?, ?, ?)",
            (
                keys::strip_task_slug(task_key),
                keys::strip_task_slug(depends_on),
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub fn list_task_dependencies(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt =
            conn.prepare("SELECT task_key, depends_on FROM task_dependencies ORDER BY task_key")?;
        let edges = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    // ============================================================
    // Sync checkpoints
    // ============================================================

    pub fn load_checkpoint(
        &self,
        root: &str,
    ) -> Result<Option<(DateTime<Utc>, HashMap<String, Fingerprint>)>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let last_sync: Option<String> = conn
            .query_row(
                "SELECT last_sync FROM sync_checkpoints WHERE root = ?",
                [root],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(last_sync) = last_sync else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT file_path, mtime, size FROM sync_fingerprints WHERE root = ?",
        )?;
        let fingerprints = stmt
            .query_map([root], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(path, mtime, size)| {
                (
                    path,
                    Fingerprint {
                        mtime: parse_datetime(mtime),
                        size: size as u64,
                    },
                )
            })
            .collect();

        Ok(Some((parse_datetime(last_sync), fingerprints)))
    }

    /// Replaces the checkpoint for a root in one transaction. Called only
    /// after a fully successful non-dry-run sync.
    pub fn save_checkpoint(
        &self,
        root: &str,
        last_sync: DateTime<Utc>,
        fingerprints: &HashMap<String, Fingerprint>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO sync_checkpoints (root, last_sync) VALUES (?, ?)
             ON CONFLICT(root) DO UPDATE SET last_sync = excluded.last_sync",
            (root, last_sync.to_rfc3339()),
        )?;
        tx.execute("DELETE FROM sync_fingerprints WHERE root = ?", [root])?;
        for (path, fp) in fingerprints {
            tx.execute(
                "INSERT INTO sync_fingerprints (root, file_path, mtime, size) VALUES (?, ?, ?, ?)",
                (root, path, fp.mtime.to_rfc3339(), fp.size as i64),
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn map_feature(row: &rusqlite::Row<'_>) -> rusqlite::Result<Feature> {
    Ok(Feature {
        key: row.get(0)?,
        epic_key: row.get(1)?,
        slug: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        file_path: row.get(6)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
        updated_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

fn map_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        key: row.get(0)?,
        feature_key: row.get(1)?,
        slug: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        priority: row.get(6)?,
        file_path: row.get(7)?,
        created_at: parse_datetime(row.get::<_, String>(8)?),
        updated_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn owner_of(conn: &Connection, file_path: &str) -> Result<Option<(EntityKind, String)>> {
    let mut stmt =
        conn.prepare("SELECT entity_kind, entity_key FROM file_owners WHERE file_path = ?")?;
    let mut rows = stmt.query([file_path])?;
    match rows.next()? {
        Some(row) => {
            let kind: String = row.get(0)?;
            let key: String = row.get(1)?;
            let kind = EntityKind::from_str(&kind).ok_or_else(|| {
                Error::Validation(format!("unknown entity kind in file_owners: {kind}"))
            })?;
            Ok(Some((kind, key)))
        }
        None => Ok(None),
    }
}

/// Claims file-path ownership inside an entity transaction.
///
/// With `force`, a prior owner is cleared first (its `file_path` nulled, a
/// history row appended) — the explicit forced-override path for
/// reassignment. Without it, an existing foreign owner is a conflict.
fn claim_path(
    tx: &Transaction<'_>,
    kind: EntityKind,
    key: &str,
    path: &str,
    force: bool,
) -> Result<()> {
    if let Some((prior_kind, prior_key)) = owner_of(tx, path)? {
        if prior_kind == kind && prior_key == key {
            return Ok(());
        }
        if !force {
            return Err(Error::Conflict {
                key: key.to_string(),
                message: format!(
                    "file path {path:?} already owned by {} {prior_key}",
                    prior_kind.as_str()
                ),
            });
        }
        let table = match prior_kind {
            EntityKind::Epic => "epics",
            EntityKind::Feature => "features",
            EntityKind::Task => "tasks",
        };
        tx.execute(
            &format!("UPDATE {table} SET file_path = NULL, updated_at = ? WHERE key = ?"),
            (Utc::now().to_rfc3339(), &prior_key),
        )?;
        tx.execute("DELETE FROM file_owners WHERE file_path = ?", [path])?;
        append_history(tx, prior_kind, &prior_key, "file_path", Some(path), None)?;
    }

    tx.execute(
        "INSERT INTO file_owners (file_path, entity_kind, entity_key) VALUES (?, ?, ?)",
        (path, kind.as_str(), key),
    )?;
    Ok(())
}

/// Re-aligns ownership after an update: releases any path this entity held
/// that differs from the new one, then claims the new path if set.
fn reclaim_path(
    tx: &Transaction<'_>,
    kind: EntityKind,
    key: &str,
    new_path: Option<&str>,
    force: bool,
) -> Result<()> {
    tx.execute(
        "DELETE FROM file_owners
         WHERE entity_kind = ? AND entity_key = ? AND file_path IS NOT ?",
        (kind.as_str(), key, new_path),
    )?;
    if let Some(path) = new_path {
        claim_path(tx, kind, key, path, force)?;
    }
    Ok(())
}

fn append_history(
    tx: &Transaction<'_>,
    kind: EntityKind,
    key: &str,
    field: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
) -> Result<()> {
    tx.execute(
        "INSERT INTO entity_history (entity_kind, entity_key, field, old_value, new_value, changed_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        (
            kind.as_str(),
            key,
            field,
            old_value,
            new_value,
            Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
