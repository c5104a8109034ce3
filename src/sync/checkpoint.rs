//! Incremental sync state.
//!
//! A checkpoint records, per documentation root, when the last successful
//! sync finished and the fingerprint (mtime + size) of every file whose
//! content that sync settled in the store. The next run skips files whose
//! fingerprint is unchanged. Files that ended in a conflict, error, or
//! strategy skip are left out so they are re-read. Checkpoints only ever
//! advance after a successful non-dry-run sync, so an aborted run
//! re-examines everything it touched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::db::{Database, Fingerprint};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub last_sync: DateTime<Utc>,
    /// Root-relative file path -> fingerprint at last sync.
    pub fingerprints: HashMap<String, Fingerprint>,
}

impl Checkpoint {
    pub fn load(db: &Database, root: &str) -> Result<Option<Self>> {
        Ok(db.load_checkpoint(root)?.map(|(last_sync, fingerprints)| Self {
            last_sync,
            fingerprints,
        }))
    }

    /// True when the file was seen last sync with the same mtime and size.
    ///
    /// Equality, not ordering: a restored backup with an older mtime is a
    /// change and must be re-read.
    pub fn is_unchanged(&self, path: &str, current: &Fingerprint) -> bool {
        self.fingerprints
            .get(path)
            .map(|prev| prev.mtime == current.mtime && prev.size == current.size)
            .unwrap_or(false)
    }

    /// Fingerprint carried forward for a file the scan skipped as unchanged.
    pub fn carry_forward(&self, path: &str) -> Option<Fingerprint> {
        self.fingerprints.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(secs: i64, size: u64) -> Fingerprint {
        Fingerprint {
            mtime: DateTime::from_timestamp(secs, 0).unwrap(),
            size,
        }
    }

    fn checkpoint() -> Checkpoint {
        let mut fingerprints = HashMap::new();
        fingerprints.insert("a.md".to_string(), fp(100, 10));
        Checkpoint {
            last_sync: DateTime::from_timestamp(200, 0).unwrap(),
            fingerprints,
        }
    }

    #[test]
    fn unchanged_requires_identical_mtime_and_size() {
        let cp = checkpoint();
        assert!(cp.is_unchanged("a.md", &fp(100, 10)));
        assert!(!cp.is_unchanged("a.md", &fp(101, 10)));
        assert!(!cp.is_unchanged("a.md", &fp(100, 11)));
        // Older mtime is still a change.
        assert!(!cp.is_unchanged("a.md", &fp(99, 10)));
    }

    #[test]
    fn unknown_files_are_never_unchanged() {
        assert!(!checkpoint().is_unchanged("new.md", &fp(100, 10)));
    }

    #[test]
    fn round_trips_through_the_database() {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();

        assert!(Checkpoint::load(&db, "/docs").unwrap().is_none());

        let cp = checkpoint();
        db.save_checkpoint("/docs", cp.last_sync, &cp.fingerprints)
            .unwrap();

        let loaded = Checkpoint::load(&db, "/docs").unwrap().unwrap();
        assert_eq!(loaded.last_sync, cp.last_sync);
        assert_eq!(loaded.fingerprints.len(), 1);
        assert!(loaded.is_unchanged("a.md", &fp(100, 10)));
    }
}
