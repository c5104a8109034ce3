use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityKind;

/// An append-only log entry recording one field-level change.
///
/// History is like `git log` for an entity: it answers "what changed, when,
/// and from what sync" without being version control for document content.
/// Rows are written inside the same transaction as the change they record
/// and are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHistory {
    pub id: i64,
    pub entity_kind: EntityKind,
    pub entity_key: String,
    /// Changed field name, or `"created"` for the initial row.
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
}
