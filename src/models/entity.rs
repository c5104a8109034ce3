use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status assigned to entities created without a declared status.
pub const DEFAULT_STATUS: &str = "todo";

/// Which table an entity lives in.
///
/// File-path ownership is unique across all kinds, so ownership records and
/// conflict reports carry the kind alongside the key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Epic,
    Feature,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::Task => "task",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "epic" => Some(Self::Epic),
            "feature" => Some(Self::Feature),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

/// One field-level difference between a discovered document and the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: String,
    /// Value currently persisted.
    pub store_value: Option<String>,
    /// Value discovered in the file.
    pub file_value: Option<String>,
}

/// A top-level initiative (`E##`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    /// Immutable canonical key, e.g. `E04`.
    pub key: String,
    /// Derived readability slug; regenerable when the title changes.
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    /// Workflow status; the vocabulary is external and opaque here.
    pub status: String,
    /// Path of the owning document, unique across all entity kinds.
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A deliverable under an epic (`E##-F##`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// Immutable canonical key, e.g. `E04-F01`.
    pub key: String,
    /// Parent epic key.
    pub epic_key: String,
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A unit of work under a feature (`T-E##-F##-###`).
///
/// Lookups accept canonical and slugged key forms interchangeably; the slug
/// is a readability aid, never identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Immutable canonical key without slug, e.g. `T-E04-F01-001`.
    pub key: String,
    /// Parent feature key.
    pub feature_key: String,
    pub slug: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Option<i64>,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
