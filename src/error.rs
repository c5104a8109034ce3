use thiserror::Error;

/// Errors raised by the discovery and synchronization engine.
///
/// The taxonomy follows how failures propagate:
///
/// - [`Error::Config`] is fatal and surfaces before any scan starts.
/// - [`Error::Parse`] is localized to one file; callers record it as a
///   warning and continue.
/// - [`Error::Conflict`] records an ownership collision; whether it is
///   resolved depends on the active strategy.
/// - [`Error::Validation`] rejects bad input before any mutation.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed pattern rule or unreadable configuration. Fatal, pre-scan.
    #[error("configuration error: {0}")]
    Config(String),

    /// A single file could not be parsed (e.g. unterminated frontmatter).
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// A key or file path is already owned by a different entity.
    #[error("conflict on {key}: {message}")]
    Conflict { key: String, message: String },

    /// Malformed key, out-of-range number, or a cyclic dependency.
    #[error("validation error: {0}")]
    Validation(String),

    /// A dependency edge would close a cycle. Carries the full cycle path.
    #[error("circular dependency: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the underlying SQLite error is a uniqueness violation.
    ///
    /// Two concurrent syncs claiming the same key or file path hit the
    /// UNIQUE constraints; that must surface as a conflict, not a crash.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
