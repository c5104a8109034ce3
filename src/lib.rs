//! Discovery and synchronization engine for a hierarchical task tracker.
//!
//! Work is organized as epics, features, and tasks. The canonical record
//! lives in SQLite; a markdown documentation tree mirrors the same structure
//! on disk. Both sides are mutable, so this crate discovers entities from
//! the tree with configurable filename patterns, reconciles them against the
//! store, and applies changes under an explicit conflict strategy.

pub mod db;
pub mod error;
pub mod extract;
pub mod graph;
pub mod keys;
pub mod models;
pub mod patterns;
pub mod scan;
pub mod slug;
pub mod sync;

pub use error::{Error, Result};
