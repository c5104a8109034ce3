//! Domain models for Waypoint.
//!
//! # Core Concepts
//!
//! ## Persisted entities
//!
//! - [`Epic`], [`Feature`], [`Task`]: the three-level hierarchy. Each carries
//!   an immutable canonical key (see [`crate::keys`]), an optional derived
//!   slug, and a nullable `file_path` linking it to its markdown document.
//!   The persisted store is the sole system of record; only the sync applier
//!   writes to it.
//! - [`EntityHistory`]: append-only log of field-level changes.
//!
//! ## Ephemeral structures
//!
//! Discovered entities (`crate::scan::DiscoveredEpic` and friends) are owned
//! by one running scan and discarded after reconciliation; they never appear
//! here.
//!
//! Workflow status is a finite vocabulary defined outside the engine.
//! Discovery treats it as opaque metadata, so it is stored as a plain string.

mod entity;
mod history;

pub use entity::*;
pub use history::*;
