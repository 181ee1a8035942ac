//! Database module: row models and SQL repositories.
//!
//! - `model`: view models returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! Callers import from `headline_enricher::db`; the repository API and the
//! commonly used models are re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{BatchWrite, LabelCount, StoredHeadline, WindowStats};
