//! Database module for pamwatch.
//!
//! Provides append-only SQLite storage for health snapshots with embedded
//! migrations.

mod models;
mod store;

pub use models::*;
pub use store::*;
