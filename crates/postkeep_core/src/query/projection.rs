//! Closed projections: read-only views over a subset of an entity's columns.

use crate::model::entity::Entity;
use crate::repo::RepoError;
use rusqlite::Row;

/// Read model selected from `Source`'s table without identity tracking.
pub trait Projection: Sized {
    type Source: Entity;
    /// Columns to select. Each must be mapped by `Source`.
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &Row<'_>) -> Result<Self, RepoError>;
}
