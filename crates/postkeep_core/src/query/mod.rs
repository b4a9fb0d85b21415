//! Explicit query building blocks used by repositories.
//!
//! # Responsibility
//! - Compose filter predicates (`Specification`) with bound parameters.
//! - Describe ordering and pagination (`Sort`, `PageRequest`, `Page`).
//! - Map closed projections and carry async query results.
//!
//! # Invariants
//! - Column names reach SQL only after being checked against the entity's
//!   mapped columns.
//! - User-supplied values are always bound, never interpolated.

pub mod handle;
pub mod page;
pub mod projection;
pub mod spec;
