//! Repository layer: unit of work, generic repository and concrete repositories.
//!
//! # Responsibility
//! - Track managed entities per unit of work and synchronize them to SQLite.
//! - Offer a reusable CRUD capability set (`Repository`) that concrete
//!   repositories extend with type-specific queries.
//!
//! # Invariants
//! - Write paths call `Entity::validate()` before SQL mutations.
//! - Lookups report absence as `None`; `NotFound` is reserved for writes that
//!   target a missing row.

use crate::db::DbError;
use crate::event::EventError;
use crate::model::entity::{EntityId, ValidationError};
use std::cell::{BorrowError, BorrowMutError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod account_repo;
pub mod comment_repo;
pub mod generic_repo;
pub mod post_repo;
mod sql;
pub mod unit_of_work;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Storage(DbError),
    NotFound {
        entity: &'static str,
        id: EntityId,
    },
    InvalidData(String),
    InvalidState(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    Event(EventError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::Storage(err) => write!(f, "storage failure: {err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} row not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::Event(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Event(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Storage(value)
    }
}

impl From<EventError> for RepoError {
    fn from(value: EventError) -> Self {
        Self::Event(value)
    }
}

/// Constraint failures are input problems; everything else is storage.
impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &value {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                let detail = message.clone().unwrap_or_else(|| failure.to_string());
                return Self::Validation(ValidationError::ConstraintViolation(detail));
            }
        }
        Self::Storage(DbError::Sqlite(value))
    }
}

impl From<BorrowError> for RepoError {
    fn from(_: BorrowError) -> Self {
        Self::InvalidState("entity is mutably borrowed elsewhere".to_string())
    }
}

impl From<BorrowMutError> for RepoError {
    fn from(_: BorrowMutError) -> Self {
        Self::InvalidState("entity is borrowed elsewhere".to_string())
    }
}
