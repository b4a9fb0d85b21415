//! Entity contract and shared entity handles.
//!
//! # Responsibility
//! - Describe how an entity maps onto one table (`Entity`).
//! - Provide the handle type whose allocation identity is what a unit of
//!   work tracks (`EntityRef`).
//!
//! # Invariants
//! - `to_values()` yields exactly one value per entry of `COLUMNS`, in order.
//! - Two handles are the same instance iff they share one allocation.

use rusqlite::types::Value;
use rusqlite::Row;
use std::cell::{BorrowError, BorrowMutError, Ref, RefCell, RefMut};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// Store-assigned identity shared by every entity type.
pub type EntityId = i64;

/// Input rejected before it reaches storage, or a constraint the store refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField {
        entity: &'static str,
        field: &'static str,
    },
    TooLong {
        entity: &'static str,
        field: &'static str,
        max_chars: usize,
    },
    InvalidUsername(String),
    /// Sort or filter references a column the entity does not map.
    UnknownProperty {
        entity: &'static str,
        property: String,
    },
    InvalidPageSize(u32),
    ConstraintViolation(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField { entity, field } => write!(f, "{entity}.{field} must not be empty"),
            Self::TooLong {
                entity,
                field,
                max_chars,
            } => write!(f, "{entity}.{field} exceeds {max_chars} characters"),
            Self::InvalidUsername(value) => write!(f, "invalid username `{value}`"),
            Self::UnknownProperty { entity, property } => {
                write!(f, "unknown property `{property}` on {entity}")
            }
            Self::InvalidPageSize(size) => write!(f, "page size must be positive, got {size}"),
            Self::ConstraintViolation(message) => write!(f, "constraint violation: {message}"),
        }
    }
}

impl Error for ValidationError {}

/// Checks a required text field: trimmed non-empty and at most `max_chars`.
pub fn require_text(
    entity: &'static str,
    field: &'static str,
    value: &str,
    max_chars: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { entity, field });
    }
    if value.chars().count() > max_chars {
        return Err(ValidationError::TooLong {
            entity,
            field,
            max_chars,
        });
    }
    Ok(())
}

/// Table mapping for a persistent type.
pub trait Entity: Sized + 'static {
    /// Backing table. Also used as the entity name in errors and logs.
    const TABLE: &'static str;
    /// Persistent columns, excluding the `id` primary key.
    const COLUMNS: &'static [&'static str];
    /// Rows owned by this entity, as `(table, foreign key column)`.
    ///
    /// Deleting the entity deletes those rows and evicts their handles.
    const DEPENDENTS: &'static [(&'static str, &'static str)] = &[];

    fn id(&self) -> Option<EntityId>;
    fn set_id(&mut self, id: EntityId);
    fn validate(&self) -> Result<(), ValidationError>;
    fn to_values(&self) -> Vec<Value>;
    /// Builds an instance from a row selected as `id, COLUMNS...`.
    fn from_row(row: &Row<'_>) -> Result<Self, crate::repo::RepoError>;
    /// Copies persistent state from `other`, leaving identity untouched.
    fn merge_from(&mut self, other: &Self);

    fn is_mapped_property(property: &str) -> bool {
        property == "id" || Self::COLUMNS.contains(&property)
    }
}

/// Shared handle to an entity instance.
///
/// Cloning the handle does not clone the entity; it yields another pointer to
/// the same instance. Use `detached()` for an independent copy.
pub struct EntityRef<T>(Rc<RefCell<T>>);

impl<T> EntityRef<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// # Panics
    /// Panics when the entity is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    /// # Panics
    /// Panics when the entity is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    pub fn try_borrow(&self) -> Result<Ref<'_, T>, BorrowError> {
        self.0.try_borrow()
    }

    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>, BorrowMutError> {
        self.0.try_borrow_mut()
    }

    pub fn same_instance(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns a copy of the current state that is not tied to this handle.
    pub fn detached(&self) -> T
    where
        T: Clone,
    {
        self.0.borrow().clone()
    }
}

impl<T> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Debug> Debug for EntityRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.try_borrow() {
            Ok(value) => f.debug_tuple("EntityRef").field(&*value).finish(),
            Err(_) => f.write_str("EntityRef(<borrowed>)"),
        }
    }
}

impl<T: Default> Default for EntityRef<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::{require_text, EntityRef, ValidationError};

    #[test]
    fn clones_share_one_instance() {
        let first = EntityRef::new(String::from("a"));
        let second = first.clone();
        let other = EntityRef::new(String::from("a"));

        second.borrow_mut().push('b');
        assert_eq!(*first.borrow(), "ab");
        assert!(first.same_instance(&second));
        assert!(!first.same_instance(&other));
    }

    #[test]
    fn detached_copy_does_not_follow_the_handle() {
        let handle = EntityRef::new(vec![1, 2]);
        let copy = handle.detached();
        handle.borrow_mut().push(3);
        assert_eq!(copy, vec![1, 2]);
    }

    #[test]
    fn require_text_rejects_blank_and_long_values() {
        assert_eq!(
            require_text("posts", "title", "  ", 10),
            Err(ValidationError::EmptyField {
                entity: "posts",
                field: "title"
            })
        );
        assert!(matches!(
            require_text("posts", "title", "abcdef", 3),
            Err(ValidationError::TooLong { max_chars: 3, .. })
        ));
        assert!(require_text("posts", "title", "ok", 3).is_ok());
    }
}
