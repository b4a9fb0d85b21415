//! Composable filter predicates.

use crate::db::UNICODE_LOWER_FN;
use crate::model::entity::{Entity, ValidationError};
use rusqlite::types::Value;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

/// A `WHERE` predicate over entity `T` with its bound parameters.
///
/// Placeholders are positional (`?`), so combining two specifications keeps
/// parameters in clause order.
pub struct Specification<T> {
    clause: String,
    params: Vec<Value>,
    columns: Vec<&'static str>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Specification<T> {
    fn leaf(column: &'static str, clause: String, params: Vec<Value>) -> Self {
        Self {
            clause,
            params,
            columns: vec![column],
            _entity: PhantomData,
        }
    }

    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self::leaf(column, format!("{column} = ?"), vec![value.into()])
    }

    pub fn gt(column: &'static str, value: impl Into<Value>) -> Self {
        Self::leaf(column, format!("{column} > ?"), vec![value.into()])
    }

    pub fn ge(column: &'static str, value: impl Into<Value>) -> Self {
        Self::leaf(column, format!("{column} >= ?"), vec![value.into()])
    }

    pub fn is_true(column: &'static str) -> Self {
        Self::leaf(column, format!("{column} = 1"), Vec::new())
    }

    pub fn is_null(column: &'static str) -> Self {
        Self::leaf(column, format!("{column} IS NULL"), Vec::new())
    }

    /// Case-sensitive substring match.
    pub fn contains(column: &'static str, needle: &str) -> Self {
        Self::leaf(
            column,
            format!("instr({column}, ?) > 0"),
            vec![Value::Text(needle.to_string())],
        )
    }

    /// Case-insensitive substring match, folding Unicode letters.
    ///
    /// Relies on `unicode_lower`, which `db::open_*` registers on every
    /// connection it returns.
    pub fn contains_ignore_case(column: &'static str, needle: &str) -> Self {
        Self::leaf(
            column,
            format!("instr({UNICODE_LOWER_FN}({column}), {UNICODE_LOWER_FN}(?)) > 0"),
            vec![Value::Text(needle.to_string())],
        )
    }

    /// Case-sensitive prefix match.
    pub fn starts_with(column: &'static str, prefix: &str) -> Self {
        let len = i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX);
        Self::leaf(
            column,
            format!("substr({column}, 1, ?) = ?"),
            vec![Value::Integer(len), Value::Text(prefix.to_string())],
        )
    }

    pub fn and(self, other: Self) -> Self {
        self.combine("AND", other)
    }

    pub fn or(self, other: Self) -> Self {
        self.combine("OR", other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self {
            clause: format!("NOT ({})", self.clause),
            ..self
        }
    }

    fn combine(mut self, op: &str, other: Self) -> Self {
        self.clause = format!("({}) {op} ({})", self.clause, other.clause);
        self.params.extend(other.params);
        self.columns.extend(other.columns);
        self
    }

    /// Rejects predicates that reference columns `T` does not map.
    pub(crate) fn check_columns(&self) -> Result<(), ValidationError> {
        match self
            .columns
            .iter()
            .find(|column| !T::is_mapped_property(column))
        {
            Some(column) => Err(ValidationError::UnknownProperty {
                entity: T::TABLE,
                property: (*column).to_string(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn clause(&self) -> &str {
        &self.clause
    }

    pub(crate) fn params(&self) -> &[Value] {
        &self.params
    }
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            clause: self.clause.clone(),
            params: self.params.clone(),
            columns: self.columns.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> Debug for Specification<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Specification")
            .field("clause", &self.clause)
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Specification;
    use crate::model::comment::Comment;
    use crate::model::entity::ValidationError;
    use rusqlite::types::Value;

    #[test]
    fn combined_clause_keeps_parameter_order() {
        let spec = Specification::<Comment>::ge("up", 10_i64)
            .and(Specification::is_true("best"))
            .or(Specification::contains("comment", "jpa"));

        assert_eq!(
            spec.clause(),
            "((up >= ?) AND (best = 1)) OR (instr(comment, ?) > 0)"
        );
        assert_eq!(
            spec.params(),
            &[Value::Integer(10), Value::Text("jpa".to_string())]
        );
        assert!(spec.check_columns().is_ok());
    }

    #[test]
    fn starts_with_binds_length_and_prefix() {
        let spec = Specification::<Comment>::starts_with("comment", "Spr");
        assert_eq!(spec.clause(), "substr(comment, 1, ?) = ?");
        assert_eq!(spec.params()[0], Value::Integer(3));
    }

    #[test]
    fn unmapped_column_is_rejected() {
        let spec = Specification::<Comment>::not(Specification::is_null("likes"));
        assert_eq!(
            spec.check_columns(),
            Err(ValidationError::UnknownProperty {
                entity: "comments",
                property: "likes".to_string()
            })
        );
    }
}
