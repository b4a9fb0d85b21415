//! SQL rendering and execution shared by the unit of work and async workers.
//!
//! Table and column names come from `Entity`/`Projection` constants or from
//! validated specifications and sorts; values are always bound.

use crate::model::entity::{Entity, EntityId, ValidationError};
use crate::query::page::Sort;
use crate::query::projection::Projection;
use crate::query::spec::Specification;
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::marker::PhantomData;

fn select_list<T: Entity>() -> String {
    let mut columns = Vec::with_capacity(T::COLUMNS.len() + 1);
    columns.push("id");
    columns.extend_from_slice(T::COLUMNS);
    columns.join(", ")
}

fn where_clause<T: Entity>(spec: Option<&Specification<T>>) -> RepoResult<(String, Vec<Value>)> {
    match spec {
        Some(spec) => {
            spec.check_columns()?;
            Ok((format!(" WHERE {}", spec.clause()), spec.params().to_vec()))
        }
        None => Ok((String::new(), Vec::new())),
    }
}

pub(crate) fn insert_row<T: Entity>(conn: &Connection, values: &[Value]) -> RepoResult<EntityId> {
    let placeholders = (1..=T::COLUMNS.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            T::TABLE,
            T::COLUMNS.join(", ")
        ),
        params_from_iter(values.iter()),
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn update_row<T: Entity>(
    conn: &Connection,
    id: EntityId,
    values: &[Value],
) -> RepoResult<usize> {
    let assignments = T::COLUMNS
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{column} = ?{}", index + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let mut bound = values.to_vec();
    bound.push(Value::Integer(id));
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET {assignments} WHERE id = ?{};",
            T::TABLE,
            T::COLUMNS.len() + 1
        ),
        params_from_iter(bound),
    )?;
    Ok(changed)
}

pub(crate) fn delete_row<T: Entity>(conn: &Connection, id: EntityId) -> RepoResult<usize> {
    let changed = conn.execute(&format!("DELETE FROM {} WHERE id = ?1;", T::TABLE), [id])?;
    Ok(changed)
}

/// Deletes the rows that `T::DEPENDENTS` attach to `parent_ids`.
///
/// Returns `(table, id)` of every removed row.
pub(crate) fn delete_dependents<T: Entity>(
    conn: &Connection,
    parent_ids: &[EntityId],
) -> RepoResult<Vec<(&'static str, EntityId)>> {
    let mut removed = Vec::new();
    for &(table, column) in T::DEPENDENTS {
        let mut select = conn.prepare(&format!("SELECT id FROM {table} WHERE {column} = ?1;"))?;
        let mut delete = conn.prepare(&format!("DELETE FROM {table} WHERE {column} = ?1;"))?;
        for &parent_id in parent_ids {
            let ids = select
                .query_map([parent_id], |row| row.get::<_, EntityId>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            delete.execute([parent_id])?;
            removed.extend(ids.into_iter().map(|id| (table, id)));
        }
    }
    Ok(removed)
}

pub(crate) fn count_rows<T: Entity>(
    conn: &Connection,
    spec: Option<&Specification<T>>,
) -> RepoResult<u64> {
    let (filter, params) = where_clause(spec)?;
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}{filter};", T::TABLE),
        params_from_iter(params),
        |row| row.get(0),
    )?;
    u64::try_from(count).map_err(|_| RepoError::InvalidData(format!("negative count {count}")))
}

pub(crate) fn select_ids<T: Entity>(
    conn: &Connection,
    spec: &Specification<T>,
) -> RepoResult<Vec<EntityId>> {
    let (filter, params) = where_clause(Some(spec))?;
    let mut stmt = conn.prepare(&format!("SELECT id FROM {}{filter};", T::TABLE))?;
    let ids = stmt
        .query_map(params_from_iter(params), |row| row.get::<_, EntityId>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub(crate) fn delete_rows<T: Entity>(
    conn: &Connection,
    spec: &Specification<T>,
) -> RepoResult<usize> {
    let (filter, params) = where_clause(Some(spec))?;
    let changed = conn.execute(
        &format!("DELETE FROM {}{filter};", T::TABLE),
        params_from_iter(params),
    )?;
    Ok(changed)
}

pub(crate) fn fetch_projection<P: Projection>(
    conn: &Connection,
    spec: Option<&Specification<P::Source>>,
    sort: &Sort,
) -> RepoResult<Vec<P>> {
    if let Some(column) = P::COLUMNS
        .iter()
        .find(|column| !<P::Source as Entity>::is_mapped_property(column))
    {
        return Err(RepoError::Validation(ValidationError::UnknownProperty {
            entity: <P::Source as Entity>::TABLE,
            property: (*column).to_string(),
        }));
    }

    let (filter, params) = where_clause(spec)?;
    let order_by = sort.to_order_by::<P::Source>()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {}{filter}{order_by};",
        P::COLUMNS.join(", "),
        <P::Source as Entity>::TABLE
    ))?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(P::from_row(row)?);
    }
    Ok(out)
}

/// Fully rendered, validated `SELECT` for entity `T`.
///
/// Owns its SQL and parameters so it can move to a worker thread.
pub(crate) struct SelectQuery<T> {
    sql: String,
    params: Vec<Value>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SelectQuery<T> {
    pub(crate) fn new(
        spec: Option<&Specification<T>>,
        sort: &Sort,
        window: Option<(u32, u64)>,
    ) -> RepoResult<Self> {
        let (filter, mut params) = where_clause(spec)?;
        let order_by = sort.to_order_by::<T>()?;
        let mut sql = format!(
            "SELECT {} FROM {}{filter}{order_by}",
            select_list::<T>(),
            T::TABLE
        );
        if let Some((limit, offset)) = window {
            let offset = i64::try_from(offset)
                .map_err(|_| RepoError::InvalidState(format!("page offset {offset} overflows")))?;
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(i64::from(limit)));
            params.push(Value::Integer(offset));
        }
        Ok(Self {
            sql,
            params,
            _entity: PhantomData,
        })
    }

    pub(crate) fn by_id(id: EntityId) -> Self {
        Self {
            sql: format!("SELECT {} FROM {} WHERE id = ?", select_list::<T>(), T::TABLE),
            params: vec![Value::Integer(id)],
            _entity: PhantomData,
        }
    }

    pub(crate) fn fetch(&self, conn: &Connection) -> RepoResult<Vec<T>> {
        let mut stmt = conn.prepare(&self.sql)?;
        let mut rows = stmt.query(params_from_iter(self.params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(T::from_row(row)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::SelectQuery;
    use crate::model::comment::Comment;
    use crate::query::page::Sort;
    use crate::query::spec::Specification;

    #[test]
    fn select_query_renders_filter_order_and_window() {
        let spec = Specification::<Comment>::contains_ignore_case("comment", "spring");
        let query = SelectQuery::new(Some(&spec), &Sort::desc("up"), Some((10, 20))).unwrap();

        assert_eq!(
            query.sql,
            "SELECT id, comment, up, down, best, post_id FROM comments \
             WHERE instr(unicode_lower(comment), unicode_lower(?)) > 0 ORDER BY up DESC, id ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(query.params.len(), 3);
    }
}
