//! Unit of work: the explicit persistence context.
//!
//! # Responsibility
//! - Own one SQLite transaction and the identity map of entities managed
//!   inside it.
//! - Turn `save` into insert-or-merge, detect dirty entities, and write them
//!   back on flush.
//!
//! # Invariants
//! - At most one managed handle exists per `(table, id)`.
//! - `contains` is reference identity against that handle, never id equality.
//! - Every read flushes pending changes first, so mutations of managed
//!   entities are visible to the next query.
//! - Dropping an unfinished unit of work rolls its transaction back.

use crate::db::migrations::{current_version, latest_version};
use crate::db::{DbError, SharedConnection};
use crate::model::entity::{Entity, EntityId, EntityRef};
use crate::query::page::{Page, PageRequest, Sort};
use crate::query::projection::Projection;
use crate::query::spec::Specification;
use crate::repo::sql::{self, SelectQuery};
use crate::repo::{RepoError, RepoResult};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EntityKey {
    table: &'static str,
    id: EntityId,
}

impl EntityKey {
    fn of<T: Entity>(id: EntityId) -> Self {
        Self { table: T::TABLE, id }
    }
}

trait ManagedEntry {
    fn as_any(&self) -> &dyn Any;
    /// Writes the entity when it differs from the last synchronized state.
    fn flush(&mut self, conn: &Connection) -> RepoResult<bool>;
}

struct Tracked<T> {
    id: EntityId,
    handle: EntityRef<T>,
    snapshot: Vec<Value>,
}

impl<T: Entity> ManagedEntry for Tracked<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn flush(&mut self, conn: &Connection) -> RepoResult<bool> {
        let values = {
            let entity = self.handle.try_borrow().map_err(|_| {
                RepoError::InvalidState(format!(
                    "{}#{} is mutably borrowed during flush",
                    T::TABLE,
                    self.id
                ))
            })?;
            let values = entity.to_values();
            if values == self.snapshot {
                return Ok(false);
            }
            entity.validate()?;
            values
        };

        if sql::update_row::<T>(conn, self.id, &values)? == 0 {
            return Err(RepoError::NotFound {
                entity: T::TABLE,
                id: self.id,
            });
        }
        self.snapshot = values;
        Ok(true)
    }
}

/// Persistence context bound to one transaction on a shared connection.
///
/// Not `Send`: managed handles are single-threaded. Run one unit of work per
/// connection at a time.
pub struct UnitOfWork {
    id: Uuid,
    conn: SharedConnection,
    identity_map: RefCell<BTreeMap<EntityKey, Box<dyn ManagedEntry>>>,
    active: Cell<bool>,
}

impl UnitOfWork {
    /// Starts a unit of work and its transaction.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema is not at the latest version.
    /// - `InvalidState` when the connection already has an open transaction.
    pub fn begin(conn: SharedConnection) -> RepoResult<Self> {
        let id = Uuid::new_v4();
        {
            let guard = conn.lock().map_err(|_| DbError::ConnectionPoisoned)?;
            let expected_version = latest_version();
            let actual_version = current_version(&guard)?;
            if actual_version != expected_version {
                return Err(RepoError::UninitializedConnection {
                    expected_version,
                    actual_version,
                });
            }
            if !guard.is_autocommit() {
                return Err(RepoError::InvalidState(
                    "connection already has an open transaction".to_string(),
                ));
            }
            guard.execute_batch("BEGIN;")?;
        }

        info!("event=uow_begin module=repo status=ok uow_id={id}");
        Ok(Self {
            id,
            conn,
            identity_map: RefCell::new(BTreeMap::new()),
            active: Cell::new(true),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of entities currently managed.
    pub fn managed_count(&self) -> usize {
        self.identity_map.borrow().len()
    }

    /// Inserts a transient entity or merges a detached one.
    ///
    /// Returns the managed handle: the input itself for inserts, the managed
    /// copy for merges. A merged input does not become managed.
    pub fn save<T: Entity>(&self, entity: &EntityRef<T>) -> RepoResult<EntityRef<T>> {
        let id = entity.try_borrow()?.id();
        match id {
            None => {
                self.persist(entity)?;
                Ok(entity.clone())
            }
            Some(id) => self.merge(entity, id),
        }
    }

    fn persist<T: Entity>(&self, entity: &EntityRef<T>) -> RepoResult<EntityId> {
        let values = {
            let current = entity.try_borrow()?;
            current.validate()?;
            current.to_values()
        };

        let id = self.with_conn(|conn| sql::insert_row::<T>(conn, &values))?;
        entity.try_borrow_mut()?.set_id(id);
        self.track(id, entity.clone(), values);

        debug!(
            "event=entity_persist module=repo status=ok uow_id={} entity={} id={id}",
            self.id,
            T::TABLE
        );
        Ok(id)
    }

    fn merge<T: Entity>(&self, entity: &EntityRef<T>, id: EntityId) -> RepoResult<EntityRef<T>> {
        if self.contains(entity) {
            return Ok(entity.clone());
        }
        entity.try_borrow()?.validate()?;

        let managed = self.find::<T>(id)?.ok_or(RepoError::NotFound {
            entity: T::TABLE,
            id,
        })?;
        managed.try_borrow_mut()?.merge_from(&*entity.try_borrow()?);

        debug!(
            "event=entity_merge module=repo status=ok uow_id={} entity={} id={id}",
            self.id,
            T::TABLE
        );
        Ok(managed)
    }

    /// Looks up one entity; the managed handle wins over the stored row.
    pub fn find<T: Entity>(&self, id: EntityId) -> RepoResult<Option<EntityRef<T>>> {
        if let Some(handle) = self.managed::<T>(id)? {
            return Ok(Some(handle));
        }
        let query = SelectQuery::<T>::by_id(id);
        let mut rows = self.with_conn(|conn| query.fetch(conn))?;
        rows.pop().map(|entity| self.attach(entity)).transpose()
    }

    pub fn find_all<T: Entity>(&self) -> RepoResult<Vec<EntityRef<T>>> {
        self.find_matching(None, &Sort::unsorted())
    }

    pub fn find_all_sorted<T: Entity>(&self, sort: &Sort) -> RepoResult<Vec<EntityRef<T>>> {
        self.find_matching(None, sort)
    }

    pub fn find_matching<T: Entity>(
        &self,
        spec: Option<&Specification<T>>,
        sort: &Sort,
    ) -> RepoResult<Vec<EntityRef<T>>> {
        let query = SelectQuery::new(spec, sort, None)?;
        self.fetch(&query)
    }

    pub fn find_page<T: Entity>(
        &self,
        spec: Option<&Specification<T>>,
        request: &PageRequest,
    ) -> RepoResult<Page<EntityRef<T>>> {
        let query = SelectQuery::new(spec, request.sort(), Some(request.window()?))?;
        let total = self.count_matching(spec)?;
        let content = self.fetch(&query)?;
        Ok(Page::new(content, request, total))
    }

    /// Reads a closed projection. Results are plain values, not managed.
    pub fn find_projection<P: Projection>(
        &self,
        spec: Option<&Specification<P::Source>>,
        sort: &Sort,
    ) -> RepoResult<Vec<P>> {
        self.flush()?;
        self.with_conn(|conn| sql::fetch_projection::<P>(conn, spec, sort))
    }

    pub fn count<T: Entity>(&self) -> RepoResult<u64> {
        self.count_matching::<T>(None)
    }

    pub fn count_matching<T: Entity>(&self, spec: Option<&Specification<T>>) -> RepoResult<u64> {
        self.flush()?;
        self.with_conn(|conn| sql::count_rows(conn, spec))
    }

    /// Whether this exact handle is the managed instance for its identity.
    pub fn contains<T: Entity>(&self, entity: &EntityRef<T>) -> bool {
        self.identity_map
            .borrow()
            .range(EntityKey::of::<T>(EntityId::MIN)..=EntityKey::of::<T>(EntityId::MAX))
            .filter_map(|(_, entry)| entry.as_any().downcast_ref::<Tracked<T>>())
            .any(|tracked| tracked.handle.same_instance(entity))
    }

    /// Deletes the entity's row and stops managing it.
    ///
    /// Rows listed by `T::DEPENDENTS` are deleted first and their handles
    /// evicted. Transient entities are ignored.
    pub fn delete<T: Entity>(&self, entity: &EntityRef<T>) -> RepoResult<()> {
        let id = entity.try_borrow()?.id();
        let Some(id) = id else {
            debug!(
                "event=entity_delete module=repo status=skipped uow_id={} entity={} reason=transient",
                self.id,
                T::TABLE
            );
            return Ok(());
        };

        self.flush()?;
        let (removed, dependents) = self.with_conn(|conn| {
            let dependents = sql::delete_dependents::<T>(conn, &[id])?;
            let removed = sql::delete_row::<T>(conn, id)?;
            Ok((removed, dependents))
        })?;
        self.evict::<T>(&[id], &dependents);

        debug!(
            "event=entity_delete module=repo status=ok uow_id={} entity={} id={id} removed={removed} dependents_removed={}",
            self.id,
            T::TABLE,
            dependents.len()
        );
        Ok(())
    }

    /// Deletes every row matching `spec`, plus their dependents, and evicts
    /// the affected handles.
    pub fn delete_matching<T: Entity>(&self, spec: &Specification<T>) -> RepoResult<usize> {
        self.flush()?;
        let (ids, dependents, removed) = self.with_conn(|conn| {
            let ids = sql::select_ids(conn, spec)?;
            let dependents = sql::delete_dependents::<T>(conn, &ids)?;
            let removed = sql::delete_rows(conn, spec)?;
            Ok((ids, dependents, removed))
        })?;
        self.evict::<T>(&ids, &dependents);
        Ok(removed)
    }

    /// Writes every dirty managed entity.
    ///
    /// # Errors
    /// - `Validation` when a dirty entity no longer validates.
    /// - `Storage` when SQLite rejects the write.
    pub fn flush(&self) -> RepoResult<()> {
        let mut map = self.identity_map.borrow_mut();
        if map.is_empty() {
            return Ok(());
        }

        let guard = self.conn.lock().map_err(|_| DbError::ConnectionPoisoned)?;
        let mut written = 0_usize;
        for (key, entry) in map.iter_mut() {
            match entry.flush(&guard) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(err) => {
                    error!(
                        "event=uow_flush module=repo status=error uow_id={} entity={} id={} error={err}",
                        self.id, key.table, key.id
                    );
                    return Err(err);
                }
            }
        }

        if written > 0 {
            debug!(
                "event=uow_flush module=repo status=ok uow_id={} written={written}",
                self.id
            );
        }
        Ok(())
    }

    /// Stops managing `entity` without touching storage.
    pub fn detach<T: Entity>(&self, entity: &EntityRef<T>) -> bool {
        let mut map = self.identity_map.borrow_mut();
        let key = map
            .iter()
            .filter(|(key, _)| key.table == T::TABLE)
            .find(|(_, entry)| {
                entry
                    .as_any()
                    .downcast_ref::<Tracked<T>>()
                    .is_some_and(|tracked| tracked.handle.same_instance(entity))
            })
            .map(|(key, _)| *key);
        key.is_some_and(|key| map.remove(&key).is_some())
    }

    /// Detaches everything. Unflushed changes are dropped.
    pub fn clear(&self) {
        self.identity_map.borrow_mut().clear();
    }

    pub fn commit(self) -> RepoResult<()> {
        self.flush()?;
        self.with_conn(|conn| {
            conn.execute_batch("COMMIT;")?;
            Ok(())
        })?;
        self.active.set(false);
        self.clear();

        info!("event=uow_commit module=repo status=ok uow_id={}", self.id);
        Ok(())
    }

    pub fn rollback(self) -> RepoResult<()> {
        self.active.set(false);
        self.clear();
        self.with_conn(|conn| {
            conn.execute_batch("ROLLBACK;")?;
            Ok(())
        })?;

        info!("event=uow_rollback module=repo status=ok uow_id={}", self.id);
        Ok(())
    }

    pub(crate) fn managed<T: Entity>(&self, id: EntityId) -> RepoResult<Option<EntityRef<T>>> {
        let map = self.identity_map.borrow();
        let Some(entry) = map.get(&EntityKey::of::<T>(id)) else {
            return Ok(None);
        };
        entry
            .as_any()
            .downcast_ref::<Tracked<T>>()
            .map(|tracked| Some(tracked.handle.clone()))
            .ok_or_else(|| {
                RepoError::InvalidState(format!("{}#{id} is tracked with another type", T::TABLE))
            })
    }

    pub(crate) fn fetch<T: Entity>(&self, query: &SelectQuery<T>) -> RepoResult<Vec<EntityRef<T>>> {
        self.flush()?;
        let rows = self.with_conn(|conn| query.fetch(conn))?;
        rows.into_iter().map(|entity| self.attach(entity)).collect()
    }

    pub(crate) fn shared_connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }

    /// Returns the managed handle for a loaded row, registering it if new.
    ///
    /// An already managed handle keeps its in-memory state.
    fn attach<T: Entity>(&self, entity: T) -> RepoResult<EntityRef<T>> {
        let id = entity
            .id()
            .ok_or_else(|| RepoError::InvalidData(format!("{} row without id", T::TABLE)))?;
        if let Some(handle) = self.managed::<T>(id)? {
            return Ok(handle);
        }
        let snapshot = entity.to_values();
        let handle = EntityRef::new(entity);
        self.track(id, handle.clone(), snapshot);
        Ok(handle)
    }

    fn evict<T: Entity>(&self, ids: &[EntityId], dependents: &[(&'static str, EntityId)]) {
        let mut map = self.identity_map.borrow_mut();
        for &id in ids {
            map.remove(&EntityKey::of::<T>(id));
        }
        for &(table, id) in dependents {
            map.remove(&EntityKey { table, id });
        }
    }

    fn track<T: Entity>(&self, id: EntityId, handle: EntityRef<T>, snapshot: Vec<Value>) {
        self.identity_map.borrow_mut().insert(
            EntityKey::of::<T>(id),
            Box::new(Tracked {
                id,
                handle,
                snapshot,
            }),
        );
    }

    fn with_conn<R, F>(&self, f: F) -> RepoResult<R>
    where
        F: FnOnce(&Connection) -> RepoResult<R>,
    {
        let guard = self.conn.lock().map_err(|_| DbError::ConnectionPoisoned)?;
        f(&guard)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.active.get() {
            return;
        }
        self.identity_map.get_mut().clear();

        let Ok(conn) = self.conn.lock() else {
            warn!(
                "event=uow_rollback module=repo status=error uow_id={} reason=dropped error=connection_poisoned",
                self.id
            );
            return;
        };
        if conn.is_autocommit() {
            return;
        }
        match conn.execute_batch("ROLLBACK;") {
            Ok(()) => warn!(
                "event=uow_rollback module=repo status=ok uow_id={} reason=dropped",
                self.id
            ),
            Err(err) => warn!(
                "event=uow_rollback module=repo status=error uow_id={} reason=dropped error={err}",
                self.id
            ),
        }
    }
}
