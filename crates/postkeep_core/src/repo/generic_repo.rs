//! Generic repository contract.
//!
//! # Responsibility
//! - Define the CRUD capability set shared by every entity type.
//! - Keep persistence behind the unit of work so concrete repositories only
//!   add type-specific queries or cascade rules.

use crate::model::entity::{Entity, EntityId, EntityRef};
use crate::query::page::{Page, PageRequest, Sort};
use crate::query::spec::Specification;
use crate::repo::unit_of_work::UnitOfWork;
use crate::repo::{RepoError, RepoResult};
use std::marker::PhantomData;

/// CRUD over entity `T` inside one unit of work.
///
/// Every method has a default implementation; implementors provide the unit
/// of work and override what needs cascading.
pub trait Repository<T: Entity> {
    fn unit_of_work(&self) -> &UnitOfWork;

    /// Inserts a transient entity or merges a detached one.
    ///
    /// # Contract
    /// - Transient input: gets an id and becomes managed; the input handle is
    ///   returned.
    /// - Input with an id: state is copied onto the managed instance, which is
    ///   returned. The input itself stays unmanaged.
    fn save(&self, entity: &EntityRef<T>) -> RepoResult<EntityRef<T>> {
        self.unit_of_work().save(entity)
    }

    fn find_all(&self) -> RepoResult<Vec<EntityRef<T>>> {
        self.unit_of_work().find_all()
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<EntityRef<T>>> {
        self.unit_of_work().find_all_sorted(sort)
    }

    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<EntityRef<T>>> {
        self.unit_of_work().find_page(None, request)
    }

    /// Absence is `Ok(None)`, never an error.
    fn find_by_id(&self, id: EntityId) -> RepoResult<Option<EntityRef<T>>> {
        self.unit_of_work().find(id)
    }

    fn exists_by_id(&self, id: EntityId) -> RepoResult<bool> {
        let spec = Specification::<T>::eq("id", id);
        Ok(self.unit_of_work().count_matching(Some(&spec))? > 0)
    }

    fn count(&self) -> RepoResult<u64> {
        self.unit_of_work().count::<T>()
    }

    /// Whether this exact handle is managed.
    fn contains(&self, entity: &EntityRef<T>) -> bool {
        self.unit_of_work().contains(entity)
    }

    fn delete(&self, entity: &EntityRef<T>) -> RepoResult<()> {
        self.unit_of_work().delete(entity)
    }

    fn flush(&self) -> RepoResult<()> {
        self.unit_of_work().flush()
    }

    fn find_all_matching(&self, spec: &Specification<T>) -> RepoResult<Vec<EntityRef<T>>> {
        self.unit_of_work().find_matching(Some(spec), &Sort::unsorted())
    }

    /// # Errors
    /// - `InvalidState` when more than one row matches.
    fn find_one_matching(&self, spec: &Specification<T>) -> RepoResult<Option<EntityRef<T>>> {
        let mut found = self.find_all_matching(spec)?;
        if found.len() > 1 {
            return Err(RepoError::InvalidState(format!(
                "expected at most one {} row, found {}",
                T::TABLE,
                found.len()
            )));
        }
        Ok(found.pop())
    }

    fn count_matching(&self, spec: &Specification<T>) -> RepoResult<u64> {
        self.unit_of_work().count_matching(Some(spec))
    }
}

/// Plain repository with no type-specific behavior.
pub struct SqliteRepository<'uow, T> {
    uow: &'uow UnitOfWork,
    _entity: PhantomData<fn() -> T>,
}

impl<'uow, T: Entity> SqliteRepository<'uow, T> {
    pub fn new(uow: &'uow UnitOfWork) -> Self {
        Self {
            uow,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> for SqliteRepository<'_, T> {
    fn unit_of_work(&self) -> &UnitOfWork {
        self.uow
    }
}
