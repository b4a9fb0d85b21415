//! Account and study repositories.
//!
//! # Invariants
//! - Saving an account re-points `owner_id` of every study in its collection.
//!   Studies themselves are saved separately.
//! - Duplicate usernames surface as `ValidationError::ConstraintViolation`.

use crate::model::account::{Account, AccountId, Study};
use crate::model::entity::EntityRef;
use crate::query::spec::Specification;
use crate::repo::generic_repo::Repository;
use crate::repo::unit_of_work::UnitOfWork;
use crate::repo::RepoResult;

pub struct AccountRepository<'uow> {
    uow: &'uow UnitOfWork,
}

impl<'uow> AccountRepository<'uow> {
    pub fn new(uow: &'uow UnitOfWork) -> Self {
        Self { uow }
    }

    pub fn find_by_username(&self, username: &str) -> RepoResult<Option<EntityRef<Account>>> {
        self.find_one_matching(&Specification::eq("username", username.to_string()))
    }
}

impl Repository<Account> for AccountRepository<'_> {
    fn unit_of_work(&self) -> &UnitOfWork {
        self.uow
    }

    fn save(&self, account: &EntityRef<Account>) -> RepoResult<EntityRef<Account>> {
        let managed = self.uow.save(account)?;
        let owner_id = managed.try_borrow()?.id;
        for study in account.try_borrow()?.studies() {
            study.try_borrow_mut()?.owner_id = owner_id;
        }
        Ok(managed)
    }
}

pub struct StudyRepository<'uow> {
    uow: &'uow UnitOfWork,
}

impl<'uow> StudyRepository<'uow> {
    pub fn new(uow: &'uow UnitOfWork) -> Self {
        Self { uow }
    }

    pub fn find_by_owner(&self, owner_id: AccountId) -> RepoResult<Vec<EntityRef<Study>>> {
        self.find_all_matching(&Specification::eq("owner_id", owner_id))
    }
}

impl Repository<Study> for StudyRepository<'_> {
    fn unit_of_work(&self) -> &UnitOfWork {
        self.uow
    }
}
