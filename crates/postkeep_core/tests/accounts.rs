use postkeep_core::{
    open_db_in_memory, share, Account, AccountRepository, EntityRef, RepoError, Repository,
    Study, StudyRepository, UnitOfWork, ValidationError,
};

fn begin() -> UnitOfWork {
    UnitOfWork::begin(share(open_db_in_memory().unwrap())).unwrap()
}

#[test]
fn duplicate_username_is_a_constraint_violation() {
    let uow = begin();
    let accounts = AccountRepository::new(&uow);
    accounts
        .save(&EntityRef::new(Account::new("freelife", "hibernate")))
        .unwrap();

    let err = accounts
        .save(&EntityRef::new(Account::new("freelife", "other")))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::ConstraintViolation(_))
    ));
    assert_eq!(accounts.count().unwrap(), 1);
}

#[test]
fn invalid_username_is_rejected() {
    let uow = begin();
    let accounts = AccountRepository::new(&uow);
    let err = accounts
        .save(&EntityRef::new(Account::new("a b", "pw")))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::InvalidUsername(_))
    ));
}

#[test]
fn find_by_username() {
    let uow = begin();
    let accounts = AccountRepository::new(&uow);
    let saved = accounts
        .save(&EntityRef::new(Account::new("freelife", "hibernate")))
        .unwrap();

    let found = accounts.find_by_username("freelife").unwrap().unwrap();
    assert!(found.same_instance(&saved));
    assert!(accounts.find_by_username("nobody").unwrap().is_none());
}

#[test]
fn saving_account_points_studies_at_owner() {
    let uow = begin();
    let accounts = AccountRepository::new(&uow);
    let studies = StudyRepository::new(&uow);

    let study = studies
        .save(&EntityRef::new(Study::new("Spring Data JPA")))
        .unwrap();
    assert_eq!(study.borrow().owner_id, None);

    let account = EntityRef::new(Account::new("freelife", "hibernate"));
    Account::add_study(&account, &study);
    accounts.save(&account).unwrap();

    let owner_id = account.borrow().id.unwrap();
    assert_eq!(study.borrow().owner_id, Some(owner_id));

    let owned = studies.find_by_owner(owner_id).unwrap();
    assert_eq!(owned.len(), 1);
    assert!(owned[0].same_instance(&study));
}

#[test]
fn account_save_does_not_cascade_to_transient_studies() {
    let uow = begin();
    let accounts = AccountRepository::new(&uow);
    let studies = StudyRepository::new(&uow);

    let account = EntityRef::new(Account::new("freelife", "hibernate"));
    Account::add_study(&account, &EntityRef::new(Study::new("unsaved")));
    accounts.save(&account).unwrap();

    assert_eq!(studies.count().unwrap(), 0);
}
