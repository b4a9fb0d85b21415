//! Account and Study entities.
//!
//! # Invariants
//! - `username` matches `^[A-Za-z0-9_.-]{3,32}$` and is unique in storage.
//! - Studies in `Account::studies` point back through `owner_id` once the
//!   account has an identity.

use crate::model::entity::{require_text, Entity, EntityId, EntityRef, ValidationError};
use crate::repo::RepoError;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub type AccountId = EntityId;
pub type StudyId = EntityId;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,32}$").expect("valid username regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<AccountId>,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip)]
    studies: Vec<EntityRef<Study>>,
}

impl Account {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn studies(&self) -> &[EntityRef<Study>] {
        &self.studies
    }

    /// Links `study` to `account` on both sides. No-op when already linked.
    pub fn add_study(account: &EntityRef<Account>, study: &EntityRef<Study>) {
        let mut owner = account.borrow_mut();
        if owner.studies.iter().any(|held| held.same_instance(study)) {
            return;
        }
        study.borrow_mut().owner_id = owner.id;
        owner.studies.push(study.clone());
    }

    /// Unlinks `study` from `account` on both sides. Returns whether it was linked.
    pub fn remove_study(account: &EntityRef<Account>, study: &EntityRef<Study>) -> bool {
        let mut owner = account.borrow_mut();
        let before = owner.studies.len();
        owner.studies.retain(|held| !held.same_instance(study));
        if owner.studies.len() == before {
            return false;
        }
        let mut child = study.borrow_mut();
        if child.owner_id == owner.id {
            child.owner_id = None;
        }
        true
    }
}

impl Entity for Account {
    const TABLE: &'static str = "accounts";
    const COLUMNS: &'static [&'static str] = &["username", "password"];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if !USERNAME_RE.is_match(&self.username) {
            return Err(ValidationError::InvalidUsername(self.username.clone()));
        }
        require_text(Self::TABLE, "password", &self.password, 255)
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.username.clone()),
            Value::Text(self.password.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, RepoError> {
        let account = Self {
            id: Some(row.get("id")?),
            username: row.get("username")?,
            password: row.get("password")?,
            studies: Vec::new(),
        };
        account
            .validate()
            .map_err(|err| RepoError::InvalidData(format!("accounts row: {err}")))?;
        Ok(account)
    }

    fn merge_from(&mut self, other: &Self) {
        self.username.clone_from(&other.username);
        self.password.clone_from(&other.password);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Study {
    pub id: Option<StudyId>,
    pub name: String,
    pub owner_id: Option<AccountId>,
}

impl Study {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Study {
    const TABLE: &'static str = "studies";
    const COLUMNS: &'static [&'static str] = &["name", "owner_id"];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text(Self::TABLE, "name", &self.name, 255)
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            self.owner_id.map_or(Value::Null, Value::Integer),
        ]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, RepoError> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            owner_id: row.get("owner_id")?,
        })
    }

    fn merge_from(&mut self, other: &Self) {
        self.name.clone_from(&other.name);
        self.owner_id = other.owner_id;
    }
}
