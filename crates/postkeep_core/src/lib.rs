//! Core domain logic for postkeep.
//!
//! Posts with comments and accounts with studies, persisted to SQLite through
//! an explicit unit of work, plus a synchronous domain event bus.

pub mod config;
pub mod db;
pub mod event;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig, DatabaseLocation};
pub use db::{open_configured, open_db, open_db_in_memory, share, DbError, SharedConnection};
pub use event::{DomainEvent, DomainEventBus, EventError, PostListener, SubscriptionId};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::account::{Account, AccountId, Study, StudyId};
pub use model::comment::{Comment, CommentId, CommentOnly, CommentSummary};
pub use model::entity::{Entity, EntityId, EntityRef, ValidationError};
pub use model::post::{Post, PostId, PostPublishedEvent};
pub use query::handle::QueryHandle;
pub use query::page::{Direction, Order, Page, PageRequest, Sort};
pub use query::projection::Projection;
pub use query::spec::Specification;
pub use repo::account_repo::{AccountRepository, StudyRepository};
pub use repo::comment_repo::{CommentRepository, CommentSpecs, CommentWithPost};
pub use repo::generic_repo::{Repository, SqliteRepository};
pub use repo::post_repo::PostRepository;
pub use repo::unit_of_work::UnitOfWork;
pub use repo::{RepoError, RepoResult};
pub use service::post_service::PostService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
