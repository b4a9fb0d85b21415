//! Comment repository: body search, vote filters, projections and the
//! background search variant.

use crate::db::DbError;
use crate::model::comment::{Comment, CommentId};
use crate::model::entity::EntityRef;
use crate::model::post::{Post, PostId};
use crate::query::handle::QueryHandle;
use crate::query::page::{Page, PageRequest, Sort};
use crate::query::projection::Projection;
use crate::query::spec::Specification;
use crate::repo::generic_repo::Repository;
use crate::repo::sql::SelectQuery;
use crate::repo::unit_of_work::UnitOfWork;
use crate::repo::RepoResult;

/// Minimum up-votes for a comment to count as good.
pub const GOOD_COMMENT_MIN_UP: u32 = 10;

pub struct CommentRepository<'uow> {
    uow: &'uow UnitOfWork,
}

/// A comment loaded together with its post.
#[derive(Debug, Clone)]
pub struct CommentWithPost {
    pub comment: EntityRef<Comment>,
    pub post: Option<EntityRef<Post>>,
}

impl<'uow> CommentRepository<'uow> {
    pub fn new(uow: &'uow UnitOfWork) -> Self {
        Self { uow }
    }

    pub fn find_by_comment_contains(&self, keyword: &str) -> RepoResult<Vec<EntityRef<Comment>>> {
        self.find_all_matching(&Specification::contains("comment", keyword))
    }

    pub fn find_by_comment_contains_ignore_case(
        &self,
        keyword: &str,
        request: &PageRequest,
    ) -> RepoResult<Page<EntityRef<Comment>>> {
        let spec = Specification::contains_ignore_case("comment", keyword);
        self.uow.find_page(Some(&spec), request)
    }

    /// Runs the case-insensitive body search on a worker thread.
    ///
    /// Pending changes are flushed first so the worker sees them. Results are
    /// detached values; the identity map is not touched from the worker.
    ///
    /// # Errors
    /// - Flush and query-building failures are returned immediately.
    /// - Query failures surface through the handle.
    pub fn find_by_comment_contains_ignore_case_async(
        &self,
        keyword: &str,
        request: &PageRequest,
    ) -> RepoResult<QueryHandle<Vec<Comment>>> {
        self.uow.flush()?;
        let spec = Specification::contains_ignore_case("comment", keyword);
        let query = SelectQuery::new(Some(&spec), request.sort(), Some(request.window()?))?;
        let conn = self.uow.shared_connection();

        Ok(QueryHandle::spawn("comments_by_body", move || {
            let guard = conn.lock().map_err(|_| DbError::ConnectionPoisoned)?;
            query.fetch(&guard)
        }))
    }

    pub fn find_by_up_greater_than_and_post(
        &self,
        up: u32,
        post_id: PostId,
        request: &PageRequest,
    ) -> RepoResult<Page<EntityRef<Comment>>> {
        let spec = Specification::gt("up", up).and(Specification::eq("post_id", post_id));
        self.uow.find_page(Some(&spec), request)
    }

    /// Reads the comments of one post as closed projection `P`.
    pub fn find_by_post_id<P>(&self, post_id: PostId) -> RepoResult<Vec<P>>
    where
        P: Projection<Source = Comment>,
    {
        let spec = Specification::eq("post_id", post_id);
        self.uow.find_projection(Some(&spec), &Sort::unsorted())
    }

    /// Loads a comment and its post in one call.
    pub fn get_by_id_with_post(&self, id: CommentId) -> RepoResult<Option<CommentWithPost>> {
        let Some(comment) = self.uow.find::<Comment>(id)? else {
            return Ok(None);
        };
        let post_id = comment.try_borrow()?.post_id;
        let post = match post_id {
            Some(post_id) => self.uow.find::<Post>(post_id)?,
            None => None,
        };
        Ok(Some(CommentWithPost { comment, post }))
    }
}

impl Repository<Comment> for CommentRepository<'_> {
    fn unit_of_work(&self) -> &UnitOfWork {
        self.uow
    }
}

/// Reusable comment predicates.
pub struct CommentSpecs;

impl CommentSpecs {
    pub fn is_best() -> Specification<Comment> {
        Specification::is_true("best")
    }

    pub fn is_good() -> Specification<Comment> {
        Specification::ge("up", GOOD_COMMENT_MIN_UP)
    }
}
