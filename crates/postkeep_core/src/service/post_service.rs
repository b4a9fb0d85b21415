//! Post use-case service.
//!
//! # Responsibility
//! - Provide stable entry points for writing, commenting on, publishing and
//!   removing posts.
//! - Delegate persistence to the post and comment repositories.
//!
//! # Invariants
//! - Service APIs never bypass repository cascade or event-delivery rules.

use crate::event::DomainEventBus;
use crate::model::comment::{Comment, CommentSummary};
use crate::model::entity::EntityRef;
use crate::model::post::{Post, PostId};
use crate::repo::comment_repo::CommentRepository;
use crate::repo::generic_repo::Repository;
use crate::repo::post_repo::PostRepository;
use crate::repo::unit_of_work::UnitOfWork;
use crate::repo::RepoResult;
use std::sync::Arc;

/// Use-case service over posts and their comments.
pub struct PostService<'uow> {
    posts: PostRepository<'uow>,
    comments: CommentRepository<'uow>,
}

impl<'uow> PostService<'uow> {
    /// Creates a service bound to one unit of work.
    ///
    /// Without a bus, publication events are dropped after save.
    pub fn new(uow: &'uow UnitOfWork, events: Option<Arc<DomainEventBus>>) -> Self {
        let posts = match events {
            Some(bus) => PostRepository::with_events(uow, bus),
            None => PostRepository::new(uow),
        };
        Self {
            posts,
            comments: CommentRepository::new(uow),
        }
    }

    pub fn posts(&self) -> &PostRepository<'uow> {
        &self.posts
    }

    pub fn comments(&self) -> &CommentRepository<'uow> {
        &self.comments
    }

    /// Creates and saves a post.
    pub fn write_post(&self, title: impl Into<String>) -> RepoResult<EntityRef<Post>> {
        let post = EntityRef::new(Post::new(title));
        self.posts.save(&post)
    }

    /// Adds a comment with the given votes and saves it through the post.
    ///
    /// # Contract
    /// - The comment's `post_id` points at `post` after the call.
    /// - Returns the managed comment handle.
    pub fn comment_on(
        &self,
        post: &EntityRef<Post>,
        body: impl Into<String>,
        up: u32,
        down: u32,
    ) -> RepoResult<EntityRef<Comment>> {
        let comment = EntityRef::new(Comment::new(body).with_votes(up, down));
        Post::add_comment(post, &comment);
        self.posts.save(post)?;
        Ok(comment)
    }

    /// Marks the post as published and saves it, delivering the event.
    pub fn publish(&self, post: &EntityRef<Post>) -> RepoResult<EntityRef<Post>> {
        post.try_borrow_mut()?.publish();
        self.posts.save(post)
    }

    /// Deletes the post and every comment it owns.
    pub fn remove(&self, post: &EntityRef<Post>) -> RepoResult<()> {
        self.posts.delete(post)
    }

    /// Body and votes of each comment on the post.
    pub fn summaries(&self, post_id: PostId) -> RepoResult<Vec<CommentSummary>> {
        self.comments.find_by_post_id::<CommentSummary>(post_id)
    }
}
