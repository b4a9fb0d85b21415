//! Post repository: cascades to comments and delivers post events.
//!
//! # Invariants
//! - Saving a post saves every comment in its collection that still belongs
//!   to it and points their `post_id` at the saved post.
//! - A comment whose `post_id` names another post is dropped from the
//!   collection instead of being pulled back.
//! - Deleting a post deletes its comment rows and evicts their handles
//!   (done by the unit of work for every `Post::DEPENDENTS` table).
//! - Queued domain events are published only after the post and its
//!   comments were written.

use crate::event::DomainEventBus;
use crate::model::comment::Comment;
use crate::model::entity::EntityRef;
use crate::model::post::{Post, PostId};
use crate::query::page::{Page, PageRequest, Sort};
use crate::query::spec::Specification;
use crate::repo::generic_repo::Repository;
use crate::repo::unit_of_work::UnitOfWork;
use crate::repo::RepoResult;
use log::debug;
use std::sync::Arc;

pub struct PostRepository<'uow> {
    uow: &'uow UnitOfWork,
    events: Option<Arc<DomainEventBus>>,
}

impl<'uow> PostRepository<'uow> {
    /// Repository without an event bus. Queued events are dropped on save.
    pub fn new(uow: &'uow UnitOfWork) -> Self {
        Self { uow, events: None }
    }

    pub fn with_events(uow: &'uow UnitOfWork, events: Arc<DomainEventBus>) -> Self {
        Self {
            uow,
            events: Some(events),
        }
    }

    pub fn find_by_title_starts_with(&self, prefix: &str) -> RepoResult<Vec<EntityRef<Post>>> {
        self.find_all_matching(&Specification::starts_with("title", prefix))
    }

    pub fn find_by_title(&self, title: &str, sort: &Sort) -> RepoResult<Vec<EntityRef<Post>>> {
        let spec = Specification::eq("title", title.to_string());
        self.uow.find_matching(Some(&spec), sort)
    }

    pub fn find_by_title_contains(
        &self,
        keyword: &str,
        request: &PageRequest,
    ) -> RepoResult<Page<EntityRef<Post>>> {
        let spec = Specification::contains("title", keyword);
        self.uow.find_page(Some(&spec), request)
    }

    pub fn count_by_title_contains(&self, keyword: &str) -> RepoResult<u64> {
        self.count_matching(&Specification::contains("title", keyword))
    }

    /// Fills the post's comment collection from storage and returns it.
    ///
    /// Comments already in the collection are kept; stored ones are added
    /// through their managed handles.
    pub fn load_comments(&self, post: &EntityRef<Post>) -> RepoResult<Vec<EntityRef<Comment>>> {
        let post_id = post.try_borrow()?.id;
        if let Some(post_id) = post_id {
            let spec = Specification::<Comment>::eq("post_id", post_id);
            let stored = self.uow.find_matching(Some(&spec), &Sort::unsorted())?;
            let mut parent = post.try_borrow_mut()?;
            for comment in stored {
                parent.attach_comment(comment);
            }
        }
        Ok(post.try_borrow()?.comments().to_vec())
    }

    /// Saves the children of `source` that still belong to the post and
    /// drops the ones that moved to another post from both collections.
    fn cascade_comments(
        &self,
        source: &EntityRef<Post>,
        managed: &EntityRef<Post>,
        was_transient: bool,
    ) -> RepoResult<()> {
        let post_id = managed.try_borrow()?.id;
        let children = source.try_borrow()?.comments().to_vec();

        let mut saved = Vec::with_capacity(children.len());
        for child in &children {
            let owner = child.try_borrow()?.post_id;
            let claimed = owner == post_id || (was_transient && owner.is_none());
            if !claimed {
                debug!(
                    "event=comment_cascade module=repo status=skipped reason=moved uow_id={} post_id={post_id:?} owner={owner:?}",
                    self.uow.id()
                );
                continue;
            }
            child.try_borrow_mut()?.post_id = post_id;
            saved.push(self.uow.save(child)?);
        }

        {
            let mut parent = managed.try_borrow_mut()?;
            if managed.same_instance(source) {
                parent.take_comments();
            }
            for child in saved {
                parent.attach_comment(child);
            }
            parent.retain_comments(|child| owned_by(child, post_id));
        }
        if !managed.same_instance(source) {
            source
                .try_borrow_mut()?
                .retain_comments(|child| owned_by(child, post_id));
        }
        Ok(())
    }

    fn deliver_events(&self, source: &EntityRef<Post>) -> RepoResult<()> {
        let events = source.try_borrow_mut()?.take_domain_events();
        if events.is_empty() {
            return Ok(());
        }

        let Some(bus) = self.events.as_deref() else {
            debug!(
                "event=post_events module=repo status=skipped reason=no_bus count={}",
                events.len()
            );
            return Ok(());
        };
        for event in &events {
            bus.publish(event)?;
        }
        Ok(())
    }
}

impl Repository<Post> for PostRepository<'_> {
    fn unit_of_work(&self) -> &UnitOfWork {
        self.uow
    }

    fn save(&self, post: &EntityRef<Post>) -> RepoResult<EntityRef<Post>> {
        let was_transient = post.try_borrow()?.id.is_none();
        let managed = self.uow.save(post)?;
        self.cascade_comments(post, &managed, was_transient)?;
        self.deliver_events(post)?;
        Ok(managed)
    }

    fn delete(&self, post: &EntityRef<Post>) -> RepoResult<()> {
        let post_id = post.try_borrow()?.id;
        let Some(post_id) = post_id else {
            return Ok(());
        };

        post.try_borrow_mut()?.take_comments();
        self.uow.delete(post)?;

        debug!(
            "event=post_delete module=repo status=ok uow_id={} id={post_id}",
            self.uow.id()
        );
        Ok(())
    }
}

/// A child whose back-reference is borrowed elsewhere is kept.
fn owned_by(comment: &EntityRef<Comment>, post_id: Option<PostId>) -> bool {
    comment
        .try_borrow()
        .map_or(true, |comment| comment.post_id == post_id)
}
