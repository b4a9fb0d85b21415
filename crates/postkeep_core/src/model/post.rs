//! Post aggregate and its publication event.
//!
//! # Invariants
//! - Every comment in `comments` carries `post_id == post.id` once the post
//!   has been saved. A comment moved to another post leaves this collection
//!   on the next save.
//! - A comment appears at most once in the collection.

use crate::event::DomainEvent;
use crate::model::comment::Comment;
use crate::model::entity::{require_text, Entity, EntityId, EntityRef, ValidationError};
use crate::repo::RepoError;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub type PostId = EntityId;

const TITLE_MAX_CHARS: usize = 255;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    pub id: Option<PostId>,
    pub title: String,
    #[serde(skip)]
    comments: Vec<EntityRef<Comment>>,
    #[serde(skip)]
    publish_requested: bool,
}

impl Post {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn comments(&self) -> &[EntityRef<Comment>] {
        &self.comments
    }

    /// Links `comment` to `post` on both sides.
    ///
    /// Re-adding a comment that is already in the collection is a no-op.
    pub fn add_comment(post: &EntityRef<Post>, comment: &EntityRef<Comment>) {
        let mut parent = post.borrow_mut();
        if parent.holds(comment) {
            return;
        }
        comment.borrow_mut().post_id = parent.id;
        parent.comments.push(comment.clone());
    }

    /// Unlinks `comment` from `post` on both sides. Returns whether it was linked.
    pub fn remove_comment(post: &EntityRef<Post>, comment: &EntityRef<Comment>) -> bool {
        let mut parent = post.borrow_mut();
        let before = parent.comments.len();
        parent.comments.retain(|held| !held.same_instance(comment));
        if parent.comments.len() == before {
            return false;
        }
        let mut child = comment.borrow_mut();
        if child.post_id == parent.id {
            child.post_id = None;
        }
        true
    }

    /// Marks the post as published. The event is delivered on the next save.
    pub fn publish(&mut self) -> &mut Self {
        self.publish_requested = true;
        self
    }

    pub fn is_publish_pending(&self) -> bool {
        self.publish_requested
    }

    /// Drains queued domain events, stamped with the current identity.
    pub fn take_domain_events(&mut self) -> Vec<PostPublishedEvent> {
        if !std::mem::take(&mut self.publish_requested) {
            return Vec::new();
        }
        vec![PostPublishedEvent {
            post_id: self.id,
            title: self.title.clone(),
        }]
    }

    pub(crate) fn holds(&self, comment: &EntityRef<Comment>) -> bool {
        self.comments.iter().any(|held| held.same_instance(comment))
    }

    pub(crate) fn attach_comment(&mut self, comment: EntityRef<Comment>) {
        if !self.holds(&comment) {
            self.comments.push(comment);
        }
    }

    pub(crate) fn take_comments(&mut self) -> Vec<EntityRef<Comment>> {
        std::mem::take(&mut self.comments)
    }

    pub(crate) fn retain_comments<F>(&mut self, keep: F)
    where
        F: FnMut(&EntityRef<Comment>) -> bool,
    {
        self.comments.retain(keep);
    }
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Post{{title='{}'}}", self.title)
    }
}

impl Entity for Post {
    const TABLE: &'static str = "posts";
    const COLUMNS: &'static [&'static str] = &["title"];
    const DEPENDENTS: &'static [(&'static str, &'static str)] = &[("comments", "post_id")];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text(Self::TABLE, "title", &self.title, TITLE_MAX_CHARS)
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.title.clone())]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, RepoError> {
        let post = Self {
            id: Some(row.get("id")?),
            title: row.get("title")?,
            ..Self::default()
        };
        post.validate()
            .map_err(|err| RepoError::InvalidData(format!("posts row: {err}")))?;
        Ok(post)
    }

    fn merge_from(&mut self, other: &Self) {
        self.title.clone_from(&other.title);
    }
}

/// Raised when a post is saved after `Post::publish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPublishedEvent {
    pub post_id: Option<PostId>,
    pub title: String,
}

impl DomainEvent for PostPublishedEvent {
    fn event_name(&self) -> &'static str {
        "post_published"
    }
}

impl Display for PostPublishedEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Post{{title='{}'}}", self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::Post;
    use crate::model::comment::Comment;
    use crate::model::entity::EntityRef;

    #[test]
    fn add_comment_links_both_sides_once() {
        let post = EntityRef::new(Post::new("jpa"));
        post.borrow_mut().id = Some(7);
        let comment = EntityRef::new(Comment::new("first"));

        Post::add_comment(&post, &comment);
        Post::add_comment(&post, &comment);

        assert_eq!(post.borrow().comments().len(), 1);
        assert_eq!(comment.borrow().post_id, Some(7));
    }

    #[test]
    fn remove_comment_clears_back_reference() {
        let post = EntityRef::new(Post::new("jpa"));
        post.borrow_mut().id = Some(3);
        let comment = EntityRef::new(Comment::new("bye"));
        Post::add_comment(&post, &comment);

        assert!(Post::remove_comment(&post, &comment));
        assert!(post.borrow().comments().is_empty());
        assert_eq!(comment.borrow().post_id, None);
        assert!(!Post::remove_comment(&post, &comment));
    }

    #[test]
    fn publish_queues_exactly_one_event() {
        let mut post = Post::new("event");
        post.publish().publish();
        post.id = Some(1);

        let events = post.take_domain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].post_id, Some(1));
        assert_eq!(events[0].to_string(), "Post{title='event'}");
        assert!(post.take_domain_events().is_empty());
    }
}
