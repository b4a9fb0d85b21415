//! Comment entity and its read-only projections.

use crate::model::entity::{require_text, Entity, EntityId, ValidationError};
use crate::model::post::PostId;
use crate::query::projection::Projection;
use crate::repo::RepoError;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub type CommentId = EntityId;

const BODY_MAX_CHARS: usize = 2000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Option<CommentId>,
    pub comment: String,
    pub up: u32,
    pub down: u32,
    pub best: bool,
    /// Owning post. Maintained through `Post::add_comment`/`remove_comment`.
    pub post_id: Option<PostId>,
}

impl Comment {
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            ..Self::default()
        }
    }

    pub fn with_votes(mut self, up: u32, down: u32) -> Self {
        self.up = up;
        self.down = down;
        self
    }
}

impl Entity for Comment {
    const TABLE: &'static str = "comments";
    const COLUMNS: &'static [&'static str] = &["comment", "up", "down", "best", "post_id"];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text(Self::TABLE, "comment", &self.comment, BODY_MAX_CHARS)
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.comment.clone()),
            Value::Integer(i64::from(self.up)),
            Value::Integer(i64::from(self.down)),
            Value::Integer(i64::from(self.best)),
            self.post_id.map_or(Value::Null, Value::Integer),
        ]
    }

    fn from_row(row: &Row<'_>) -> Result<Self, RepoError> {
        let comment = Self {
            id: Some(row.get("id")?),
            comment: row.get("comment")?,
            up: vote_count(row, "up")?,
            down: vote_count(row, "down")?,
            best: match row.get::<_, i64>("best")? {
                0 => false,
                1 => true,
                other => {
                    return Err(RepoError::InvalidData(format!(
                        "invalid best value `{other}` in comments.best"
                    )));
                }
            },
            post_id: row.get("post_id")?,
        };
        comment
            .validate()
            .map_err(|err| RepoError::InvalidData(format!("comments row: {err}")))?;
        Ok(comment)
    }

    fn merge_from(&mut self, other: &Self) {
        self.comment.clone_from(&other.comment);
        self.up = other.up;
        self.down = other.down;
        self.best = other.best;
        self.post_id = other.post_id;
    }
}

fn vote_count(row: &Row<'_>, column: &'static str) -> Result<u32, RepoError> {
    let raw: i64 = row.get(column)?;
    u32::try_from(raw).map_err(|_| {
        RepoError::InvalidData(format!("invalid vote count `{raw}` in comments.{column}"))
    })
}

/// Body plus vote counters, without identity or post link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSummary {
    pub comment: String,
    pub up: u32,
    pub down: u32,
}

impl CommentSummary {
    /// `"<up> <down>"`.
    pub fn votes(&self) -> String {
        format!("{} {}", self.up, self.down)
    }
}

impl Projection for CommentSummary {
    type Source = Comment;
    const COLUMNS: &'static [&'static str] = &["comment", "up", "down"];

    fn from_row(row: &Row<'_>) -> Result<Self, RepoError> {
        Ok(Self {
            comment: row.get("comment")?,
            up: vote_count(row, "up")?,
            down: vote_count(row, "down")?,
        })
    }
}

/// Body only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentOnly {
    pub comment: String,
}

impl Projection for CommentOnly {
    type Source = Comment;
    const COLUMNS: &'static [&'static str] = &["comment"];

    fn from_row(row: &Row<'_>) -> Result<Self, RepoError> {
        Ok(Self {
            comment: row.get("comment")?,
        })
    }
}
