use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::descriptor::GameId;
use crate::notify::{Notice, Notifier};
use crate::remote::{guard_remote, Collection, DataStore, Filter, RemoteError, Row, Session, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub game_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
}

impl Comment {
    pub fn author(&self) -> UserId {
        UserId(self.user_id.clone())
    }
}

/// Local state only changes after the backend accepted the change.
#[derive(Debug)]
pub struct CommentThread {
    game_id: GameId,
    comments: Vec<Comment>,
}

impl CommentThread {
    pub fn new(game_id: GameId) -> Self {
        Self {
            game_id,
            comments: Vec::new(),
        }
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn refresh(
        &mut self,
        store: &mut dyn DataStore,
        notices: &mut dyn Notifier,
    ) -> Result<usize, RemoteError> {
        let filters = [Filter::eq("game_id", self.game_id.0.clone())];
        let rows = guard_remote(notices, "load_comments", || {
            store.select(Collection::Comments, &filters)
        })?;
        self.comments = rows.into_iter().filter_map(comment_from_row).collect();
        self.comments.sort_by_key(|comment| comment.id);
        debug!(game_id = %self.game_id, count = self.comments.len(), "comments_refreshed");
        Ok(self.comments.len())
    }

    pub fn post(
        &mut self,
        store: &mut dyn DataStore,
        notices: &mut dyn Notifier,
        session: Option<&Session>,
        body: &str,
    ) -> Result<&Comment, RemoteError> {
        let game_id = self.game_id.0.clone();
        let stored = guard_remote(notices, "post_comment", || {
            let session = session.ok_or(RemoteError::Unauthenticated)?;
            let content = body.trim();
            if content.is_empty() {
                return Err(RemoteError::Rejected {
                    message: "Comment cannot be empty".to_string(),
                });
            }
            let mut row = Row::new();
            row.insert("game_id".to_string(), Value::from(game_id));
            row.insert("user_id".to_string(), Value::from(session.user_id.0.clone()));
            row.insert("username".to_string(), Value::from(session.username.clone()));
            row.insert("content".to_string(), Value::from(content));
            let stored = store.insert(Collection::Comments, row)?;
            comment_from_row(stored).ok_or_else(|| RemoteError::Rejected {
                message: "Comment could not be saved".to_string(),
            })
        })?;

        notices.notify(Notice::success("Comment posted"));
        self.comments.push(stored);
        let index = self.comments.len() - 1;
        Ok(&self.comments[index])
    }

    pub fn delete(
        &mut self,
        store: &mut dyn DataStore,
        notices: &mut dyn Notifier,
        session: Option<&Session>,
        index: usize,
    ) -> Result<Comment, RemoteError> {
        let target = self.comments.get(index).cloned();
        guard_remote(notices, "delete_comment", || {
            let session = session.ok_or(RemoteError::Unauthenticated)?;
            let comment = target.as_ref().ok_or_else(|| RemoteError::NotFound {
                message: format!("comment #{index}"),
            })?;
            if !session.is_admin && session.user_id != comment.author() {
                return Err(RemoteError::Permission {
                    message: format!("{} does not own comment {}", session.username, comment.id),
                });
            }
            store.delete(Collection::Comments, &[Filter::eq("id", comment.id)])
        })?;

        notices.notify(Notice::success("Comment deleted"));
        Ok(self.comments.remove(index))
    }
}

fn comment_from_row(row: Row) -> Option<Comment> {
    match serde_json::from_value(Value::Object(row)) {
        Ok(comment) => Some(comment),
        Err(error) => {
            warn!(error = %error, "comment_row_skipped");
            None
        }
    }
}
