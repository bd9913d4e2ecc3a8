use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::notify::{Notice, Notifier};

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub type SessionListener = Box<dyn FnMut(Option<&Session>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Games,
    Profiles,
    Comments,
    Ratings,
    Tags,
    GameTags,
    Views,
}

impl Collection {
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Games => "games",
            Collection::Profiles => "profiles",
            Collection::Comments => "comments",
            Collection::Ratings => "ratings",
            Collection::Tags => "tags",
            Collection::GameTags => "game_tags",
            Collection::Views => "game_views",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("permission denied: {message}")]
    Permission { message: String },
    #[error("network failure: {message}")]
    Network { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("request rejected: {message}")]
    Rejected { message: String },
    #[error("not signed in")]
    Unauthenticated,
}

impl RemoteError {
    pub fn user_message(&self) -> String {
        match self {
            RemoteError::Permission { .. } => {
                "You don't have permission to do that.".to_string()
            }
            RemoteError::Network { .. } => {
                "Network error. Please check your connection and try again.".to_string()
            }
            RemoteError::NotFound { .. } => "That item no longer exists.".to_string(),
            RemoteError::Rejected { message } => message.clone(),
            RemoteError::Unauthenticated => "Please sign in to continue.".to_string(),
        }
    }
}

pub trait AuthService {
    fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, RemoteError>;
    fn sign_up(&mut self, username: &str, email: &str, password: &str)
        -> Result<Session, RemoteError>;
    fn sign_out(&mut self) -> Result<(), RemoteError>;
    fn current_session(&self) -> Option<Session>;
    /// The listener is called with the new session after every auth change.
    fn subscribe(&mut self, listener: SessionListener) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId);
}

pub trait DataStore {
    fn select(&mut self, collection: Collection, filters: &[Filter]) -> Result<Vec<Row>, RemoteError>;
    fn insert(&mut self, collection: Collection, row: Row) -> Result<Row, RemoteError>;
    fn update(
        &mut self,
        collection: Collection,
        filters: &[Filter],
        changes: Row,
    ) -> Result<usize, RemoteError>;
    fn delete(&mut self, collection: Collection, filters: &[Filter]) -> Result<usize, RemoteError>;
}

pub trait ObjectStorage {
    fn upload(&mut self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String, RemoteError>;
}

pub fn guard_remote<T>(
    notices: &mut dyn Notifier,
    action: &'static str,
    call: impl FnOnce() -> Result<T, RemoteError>,
) -> Result<T, RemoteError> {
    call().map_err(|error| {
        warn!(action, error = %error, "remote_call_failed");
        notices.notify(Notice::error(error.user_message()));
        error
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NoticeLevel, NoticeQueue};

    #[test]
    fn guard_passes_success_through_silently() {
        let mut notices = NoticeQueue::default();
        let value = guard_remote(&mut notices, "load_games", || Ok::<_, RemoteError>(7));
        assert_eq!(value, Ok(7));
        assert!(notices.is_empty());
    }

    #[test]
    fn guard_surfaces_failure_and_returns_it() {
        let mut notices = NoticeQueue::default();
        let result: Result<(), _> = guard_remote(&mut notices, "post_comment", || {
            Err(RemoteError::Network {
                message: "timeout".to_string(),
            })
        });

        assert!(matches!(result, Err(RemoteError::Network { .. })));
        let drained = notices.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].level, NoticeLevel::Error);
        assert!(drained[0].message.starts_with("Network error"));
    }

    #[test]
    fn rejected_message_is_shown_verbatim() {
        let error = RemoteError::Rejected {
            message: "Comment cannot be empty".to_string(),
        };
        assert_eq!(error.user_message(), "Comment cannot be empty");
    }

    #[test]
    fn table_names_are_distinct() {
        let all = [
            Collection::Games,
            Collection::Profiles,
            Collection::Comments,
            Collection::Ratings,
            Collection::Tags,
            Collection::GameTags,
            Collection::Views,
        ];
        let mut names: Vec<_> = all.iter().map(|c| c.table_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }
}
