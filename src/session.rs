// Per-run identity: the gateway address plus a user id that has been
// resolved against the user table. Built once at startup, never mutated.

use crate::model::Operation;
use anyhow::Result;
use thiserror::Error;

/// A row of the user table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// Looks a user up by id. Implemented over SQLite in [`crate::db`].
pub trait UserDirectory {
    fn find_user(&self, id: i64) -> Result<Option<User>>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("base URL must not be empty")]
    EmptyBaseUrl,
    #[error("base URL '{0}' must use https")]
    InsecureBaseUrl(String),
    #[error("user id '{0}' is not a number")]
    InvalidUserId(String),
    #[error("no such user: {0}")]
    NoSuchUser(i64),
    #[error("user lookup failed: {0:#}")]
    Lookup(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    base_url: String,
    user: User,
}

impl Session {
    /// Resolve `raw_user_id` through `directory` and bind it to `base_url`.
    /// A single trailing slash on the base URL is dropped.
    pub fn resolve(
        base_url: &str,
        raw_user_id: &str,
        directory: &dyn UserDirectory,
    ) -> Result<Self, SessionError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(SessionError::EmptyBaseUrl);
        }
        if !base_url.starts_with("https://") {
            return Err(SessionError::InsecureBaseUrl(base_url.to_string()));
        }
        let id: i64 = raw_user_id
            .trim()
            .parse()
            .map_err(|_| SessionError::InvalidUserId(raw_user_id.trim().to_string()))?;
        let user = directory
            .find_user(id)
            .map_err(SessionError::Lookup)?
            .ok_or(SessionError::NoSuchUser(id))?;
        tracing::info!(user_id = user.id, username = %user.username, "session resolved");
        Ok(Self {
            base_url: base_url.to_string(),
            user,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    /// `{base}/{operation path}/{user id}`.
    pub fn url_for(&self, op: Operation) -> String {
        format!("{}/{}/{}", self.base_url, op.path(), self.user.id)
    }
}
