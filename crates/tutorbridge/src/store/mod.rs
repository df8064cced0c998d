//! Persistence seam shared by every marketplace component.
//!
//! Each table is reached through a [`Repository`]. The hosted backend is wrapped in a
//! [`FallbackRepository`] so that an unreachable backend degrades to process-local
//! storage instead of surfacing to callers.

mod fallback;
mod memory;
mod rest;

use std::cmp::Ordering;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use fallback::FallbackRepository;
pub use memory::InMemoryRepository;
pub use rest::{RestClient, RestRepository};

/// A row stored in one backend table.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;

    fn id(&self) -> &str;

    /// Creation timestamp used for newest-first ordering.
    fn created_at(&self) -> Option<DateTime<Utc>>;

    /// Natural key that at most one stored row may carry. Inserting a second row with
    /// the same key fails with `Conflict`; hosted tables back this with a unique index.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

/// Conjunction of `column = value` conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<(&'static str, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<String>) -> Self {
        self.conditions.push((column, value.into()));
        self
    }

    pub fn eq_opt<V: Into<String>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.eq(column, value),
            None => self,
        }
    }

    pub fn conditions(&self) -> &[(&'static str, String)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against the serialized form of a record, mirroring how
    /// the backend compares columns.
    pub fn matches<T: Serialize>(&self, record: &T) -> bool {
        if self.conditions.is_empty() {
            return true;
        }

        let Ok(row) = serde_json::to_value(record) else {
            return false;
        };

        self.conditions
            .iter()
            .all(|(column, expected)| match row.get(*column) {
                Some(Value::String(actual)) => actual == expected,
                Some(Value::Number(actual)) => actual.to_string() == *expected,
                Some(Value::Bool(actual)) => actual.to_string() == *expected,
                _ => false,
            })
    }
}

/// Newest first; rows without a timestamp sort last, ties broken by id.
pub fn newest_first<T: Record>(left: &T, right: &T) -> Ordering {
    right
        .created_at()
        .cmp(&left.created_at())
        .then_with(|| left.id().cmp(right.id()))
}

/// Storage abstraction so the marketplace services can be exercised in isolation.
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    async fn insert(&self, record: T) -> Result<T, RepositoryError>;

    async fn fetch(&self, id: &str) -> Result<Option<T>, RepositoryError>;

    /// Rows matching `filter`, newest first.
    async fn list(&self, filter: &Filter) -> Result<Vec<T>, RepositoryError>;

    /// Replace the stored row only if it still matches `expected`. Returns `None` when
    /// the row is missing or the precondition no longer holds.
    async fn update_if(&self, record: T, expected: &Filter) -> Result<Option<T>, RepositoryError>;

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;

    async fn update(&self, record: T) -> Result<T, RepositoryError> {
        self.update_if(record, &Filter::new())
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed backend payload: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RepositoryError::Conflict => StatusCode::CONFLICT,
            RepositoryError::NotFound => StatusCode::NOT_FOUND,
            RepositoryError::Unavailable(_)
            | RepositoryError::Rejected { .. }
            | RepositoryError::Decode(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
