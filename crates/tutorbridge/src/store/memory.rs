use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{newest_first, Filter, Record, Repository, RepositoryError};

/// Process-local table used for development, tests and as the fallback when the
/// hosted backend cannot be reached.
#[derive(Debug, Clone)]
pub struct InMemoryRepository<T> {
    rows: Arc<RwLock<HashMap<String, T>>>,
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Record> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table pre-populated with `rows`, replacing duplicates by id.
    pub fn seeded(rows: impl IntoIterator<Item = T>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| (row.id().to_string(), row))
            .collect();
        Self {
            rows: Arc::new(RwLock::new(rows)),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl<T: Record> Repository<T> for InMemoryRepository<T> {
    async fn insert(&self, record: T) -> Result<T, RepositoryError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(record.id()) {
            return Err(RepositoryError::Conflict);
        }
        if let Some(key) = record.unique_key() {
            if rows
                .values()
                .any(|row| row.unique_key().as_deref() == Some(key.as_str()))
            {
                return Err(RepositoryError::Conflict);
            }
        }
        rows.insert(record.id().to_string(), record.clone());
        Ok(record)
    }

    async fn fetch(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<T>, RepositoryError> {
        let rows = self.rows.read().await;
        let mut matched: Vec<T> = rows
            .values()
            .filter(|row| filter.matches(*row))
            .cloned()
            .collect();
        matched.sort_by(newest_first);
        Ok(matched)
    }

    async fn update_if(&self, record: T, expected: &Filter) -> Result<Option<T>, RepositoryError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(record.id()) {
            Some(current) if expected.matches(current) => {
                *current = record.clone();
                Ok(Some(record))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        Ok(self.rows.write().await.remove(id).is_some())
    }
}
