use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{Filter, Record, Repository, RepositoryError};

/// Routes every call to `primary`, serving it from `local` whenever the primary
/// reports [`RepositoryError::Unavailable`]. Any other error is returned unchanged.
pub struct FallbackRepository<T: Record> {
    primary: Arc<dyn Repository<T>>,
    local: Arc<dyn Repository<T>>,
}

impl<T: Record> FallbackRepository<T> {
    pub fn new(primary: Arc<dyn Repository<T>>, local: Arc<dyn Repository<T>>) -> Self {
        Self { primary, local }
    }
}

fn note_fallback(table: &str, operation: &str, err: &RepositoryError) {
    warn!(table, operation, error = %err, "backend unavailable, serving from local storage");
}

#[async_trait]
impl<T: Record> Repository<T> for FallbackRepository<T> {
    async fn insert(&self, record: T) -> Result<T, RepositoryError> {
        match self.primary.insert(record.clone()).await {
            Err(err) if err.is_unavailable() => {
                note_fallback(T::TABLE, "insert", &err);
                self.local.insert(record).await
            }
            result => result,
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        match self.primary.fetch(id).await {
            Err(err) if err.is_unavailable() => {
                note_fallback(T::TABLE, "fetch", &err);
                self.local.fetch(id).await
            }
            result => result,
        }
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<T>, RepositoryError> {
        match self.primary.list(filter).await {
            Err(err) if err.is_unavailable() => {
                note_fallback(T::TABLE, "list", &err);
                self.local.list(filter).await
            }
            result => result,
        }
    }

    async fn update_if(&self, record: T, expected: &Filter) -> Result<Option<T>, RepositoryError> {
        match self.primary.update_if(record.clone(), expected).await {
            Err(err) if err.is_unavailable() => {
                note_fallback(T::TABLE, "update", &err);
                self.local.update_if(record, expected).await
            }
            result => result,
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        match self.primary.delete(id).await {
            Err(err) if err.is_unavailable() => {
                note_fallback(T::TABLE, "delete", &err);
                self.local.delete(id).await
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRepository;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: String,
    }

    impl Record for Entry {
        const TABLE: &'static str = "entries";

        fn id(&self) -> &str {
            &self.id
        }

        fn created_at(&self) -> Option<DateTime<Utc>> {
            None
        }
    }

    struct OfflineRepository;

    #[async_trait]
    impl Repository<Entry> for OfflineRepository {
        async fn insert(&self, _record: Entry) -> Result<Entry, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".to_string()))
        }

        async fn fetch(&self, _id: &str) -> Result<Option<Entry>, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".to_string()))
        }

        async fn list(&self, _filter: &Filter) -> Result<Vec<Entry>, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".to_string()))
        }

        async fn update_if(
            &self,
            _record: Entry,
            _expected: &Filter,
        ) -> Result<Option<Entry>, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _id: &str) -> Result<bool, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".to_string()))
        }
    }

    struct RejectingRepository;

    #[async_trait]
    impl Repository<Entry> for RejectingRepository {
        async fn insert(&self, _record: Entry) -> Result<Entry, RepositoryError> {
            Err(RepositoryError::Rejected {
                status: 400,
                message: "column does not exist".to_string(),
            })
        }

        async fn fetch(&self, _id: &str) -> Result<Option<Entry>, RepositoryError> {
            Ok(None)
        }

        async fn list(&self, _filter: &Filter) -> Result<Vec<Entry>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn update_if(
            &self,
            _record: Entry,
            _expected: &Filter,
        ) -> Result<Option<Entry>, RepositoryError> {
            Ok(None)
        }

        async fn delete(&self, _id: &str) -> Result<bool, RepositoryError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn unavailable_primary_is_absorbed_by_local_store() {
        let local = Arc::new(InMemoryRepository::<Entry>::new());
        let repository = FallbackRepository::new(Arc::new(OfflineRepository), local.clone());

        let entry = Entry {
            id: "e-1".to_string(),
        };
        repository.insert(entry.clone()).await.expect("falls back");

        assert_eq!(local.len().await, 1);
        let fetched = repository.fetch("e-1").await.expect("falls back");
        assert_eq!(fetched, Some(entry));
        assert_eq!(repository.list(&Filter::new()).await.expect("list").len(), 1);
        assert!(repository.delete("e-1").await.expect("delete"));
    }

    #[tokio::test]
    async fn other_primary_errors_propagate() {
        let local = Arc::new(InMemoryRepository::<Entry>::new());
        let repository = FallbackRepository::new(Arc::new(RejectingRepository), local.clone());

        match repository
            .insert(Entry {
                id: "e-2".to_string(),
            })
            .await
        {
            Err(RepositoryError::Rejected { status: 400, .. }) => {}
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(local.is_empty().await);
    }
}
