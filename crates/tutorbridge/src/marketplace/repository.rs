use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::BackendConfig;
use crate::store::{
    FallbackRepository, InMemoryRepository, Record, Repository, RepositoryError, RestClient,
};

use super::domain::{
    Application, ApplicationStatus, Conversation, Match, Message, Payment, Report, Request,
    UserProfile,
};

impl Record for Request {
    const TABLE: &'static str = "requests";

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Record for Application {
    const TABLE: &'static str = "applications";

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }

    /// One live application per (request, tutor); withdrawn rows step aside.
    fn unique_key(&self) -> Option<String> {
        (self.status != ApplicationStatus::Withdrawn)
            .then(|| format!("{}/{}", self.request_id, self.tutor_id))
    }
}

impl Record for Match {
    const TABLE: &'static str = "matches";

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Record for Payment {
    const TABLE: &'static str = "invoices";

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.map(|at| at.with_timezone(&Utc))
    }
}

impl Record for Report {
    const TABLE: &'static str = "reports";

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Record for UserProfile {
    const TABLE: &'static str = "profiles";

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Record for Conversation {
    const TABLE: &'static str = "conversations";

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("{}/{}", self.tutor_id, self.student_id))
    }
}

impl Record for Message {
    const TABLE: &'static str = "messages";

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

/// One repository per table, shared by every marketplace component.
#[derive(Clone)]
pub struct Stores {
    pub requests: Arc<dyn Repository<Request>>,
    pub applications: Arc<dyn Repository<Application>>,
    pub matches: Arc<dyn Repository<Match>>,
    pub payments: Arc<dyn Repository<Payment>>,
    pub reports: Arc<dyn Repository<Report>>,
    pub users: Arc<dyn Repository<UserProfile>>,
    pub conversations: Arc<dyn Repository<Conversation>>,
    pub messages: Arc<dyn Repository<Message>>,
}

impl Stores {
    /// Volatile, process-lifetime storage.
    pub fn in_memory() -> Self {
        Self {
            requests: Arc::new(InMemoryRepository::<Request>::new()),
            applications: Arc::new(InMemoryRepository::<Application>::new()),
            matches: Arc::new(InMemoryRepository::<Match>::new()),
            payments: Arc::new(InMemoryRepository::<Payment>::new()),
            reports: Arc::new(InMemoryRepository::<Report>::new()),
            users: Arc::new(InMemoryRepository::<UserProfile>::new()),
            conversations: Arc::new(InMemoryRepository::<Conversation>::new()),
            messages: Arc::new(InMemoryRepository::<Message>::new()),
        }
    }

    /// Hosted backend for every table, each backed by a local table that takes over
    /// while the backend is unreachable.
    pub fn remote_with_fallback(client: &RestClient) -> Self {
        Self {
            requests: fallback::<Request>(client),
            applications: fallback::<Application>(client),
            matches: fallback::<Match>(client),
            payments: fallback::<Payment>(client),
            reports: fallback::<Report>(client),
            users: fallback::<UserProfile>(client),
            conversations: fallback::<Conversation>(client),
            messages: fallback::<Message>(client),
        }
    }

    /// Select the storage strategy from configuration.
    pub fn from_config(config: &BackendConfig) -> Result<Self, RepositoryError> {
        match &config.base_url {
            Some(base_url) => {
                let client =
                    RestClient::new(base_url.clone(), config.api_key.as_deref(), config.timeout)?;
                Ok(Self::remote_with_fallback(&client))
            }
            None => Ok(Self::in_memory()),
        }
    }
}

fn fallback<T: Record>(client: &RestClient) -> Arc<dyn Repository<T>> {
    Arc::new(FallbackRepository::new(
        Arc::new(client.repository::<T>()),
        Arc::new(InMemoryRepository::<T>::new()),
    ))
}
