use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{newest_first, Filter, RepositoryError};

use super::domain::{
    Actor, Application, ApplicationId, ApplicationStatus, Request, RequestId, Role, UserId,
};
use super::error::{MarketplaceError, MarketplaceResult};
use super::matching::MatchService;
use super::repository::Stores;
use super::requests::{RequestFilter, RequestStore};

/// A tutor's bid on an open request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewApplication {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub proposed_salary: Option<u64>,
}

/// Edits a tutor may make while the application is still pending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationChanges {
    pub message: Option<String>,
    pub proposed_salary: Option<u64>,
}

/// Owns tutor applications and their single-hop status transitions.
#[derive(Clone)]
pub struct ApplicationStore {
    stores: Stores,
    requests: RequestStore,
    matcher: MatchService,
}

impl ApplicationStore {
    pub fn new(stores: Stores, requests: RequestStore, matcher: MatchService) -> Self {
        Self {
            stores,
            requests,
            matcher,
        }
    }

    /// Apply to an open request. A tutor holds at most one live application per
    /// request; withdrawn applications do not count.
    pub async fn apply(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        application: NewApplication,
    ) -> MarketplaceResult<Application> {
        if actor.role != Role::Tutor {
            return Err(MarketplaceError::forbidden(actor, "apply to tuition requests"));
        }

        let request = self.requests.get(request_id).await?;
        if !request.is_open() {
            return Err(MarketplaceError::RequestClosed {
                request_id: request.id,
            });
        }

        if let Some(live) = self.live_application(request_id, &actor.user_id).await? {
            return Err(MarketplaceError::DuplicateApplication {
                request_id: request_id.clone(),
                tutor_id: actor.user_id.clone(),
                existing: live.id,
            });
        }

        let record = Application {
            id: ApplicationId::generate(),
            request_id: request_id.clone(),
            tutor_id: actor.user_id.clone(),
            status: ApplicationStatus::Pending,
            message: application.message.trim().to_string(),
            proposed_salary: application.proposed_salary,
            created_at: Utc::now(),
        };

        // The check above races with concurrent applies; the store's unique key decides.
        let stored = match self.stores.applications.insert(record).await {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => {
                let live = self
                    .live_application(request_id, &actor.user_id)
                    .await?
                    .ok_or(RepositoryError::Conflict)?;
                return Err(MarketplaceError::DuplicateApplication {
                    request_id: request_id.clone(),
                    tutor_id: actor.user_id.clone(),
                    existing: live.id,
                });
            }
            Err(err) => return Err(err.into()),
        };
        info!(
            application_id = %stored.id,
            request_id = %stored.request_id,
            tutor_id = %stored.tutor_id,
            "application submitted"
        );
        Ok(stored)
    }

    pub async fn get(&self, id: &ApplicationId) -> MarketplaceResult<Application> {
        self.stores
            .applications
            .fetch(id.as_str())
            .await?
            .ok_or_else(|| MarketplaceError::not_found("application", id))
    }

    /// Move a pending application to `status`. Accepting delegates to the match
    /// service so the match and request closure happen together.
    pub async fn set_status(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> MarketplaceResult<Application> {
        if status == ApplicationStatus::Accepted {
            return self
                .matcher
                .accept_application(actor, id)
                .await
                .map(|outcome| outcome.application);
        }

        let application = self.get(id).await?;
        if !application.status.can_transition_to(status) {
            return Err(MarketplaceError::transition(
                "application",
                id,
                application.status.label(),
                status.label(),
            ));
        }
        self.authorize_decision(actor, &application, status).await?;

        let updated = self.transition_pending(application, status).await?;
        info!(
            application_id = %id,
            status = status.label(),
            actor = %actor,
            "application status changed"
        );
        Ok(updated)
    }

    pub async fn withdraw(&self, actor: &Actor, id: &ApplicationId) -> MarketplaceResult<Application> {
        self.set_status(actor, id, ApplicationStatus::Withdrawn).await
    }

    pub async fn reject(&self, actor: &Actor, id: &ApplicationId) -> MarketplaceResult<Application> {
        self.set_status(actor, id, ApplicationStatus::Rejected).await
    }

    async fn authorize_decision(
        &self,
        actor: &Actor,
        application: &Application,
        status: ApplicationStatus,
    ) -> MarketplaceResult<()> {
        let allowed = match status {
            ApplicationStatus::Withdrawn => actor.user_id == application.tutor_id,
            ApplicationStatus::Denied => {
                actor.is_admin() || actor.user_id == application.tutor_id
            }
            ApplicationStatus::Rejected => {
                let request = self.requests.get(&application.request_id).await?;
                actor.owns_or_admin(&request.student_id)
            }
            ApplicationStatus::Accepted | ApplicationStatus::Pending => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(MarketplaceError::forbidden(actor, "decide on this application"))
        }
    }

    /// Compare-and-set pending -> `status`; a concurrent decision surfaces as an
    /// invalid transition from whatever state won.
    pub(crate) async fn transition_pending(
        &self,
        application: Application,
        status: ApplicationStatus,
    ) -> MarketplaceResult<Application> {
        let id = application.id.clone();
        let next = Application {
            status,
            ..application
        };
        let guard = Filter::new().eq("status", ApplicationStatus::Pending.label());
        match self.stores.applications.update_if(next, &guard).await? {
            Some(updated) => Ok(updated),
            None => {
                let current = self.get(&id).await?;
                Err(MarketplaceError::transition(
                    "application",
                    &id,
                    current.status.label(),
                    status.label(),
                ))
            }
        }
    }

    /// Change the message or proposed salary of a pending application.
    pub async fn edit(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        changes: ApplicationChanges,
    ) -> MarketplaceResult<Application> {
        let mut application = self.get(id).await?;
        if actor.user_id != application.tutor_id {
            return Err(MarketplaceError::forbidden(actor, "edit this application"));
        }
        if application.status.is_terminal() {
            return Err(MarketplaceError::transition(
                "application",
                id,
                application.status.label(),
                "edited",
            ));
        }

        if let Some(message) = changes.message {
            application.message = message.trim().to_string();
        }
        if let Some(salary) = changes.proposed_salary {
            application.proposed_salary = Some(salary);
        }

        let guard = Filter::new().eq("status", ApplicationStatus::Pending.label());
        match self.stores.applications.update_if(application, &guard).await? {
            Some(updated) => Ok(updated),
            None => {
                let current = self.get(id).await?;
                Err(MarketplaceError::transition(
                    "application",
                    id,
                    current.status.label(),
                    "edited",
                ))
            }
        }
    }

    /// A tutor declines a request: their pending application becomes `denied`, or a
    /// `denied` marker is recorded so the request drops out of their feed.
    pub async fn deny_request(
        &self,
        actor: &Actor,
        request_id: &RequestId,
    ) -> MarketplaceResult<Application> {
        if actor.role != Role::Tutor {
            return Err(MarketplaceError::forbidden(actor, "deny tuition requests"));
        }
        let request = self.requests.get(request_id).await?;
        let existing = self.for_pair(&request.id, &actor.user_id).await?;

        if let Some(denied) = existing
            .iter()
            .find(|application| application.status == ApplicationStatus::Denied)
        {
            return Ok(denied.clone());
        }
        if let Some(accepted) = existing
            .iter()
            .find(|application| application.status == ApplicationStatus::Accepted)
        {
            return Err(MarketplaceError::transition(
                "application",
                &accepted.id,
                ApplicationStatus::Accepted.label(),
                ApplicationStatus::Denied.label(),
            ));
        }
        if let Some(pending) = existing
            .into_iter()
            .find(|application| application.status == ApplicationStatus::Pending)
        {
            let denied = self
                .transition_pending(pending, ApplicationStatus::Denied)
                .await?;
            info!(request_id = %request.id, tutor_id = %actor.user_id, "tutor denied request");
            return Ok(denied);
        }

        let marker = Application {
            id: ApplicationId::generate(),
            request_id: request.id.clone(),
            tutor_id: actor.user_id.clone(),
            status: ApplicationStatus::Denied,
            message: String::new(),
            proposed_salary: None,
            created_at: Utc::now(),
        };
        let stored = self.stores.applications.insert(marker).await?;
        info!(request_id = %request.id, tutor_id = %actor.user_id, "tutor denied request");
        Ok(stored)
    }

    async fn live_application(
        &self,
        request_id: &RequestId,
        tutor_id: &UserId,
    ) -> MarketplaceResult<Option<Application>> {
        Ok(self
            .for_pair(request_id, tutor_id)
            .await?
            .into_iter()
            .find(|existing| existing.status != ApplicationStatus::Withdrawn))
    }

    async fn for_pair(
        &self,
        request_id: &RequestId,
        tutor_id: &UserId,
    ) -> MarketplaceResult<Vec<Application>> {
        let filter = Filter::new()
            .eq("request_id", request_id.as_str())
            .eq("tutor_id", tutor_id.as_str());
        Ok(self.stores.applications.list(&filter).await?)
    }

    pub async fn list_for_tutor(&self, tutor_id: &UserId) -> MarketplaceResult<Vec<Application>> {
        let filter = Filter::new().eq("tutor_id", tutor_id.as_str());
        Ok(self.stores.applications.list(&filter).await?)
    }

    pub async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> MarketplaceResult<Vec<Application>> {
        let filter = Filter::new().eq("request_id", request_id.as_str());
        Ok(self.stores.applications.list(&filter).await?)
    }

    /// Applications received across every request the student posted.
    pub async fn list_for_student(
        &self,
        student_id: &UserId,
    ) -> MarketplaceResult<Vec<Application>> {
        let requests = self
            .requests
            .list(&RequestFilter {
                student_id: Some(student_id.clone()),
                ..RequestFilter::default()
            })
            .await?;

        let mut received = Vec::new();
        for request in &requests {
            received.extend(self.list_for_request(&request.id).await?);
        }
        received.sort_by(newest_first);
        Ok(received)
    }

    /// Open requests the tutor has not declined.
    pub async fn open_requests_for_tutor(&self, tutor_id: &UserId) -> MarketplaceResult<Vec<Request>> {
        let denied: HashSet<RequestId> = self
            .list_for_tutor(tutor_id)
            .await?
            .into_iter()
            .filter(|application| application.status == ApplicationStatus::Denied)
            .map(|application| application.request_id)
            .collect();

        let open = self.requests.list(&RequestFilter::open()).await?;
        Ok(open
            .into_iter()
            .filter(|request| !denied.contains(&request.id))
            .collect())
    }
}
