//! Turning an accepted application into a match.
//!
//! Acceptance touches three rows. The request is claimed first with a compare-and-set
//! on `status = open`, which serialises competing acceptances: only the first closes
//! it, later ones fail with [`MarketplaceError::RequestClosed`]. The application and
//! match writes follow, and each failure undoes the steps already taken.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::store::Filter;

use super::domain::{
    Actor, Application, ApplicationId, ApplicationStatus, Match, MatchId, Request, RequestId,
    UserId,
};
use super::error::{require_admin, MarketplaceError, MarketplaceResult};
use super::repository::Stores;
use super::requests::RequestStore;

/// Everything written by a successful acceptance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptOutcome {
    pub application: Application,
    pub request: Request,
    #[serde(rename = "match")]
    pub matched: Match,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFilter {
    pub tutor_id: Option<UserId>,
    pub student_id: Option<UserId>,
    pub request_id: Option<RequestId>,
}

#[derive(Clone)]
pub struct MatchService {
    stores: Stores,
    requests: RequestStore,
}

impl MatchService {
    pub fn new(stores: Stores, requests: RequestStore) -> Self {
        Self { stores, requests }
    }

    /// Accept a pending application on behalf of the request's student (or an admin),
    /// creating the match and closing the request.
    pub async fn accept_application(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> MarketplaceResult<AcceptOutcome> {
        let application = self
            .stores
            .applications
            .fetch(application_id.as_str())
            .await?
            .ok_or_else(|| MarketplaceError::not_found("application", application_id))?;
        if application.status != ApplicationStatus::Pending {
            return Err(MarketplaceError::transition(
                "application",
                application_id,
                application.status.label(),
                ApplicationStatus::Accepted.label(),
            ));
        }

        let request = self.requests.get(&application.request_id).await?;
        if !actor.owns_or_admin(&request.student_id) {
            return Err(MarketplaceError::forbidden(actor, "accept applications for this request"));
        }
        if !request.is_open() {
            return Err(MarketplaceError::RequestClosed {
                request_id: request.id,
            });
        }

        let closed = match self.requests.close_if_open(request.clone()).await? {
            Some(closed) => closed,
            None => {
                return Err(MarketplaceError::RequestClosed {
                    request_id: request.id,
                })
            }
        };

        let accepted = match self.accept_pending(application).await {
            Ok(accepted) => accepted,
            Err(err) => {
                self.compensate(&closed, None).await;
                return Err(err);
            }
        };

        let record = Match {
            id: MatchId::generate(),
            request_id: closed.id.clone(),
            tutor_id: accepted.tutor_id.clone(),
            // Taken from the request, never from the caller.
            student_id: closed.student_id.clone(),
            application_id: Some(accepted.id.clone()),
            created_at: Utc::now(),
        };
        let matched = match self.stores.matches.insert(record).await {
            Ok(matched) => matched,
            Err(err) => {
                self.compensate(&closed, Some(&accepted)).await;
                return Err(err.into());
            }
        };

        info!(
            application_id = %accepted.id,
            request_id = %closed.id,
            match_id = %matched.id,
            tutor_id = %matched.tutor_id,
            student_id = %matched.student_id,
            "application accepted and match created"
        );

        Ok(AcceptOutcome {
            application: accepted,
            request: closed,
            matched,
        })
    }

    async fn accept_pending(&self, application: Application) -> MarketplaceResult<Application> {
        let id = application.id.clone();
        let next = Application {
            status: ApplicationStatus::Accepted,
            ..application
        };
        let guard = Filter::new().eq("status", ApplicationStatus::Pending.label());
        match self.stores.applications.update_if(next, &guard).await? {
            Some(accepted) => Ok(accepted),
            None => {
                let from = self
                    .stores
                    .applications
                    .fetch(id.as_str())
                    .await?
                    .map(|current| current.status.label())
                    .unwrap_or("missing");
                Err(MarketplaceError::transition(
                    "application",
                    &id,
                    from,
                    ApplicationStatus::Accepted.label(),
                ))
            }
        }
    }

    /// Roll back a partial acceptance: revert the application to pending (if it was
    /// accepted) and reopen the request. Failures here are logged, not returned, so the
    /// caller still sees the original error.
    async fn compensate(&self, closed: &Request, accepted: Option<&Application>) {
        warn!(request_id = %closed.id, "rolling back partial acceptance");

        if let Some(accepted) = accepted {
            let reverted = Application {
                status: ApplicationStatus::Pending,
                ..accepted.clone()
            };
            let guard = Filter::new().eq("status", ApplicationStatus::Accepted.label());
            if let Err(err) = self.stores.applications.update_if(reverted, &guard).await {
                error!(application_id = %accepted.id, error = %err, "failed to revert accepted application");
            }
        }

        if let Err(err) = self.requests.reopen_after_failure(closed.clone()).await {
            error!(request_id = %closed.id, error = %err, "failed to reopen request");
        }
    }

    /// Administrator assignment of a tutor to an open request, without an application.
    pub async fn assign_tutor(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        tutor_id: &UserId,
    ) -> MarketplaceResult<Match> {
        require_admin(actor, "assign tutors")?;

        let request = self.requests.get(request_id).await?;
        let closed = match self.requests.close_if_open(request).await? {
            Some(closed) => closed,
            None => {
                return Err(MarketplaceError::RequestClosed {
                    request_id: request_id.clone(),
                })
            }
        };

        let record = Match {
            id: MatchId::generate(),
            request_id: closed.id.clone(),
            tutor_id: tutor_id.clone(),
            student_id: closed.student_id.clone(),
            application_id: None,
            created_at: Utc::now(),
        };
        match self.stores.matches.insert(record).await {
            Ok(matched) => {
                info!(request_id = %closed.id, tutor_id = %tutor_id, match_id = %matched.id, "tutor assigned by admin");
                Ok(matched)
            }
            Err(err) => {
                self.compensate(&closed, None).await;
                Err(err.into())
            }
        }
    }

    pub async fn list(&self, filter: &MatchFilter) -> MarketplaceResult<Vec<Match>> {
        let filter = Filter::new()
            .eq_opt("tutor_id", filter.tutor_id.clone())
            .eq_opt("student_id", filter.student_id.clone())
            .eq_opt("request_id", filter.request_id.clone());
        Ok(self.stores.matches.list(&filter).await?)
    }
}
