use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::Filter;

use super::domain::{Actor, Request, RequestId, RequestStatus, Role, UserId};
use super::error::{MarketplaceError, MarketplaceResult};
use super::repository::Stores;

/// Fields a student submits when posting a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub subject: String,
    pub class_level: String,
    pub location: String,
    #[serde(default)]
    pub tuition_type: String,
    pub salary_range: String,
    #[serde(default)]
    pub additional_details: Option<String>,
}

impl NewRequest {
    /// Names of required fields that are blank. Presentation layers call this
    /// before submitting so users see the problem without a store round trip.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("subject", &self.subject),
            ("class_level", &self.class_level),
            ("location", &self.location),
            ("salary_range", &self.salary_range),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn validate(&self) -> MarketplaceResult<()> {
        let fields = self.missing_fields();
        if fields.is_empty() {
            Ok(())
        } else {
            Err(MarketplaceError::ValidationFailed { fields })
        }
    }
}

/// Editable request fields. Identity, ownership and status are not reachable here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestChanges {
    pub subject: Option<String>,
    pub class_level: Option<String>,
    pub location: Option<String>,
    pub tuition_type: Option<String>,
    pub salary_range: Option<String>,
    pub additional_details: Option<String>,
}

impl RequestChanges {
    fn apply_to(self, request: &mut Request) -> MarketplaceResult<()> {
        let mut blank = Vec::new();
        let required = [
            ("subject", self.subject, &mut request.subject),
            ("class_level", self.class_level, &mut request.class_level),
            ("location", self.location, &mut request.location),
            ("salary_range", self.salary_range, &mut request.salary_range),
        ];
        for (name, change, slot) in required {
            if let Some(value) = change {
                let value = value.trim().to_string();
                if value.is_empty() {
                    blank.push(name);
                } else {
                    *slot = value;
                }
            }
        }
        if !blank.is_empty() {
            return Err(MarketplaceError::ValidationFailed { fields: blank });
        }

        if let Some(tuition_type) = self.tuition_type {
            request.tuition_type = tuition_type.trim().to_string();
        }
        if let Some(details) = self.additional_details {
            let details = details.trim().to_string();
            request.additional_details = (!details.is_empty()).then_some(details);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub subject: Option<String>,
    pub location: Option<String>,
    pub student_id: Option<UserId>,
}

impl RequestFilter {
    pub fn open() -> Self {
        Self {
            status: Some(RequestStatus::Open),
            ..Self::default()
        }
    }

    fn to_filter(&self) -> Filter {
        Filter::new()
            .eq_opt("status", self.status.map(RequestStatus::label))
            .eq_opt("subject", self.subject.clone())
            .eq_opt("location", self.location.clone())
            .eq_opt("student_id", self.student_id.clone())
    }
}

/// Owns tuition requests and their open -> closed lifecycle.
#[derive(Clone)]
pub struct RequestStore {
    stores: Stores,
}

impl RequestStore {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn create(&self, actor: &Actor, new_request: NewRequest) -> MarketplaceResult<Request> {
        if actor.role != Role::Student {
            return Err(MarketplaceError::forbidden(actor, "post tuition requests"));
        }
        new_request.validate()?;

        let details = new_request
            .additional_details
            .map(|details| details.trim().to_string())
            .filter(|details| !details.is_empty());
        let request = Request {
            id: RequestId::generate(),
            student_id: actor.user_id.clone(),
            subject: new_request.subject.trim().to_string(),
            class_level: new_request.class_level.trim().to_string(),
            location: new_request.location.trim().to_string(),
            tuition_type: new_request.tuition_type.trim().to_string(),
            salary_range: new_request.salary_range.trim().to_string(),
            additional_details: details,
            status: RequestStatus::Open,
            created_at: Utc::now(),
        };

        let stored = self.stores.requests.insert(request).await?;
        info!(request_id = %stored.id, student_id = %stored.student_id, "tuition request posted");
        Ok(stored)
    }

    pub async fn get(&self, id: &RequestId) -> MarketplaceResult<Request> {
        self.stores
            .requests
            .fetch(id.as_str())
            .await?
            .ok_or_else(|| MarketplaceError::not_found("request", id))
    }

    /// Matching requests, newest first.
    pub async fn list(&self, filter: &RequestFilter) -> MarketplaceResult<Vec<Request>> {
        Ok(self.stores.requests.list(&filter.to_filter()).await?)
    }

    /// Close a request. Closing an already closed request returns it unchanged.
    pub async fn close(&self, actor: &Actor, id: &RequestId) -> MarketplaceResult<Request> {
        let request = self.get(id).await?;
        if !actor.owns_or_admin(&request.student_id) {
            return Err(MarketplaceError::forbidden(actor, "close this request"));
        }
        if !request.is_open() {
            return Ok(request);
        }

        match self.close_if_open(request).await? {
            Some(closed) => {
                info!(request_id = %id, actor = %actor, "tuition request closed");
                Ok(closed)
            }
            None => self.get(id).await,
        }
    }

    /// Compare-and-set open -> closed. `None` means another writer closed it first.
    pub(crate) async fn close_if_open(&self, request: Request) -> MarketplaceResult<Option<Request>> {
        let closed = Request {
            status: RequestStatus::Closed,
            ..request
        };
        let guard = Filter::new().eq("status", RequestStatus::Open.label());
        Ok(self.stores.requests.update_if(closed, &guard).await?)
    }

    /// Undo a close performed by [`Self::close_if_open`] while compensating a failed
    /// acceptance. Only succeeds if the request is still closed.
    pub(crate) async fn reopen_after_failure(&self, request: Request) -> MarketplaceResult<()> {
        let reopened = Request {
            status: RequestStatus::Open,
            ..request
        };
        let guard = Filter::new().eq("status", RequestStatus::Closed.label());
        if self.stores.requests.update_if(reopened, &guard).await?.is_none() {
            warn!("request changed while compensating a failed acceptance");
        }
        Ok(())
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: &RequestId,
        changes: RequestChanges,
    ) -> MarketplaceResult<Request> {
        let mut request = self.get(id).await?;
        if !actor.owns_or_admin(&request.student_id) {
            return Err(MarketplaceError::forbidden(actor, "edit this request"));
        }
        changes.apply_to(&mut request)?;

        match self.stores.requests.update(request).await {
            Ok(updated) => Ok(updated),
            Err(crate::store::RepositoryError::NotFound) => {
                Err(MarketplaceError::not_found("request", id))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Hard delete. Applications and matches referencing the request are left in place.
    pub async fn delete(&self, actor: &Actor, id: &RequestId) -> MarketplaceResult<()> {
        let request = self.get(id).await?;
        if !actor.owns_or_admin(&request.student_id) {
            return Err(MarketplaceError::forbidden(actor, "delete this request"));
        }

        let dependents = self
            .stores
            .applications
            .list(&Filter::new().eq("request_id", id.as_str()))
            .await?
            .len();
        if !self.stores.requests.delete(id.as_str()).await? {
            return Err(MarketplaceError::not_found("request", id));
        }
        if dependents > 0 {
            warn!(request_id = %id, dependents, "deleted request still referenced by applications");
        }
        info!(request_id = %id, actor = %actor, "tuition request deleted");
        Ok(())
    }
}
