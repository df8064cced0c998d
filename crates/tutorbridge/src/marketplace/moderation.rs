//! Abuse reports and the user profiles administrators act on.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::Filter;

use super::domain::{
    Actor, Report, ReportId, ReportStatus, Role, UserId, UserProfile, UserStatus,
};
use super::error::{require_admin, MarketplaceError, MarketplaceResult};
use super::repository::Stores;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    #[serde(default)]
    pub reported_user_id: Option<UserId>,
    #[serde(default)]
    pub content_id: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub reason: Option<String>,
}

/// A resolved report and, when requested, the user blocked alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportResolution {
    pub report: Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_user: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    /// Case-insensitive substring of name or email.
    pub q: Option<String>,
}

#[derive(Clone)]
pub struct ModerationDesk {
    stores: Stores,
}

impl ModerationDesk {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn submit_report(&self, actor: &Actor, report: NewReport) -> MarketplaceResult<Report> {
        let reason = report.reason.trim().to_string();
        if reason.is_empty() {
            return Err(MarketplaceError::ValidationFailed {
                fields: vec!["reason"],
            });
        }

        let record = Report {
            id: ReportId::generate(),
            reporter_id: actor.user_id.clone(),
            reported_user_id: report.reported_user_id,
            content_id: report.content_id.filter(|id| !id.trim().is_empty()),
            reason,
            details: report.details.trim().to_string(),
            status: ReportStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };
        let stored = self.stores.reports.insert(record).await?;
        info!(report_id = %stored.id, reporter = %actor, reason = %stored.reason, "report submitted");
        Ok(stored)
    }

    pub async fn list_reports(
        &self,
        actor: &Actor,
        filter: &ReportFilter,
    ) -> MarketplaceResult<Vec<Report>> {
        require_admin(actor, "review reports")?;
        let filter = Filter::new()
            .eq_opt("status", filter.status.map(ReportStatus::label))
            .eq_opt("reason", filter.reason.clone());
        Ok(self.stores.reports.list(&filter).await?)
    }

    /// Resolve a pending report, optionally blocking the reported user.
    pub async fn resolve_report(
        &self,
        actor: &Actor,
        id: &ReportId,
        block_user: bool,
    ) -> MarketplaceResult<ReportResolution> {
        require_admin(actor, "resolve reports")?;
        let report = self
            .stores
            .reports
            .fetch(id.as_str())
            .await?
            .ok_or_else(|| MarketplaceError::not_found("report", id))?;
        if report.status == ReportStatus::Resolved {
            return Err(resolved_twice(id));
        }

        let resolved = Report {
            status: ReportStatus::Resolved,
            resolved_at: Some(Utc::now()),
            ..report
        };
        let guard = Filter::new().eq("status", ReportStatus::Pending.label());
        let resolved = self
            .stores
            .reports
            .update_if(resolved, &guard)
            .await?
            .ok_or_else(|| resolved_twice(id))?;
        info!(report_id = %id, actor = %actor, "report resolved");

        let blocked_user = match (&resolved.reported_user_id, block_user) {
            (Some(user_id), true) => match self.block_user(actor, user_id).await {
                Ok(user) => Some(user),
                Err(MarketplaceError::NotFound { .. }) => {
                    warn!(report_id = %id, user_id = %user_id, "reported user has no profile to block");
                    None
                }
                Err(err) => return Err(err),
            },
            (None, true) => {
                warn!(report_id = %id, "block requested but report names no user");
                None
            }
            _ => None,
        };

        Ok(ReportResolution {
            report: resolved,
            blocked_user,
        })
    }

    /// Create the profile row for a newly signed-up user. Tutors wait for approval.
    pub async fn register_user(&self, actor: &Actor, user: NewUser) -> MarketplaceResult<UserProfile> {
        if !actor.owns_or_admin(&user.id) || (user.role == Role::Admin && !actor.is_admin()) {
            return Err(MarketplaceError::forbidden(actor, "register this user"));
        }
        let name = user.name.trim().to_string();
        if name.is_empty() {
            return Err(MarketplaceError::ValidationFailed {
                fields: vec!["name"],
            });
        }

        let status = match user.role {
            Role::Tutor => UserStatus::Pending,
            Role::Student | Role::Admin => UserStatus::Active,
        };
        let profile = UserProfile {
            id: user.id,
            name,
            email: user.email.trim().to_string(),
            role: user.role,
            status,
            subjects: user
                .subjects
                .iter()
                .map(|subject| subject.trim().to_string())
                .filter(|subject| !subject.is_empty())
                .collect(),
            location: user
                .location
                .map(|location| location.trim().to_string())
                .filter(|location| !location.is_empty()),
            rating: None,
            created_at: Utc::now(),
        };
        let stored = self.stores.users.insert(profile).await?;
        info!(user_id = %stored.id, role = stored.role.label(), status = stored.status.label(), "user registered");
        Ok(stored)
    }

    pub async fn get_user(&self, id: &UserId) -> MarketplaceResult<UserProfile> {
        self.stores
            .users
            .fetch(id.as_str())
            .await?
            .ok_or_else(|| MarketplaceError::not_found("user", id))
    }

    pub async fn list_users(
        &self,
        actor: &Actor,
        filter: &UserFilter,
    ) -> MarketplaceResult<Vec<UserProfile>> {
        require_admin(actor, "list users")?;
        let query = Filter::new()
            .eq_opt("role", filter.role.map(Role::label))
            .eq_opt("status", filter.status.map(UserStatus::label));
        let users = self.stores.users.list(&query).await?;

        let needle = filter
            .q
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        Ok(match needle {
            Some(needle) => users
                .into_iter()
                .filter(|user| {
                    user.name.to_lowercase().contains(&needle)
                        || user.email.to_lowercase().contains(&needle)
                })
                .collect(),
            None => users,
        })
    }

    /// Pending tutor -> active. Approving an active tutor is a no-op.
    pub async fn approve_tutor(&self, actor: &Actor, id: &UserId) -> MarketplaceResult<UserProfile> {
        require_admin(actor, "approve tutors")?;
        let user = self.get_user(id).await?;
        if user.role != Role::Tutor {
            return Err(MarketplaceError::not_found("tutor", id));
        }
        match user.status {
            UserStatus::Active => Ok(user),
            UserStatus::Blocked => Err(MarketplaceError::transition(
                "user",
                id,
                UserStatus::Blocked.label(),
                UserStatus::Active.label(),
            )),
            UserStatus::Pending => {
                let approved = self.set_user_status(user, UserStatus::Active).await?;
                info!(user_id = %id, "tutor approved");
                Ok(approved)
            }
        }
    }

    pub async fn block_user(&self, actor: &Actor, id: &UserId) -> MarketplaceResult<UserProfile> {
        require_admin(actor, "block users")?;
        let user = self.get_user(id).await?;
        if user.status == UserStatus::Blocked {
            return Ok(user);
        }
        let blocked = self.set_user_status(user, UserStatus::Blocked).await?;
        info!(user_id = %id, actor = %actor, "user blocked");
        Ok(blocked)
    }

    /// Blocked -> active, anything else -> blocked.
    pub async fn toggle_block(&self, actor: &Actor, id: &UserId) -> MarketplaceResult<UserProfile> {
        require_admin(actor, "block users")?;
        let user = self.get_user(id).await?;
        let next = if user.status == UserStatus::Blocked {
            UserStatus::Active
        } else {
            UserStatus::Blocked
        };
        let updated = self.set_user_status(user, next).await?;
        info!(user_id = %id, status = next.label(), "user block toggled");
        Ok(updated)
    }

    async fn set_user_status(
        &self,
        user: UserProfile,
        status: UserStatus,
    ) -> MarketplaceResult<UserProfile> {
        let id = user.id.clone();
        let from = user.status;
        let guard = Filter::new().eq("status", from.label());
        let next = UserProfile { status, ..user };
        self.stores
            .users
            .update_if(next, &guard)
            .await?
            .ok_or_else(|| MarketplaceError::transition("user", &id, from.label(), status.label()))
    }
}

fn resolved_twice(id: &ReportId) -> MarketplaceError {
    MarketplaceError::transition(
        "report",
        id,
        ReportStatus::Resolved.label(),
        ReportStatus::Resolved.label(),
    )
}
