use axum::http::StatusCode;

use crate::store::RepositoryError;

use super::domain::{Actor, ApplicationId, RequestId, UserId};

/// Error raised by the marketplace services.
#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: &'static str,
        to: &'static str,
    },
    #[error("missing or malformed fields: {}", .fields.join(", "))]
    ValidationFailed { fields: Vec<&'static str> },
    #[error("request {request_id} is closed to new applications")]
    RequestClosed { request_id: RequestId },
    #[error("tutor {tutor_id} already applied to request {request_id} as {existing}")]
    DuplicateApplication {
        request_id: RequestId,
        tutor_id: UserId,
        existing: ApplicationId,
    },
    #[error("{actor} may not {action}")]
    Forbidden { actor: String, action: &'static str },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl MarketplaceError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn transition(
        entity: &'static str,
        id: impl ToString,
        from: &'static str,
        to: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id: id.to_string(),
            from,
            to,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MarketplaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            MarketplaceError::InvalidTransition { .. }
            | MarketplaceError::RequestClosed { .. }
            | MarketplaceError::DuplicateApplication { .. } => StatusCode::CONFLICT,
            MarketplaceError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            MarketplaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            MarketplaceError::Repository(err) => err.status_code(),
        }
    }

    pub(crate) fn forbidden(actor: &impl ToString, action: &'static str) -> Self {
        Self::Forbidden {
            actor: actor.to_string(),
            action,
        }
    }
}

pub type MarketplaceResult<T> = Result<T, MarketplaceError>;

pub(crate) fn require_admin(actor: &Actor, action: &'static str) -> MarketplaceResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(MarketplaceError::forbidden(actor, action))
    }
}
