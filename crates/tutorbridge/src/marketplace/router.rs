use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::applications::{ApplicationChanges, NewApplication};
use super::directory::TutorSearch;
use super::domain::{
    Actor, ApplicationId, ApplicationStatus, ConversationId, PaymentId, ReportId, RequestId,
    Role, UserId,
};
use super::error::MarketplaceError;
use super::ledger::{NewPayment, PaymentFilter};
use super::matching::MatchFilter;
use super::messaging::{NewConversation, NewMessage};
use super::moderation::{NewReport, NewUser, ReportFilter, UserFilter};
use super::requests::{NewRequest, RequestChanges, RequestFilter};
use super::Marketplace;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

type Shared = State<Arc<Marketplace>>;
type Handled = Result<Response, MarketplaceError>;

/// HTTP endpoints for the marketplace. Callers are identified by the gateway through
/// the `x-user-id` and `x-user-role` headers.
pub fn marketplace_router(marketplace: Arc<Marketplace>) -> Router {
    Router::new()
        .route("/api/v1/requests", get(list_requests).post(create_request))
        .route(
            "/api/v1/requests/:request_id",
            get(get_request).patch(update_request).delete(delete_request),
        )
        .route("/api/v1/requests/:request_id/close", post(close_request))
        .route(
            "/api/v1/requests/:request_id/applications",
            get(request_applications).post(apply),
        )
        .route("/api/v1/requests/:request_id/deny", post(deny_request))
        .route("/api/v1/requests/:request_id/assign", post(assign_tutor))
        .route("/api/v1/applications/:application_id", patch(edit_application))
        .route(
            "/api/v1/applications/:application_id/status",
            post(set_application_status),
        )
        .route(
            "/api/v1/applications/:application_id/accept",
            post(accept_application),
        )
        .route("/api/v1/tutors", get(browse_tutors))
        .route("/api/v1/tutors/:user_id/applications", get(tutor_applications))
        .route("/api/v1/tutors/:user_id/feed", get(tutor_feed))
        .route("/api/v1/students/:user_id/applications", get(student_applications))
        .route("/api/v1/matches", get(list_matches))
        .route("/api/v1/payments", get(list_payments).post(record_payment))
        .route("/api/v1/payments/:payment_id/received", post(mark_received))
        .route("/api/v1/payments/:payment_id/confirm", post(confirm_payment))
        .route(
            "/api/v1/payments/:payment_id/commission/collect",
            post(collect_commission),
        )
        .route("/api/v1/analytics", get(analytics))
        .route("/api/v1/reports", get(list_reports).post(submit_report))
        .route("/api/v1/reports/:report_id/resolve", post(resolve_report))
        .route("/api/v1/users", get(list_users).post(register_user))
        .route("/api/v1/users/:user_id/approve", post(approve_tutor))
        .route("/api/v1/users/:user_id/block", post(block_user))
        .route("/api/v1/users/:user_id/toggle-block", post(toggle_block))
        .route(
            "/api/v1/conversations",
            get(list_conversations).post(open_conversation),
        )
        .route(
            "/api/v1/conversations/:conversation_id/messages",
            get(conversation_messages).post(send_message),
        )
        .route(
            "/api/v1/conversations/:conversation_id/read",
            post(mark_conversation_read),
        )
        .with_state(marketplace)
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self, "marketplace request failed");
        }
        let payload = json!({ "error": self.to_string() });
        (status, Json(payload)).into_response()
    }
}

/// Rejection for requests that arrive without usable identity headers.
#[derive(Debug)]
pub struct MissingActor;

impl IntoResponse for MissingActor {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": format!("{USER_ID_HEADER} and {USER_ROLE_HEADER} headers are required"),
        });
        (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = MissingActor;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let user_id = header(USER_ID_HEADER).ok_or(MissingActor)?;
        let role = header(USER_ROLE_HEADER)
            .and_then(Role::parse)
            .ok_or(MissingActor)?;
        Ok(Actor {
            user_id: UserId::from(user_id),
            role,
        })
    }
}

fn ok(body: impl serde::Serialize) -> Handled {
    Ok((StatusCode::OK, Json(body)).into_response())
}

fn created(body: impl serde::Serialize) -> Handled {
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Reads scoped to one user are open to that user and administrators.
fn require_self_or_admin(actor: &Actor, user_id: &UserId) -> Result<(), MarketplaceError> {
    if actor.owns_or_admin(user_id) {
        Ok(())
    } else {
        Err(MarketplaceError::Forbidden {
            actor: actor.to_string(),
            action: "read another user's records",
        })
    }
}

async fn list_requests(
    State(marketplace): Shared,
    _actor: Actor,
    Query(filter): Query<RequestFilter>,
) -> Handled {
    ok(marketplace.requests.list(&filter).await?)
}

async fn create_request(
    State(marketplace): Shared,
    actor: Actor,
    Json(request): Json<NewRequest>,
) -> Handled {
    created(marketplace.requests.create(&actor, request).await?)
}

async fn get_request(
    State(marketplace): Shared,
    _actor: Actor,
    Path(request_id): Path<String>,
) -> Handled {
    ok(marketplace.requests.get(&RequestId(request_id)).await?)
}

async fn update_request(
    State(marketplace): Shared,
    actor: Actor,
    Path(request_id): Path<String>,
    Json(changes): Json<RequestChanges>,
) -> Handled {
    ok(marketplace
        .requests
        .update(&actor, &RequestId(request_id), changes)
        .await?)
}

async fn delete_request(
    State(marketplace): Shared,
    actor: Actor,
    Path(request_id): Path<String>,
) -> Handled {
    marketplace
        .requests
        .delete(&actor, &RequestId(request_id))
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn close_request(
    State(marketplace): Shared,
    actor: Actor,
    Path(request_id): Path<String>,
) -> Handled {
    ok(marketplace
        .requests
        .close(&actor, &RequestId(request_id))
        .await?)
}

async fn request_applications(
    State(marketplace): Shared,
    actor: Actor,
    Path(request_id): Path<String>,
) -> Handled {
    let request = marketplace.requests.get(&RequestId(request_id)).await?;
    require_self_or_admin(&actor, &request.student_id)?;
    ok(marketplace.applications.list_for_request(&request.id).await?)
}

async fn apply(
    State(marketplace): Shared,
    actor: Actor,
    Path(request_id): Path<String>,
    Json(application): Json<NewApplication>,
) -> Handled {
    created(
        marketplace
            .applications
            .apply(&actor, &RequestId(request_id), application)
            .await?,
    )
}

async fn deny_request(
    State(marketplace): Shared,
    actor: Actor,
    Path(request_id): Path<String>,
) -> Handled {
    ok(marketplace
        .applications
        .deny_request(&actor, &RequestId(request_id))
        .await?)
}

#[derive(Debug, Deserialize)]
struct AssignBody {
    tutor_id: UserId,
}

async fn assign_tutor(
    State(marketplace): Shared,
    actor: Actor,
    Path(request_id): Path<String>,
    Json(body): Json<AssignBody>,
) -> Handled {
    created(
        marketplace
            .matches
            .assign_tutor(&actor, &RequestId(request_id), &body.tutor_id)
            .await?,
    )
}

async fn edit_application(
    State(marketplace): Shared,
    actor: Actor,
    Path(application_id): Path<String>,
    Json(changes): Json<ApplicationChanges>,
) -> Handled {
    ok(marketplace
        .applications
        .edit(&actor, &ApplicationId(application_id), changes)
        .await?)
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: ApplicationStatus,
}

async fn set_application_status(
    State(marketplace): Shared,
    actor: Actor,
    Path(application_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Handled {
    ok(marketplace
        .applications
        .set_status(&actor, &ApplicationId(application_id), body.status)
        .await?)
}

async fn accept_application(
    State(marketplace): Shared,
    actor: Actor,
    Path(application_id): Path<String>,
) -> Handled {
    ok(marketplace
        .matches
        .accept_application(&actor, &ApplicationId(application_id))
        .await?)
}

async fn tutor_applications(
    State(marketplace): Shared,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Handled {
    let tutor_id = UserId(user_id);
    require_self_or_admin(&actor, &tutor_id)?;
    ok(marketplace.applications.list_for_tutor(&tutor_id).await?)
}

async fn tutor_feed(
    State(marketplace): Shared,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Handled {
    let tutor_id = UserId(user_id);
    require_self_or_admin(&actor, &tutor_id)?;
    ok(marketplace
        .applications
        .open_requests_for_tutor(&tutor_id)
        .await?)
}

async fn student_applications(
    State(marketplace): Shared,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Handled {
    let student_id = UserId(user_id);
    require_self_or_admin(&actor, &student_id)?;
    ok(marketplace
        .applications
        .list_for_student(&student_id)
        .await?)
}

async fn list_matches(
    State(marketplace): Shared,
    actor: Actor,
    Query(mut filter): Query<MatchFilter>,
) -> Handled {
    // Non-admins only ever see their own matches.
    match actor.role {
        Role::Admin => {}
        Role::Tutor => filter.tutor_id = Some(actor.user_id.clone()),
        Role::Student => filter.student_id = Some(actor.user_id.clone()),
    }
    ok(marketplace.matches.list(&filter).await?)
}

async fn list_payments(
    State(marketplace): Shared,
    actor: Actor,
    Query(filter): Query<PaymentFilter>,
) -> Handled {
    ok(marketplace.ledger.list(&actor, &filter).await?)
}

async fn record_payment(
    State(marketplace): Shared,
    actor: Actor,
    Json(payment): Json<NewPayment>,
) -> Handled {
    created(marketplace.ledger.record_payment(&actor, payment).await?)
}

#[derive(Debug, Default, Deserialize)]
struct ReceivedBody {
    #[serde(default)]
    amount: Option<serde_json::Value>,
}

async fn mark_received(
    State(marketplace): Shared,
    actor: Actor,
    Path(payment_id): Path<String>,
    body: Option<Json<ReceivedBody>>,
) -> Handled {
    let amount = body
        .and_then(|Json(body)| body.amount)
        .filter(|amount| !amount.is_null())
        .map(|amount| super::domain::coerce_amount(&amount));
    ok(marketplace
        .ledger
        .mark_received(&actor, &PaymentId(payment_id), amount)
        .await?)
}

async fn confirm_payment(
    State(marketplace): Shared,
    actor: Actor,
    Path(payment_id): Path<String>,
) -> Handled {
    ok(marketplace
        .ledger
        .confirm(&actor, &PaymentId(payment_id))
        .await?)
}

async fn collect_commission(
    State(marketplace): Shared,
    actor: Actor,
    Path(payment_id): Path<String>,
) -> Handled {
    ok(marketplace
        .ledger
        .mark_commission_collected(&actor, &PaymentId(payment_id))
        .await?)
}

async fn analytics(State(marketplace): Shared, actor: Actor) -> Handled {
    ok(marketplace.analytics.summary(&actor).await?)
}

async fn list_reports(
    State(marketplace): Shared,
    actor: Actor,
    Query(filter): Query<ReportFilter>,
) -> Handled {
    ok(marketplace.moderation.list_reports(&actor, &filter).await?)
}

async fn submit_report(
    State(marketplace): Shared,
    actor: Actor,
    Json(report): Json<NewReport>,
) -> Handled {
    created(marketplace.moderation.submit_report(&actor, report).await?)
}

#[derive(Debug, Default, Deserialize)]
struct ResolveBody {
    #[serde(default)]
    block_user: bool,
}

async fn resolve_report(
    State(marketplace): Shared,
    actor: Actor,
    Path(report_id): Path<String>,
    body: Option<Json<ResolveBody>>,
) -> Handled {
    let block_user = body.map(|Json(body)| body.block_user).unwrap_or(false);
    ok(marketplace
        .moderation
        .resolve_report(&actor, &ReportId(report_id), block_user)
        .await?)
}

async fn list_users(
    State(marketplace): Shared,
    actor: Actor,
    Query(filter): Query<UserFilter>,
) -> Handled {
    ok(marketplace.moderation.list_users(&actor, &filter).await?)
}

async fn register_user(
    State(marketplace): Shared,
    actor: Actor,
    Json(user): Json<NewUser>,
) -> Handled {
    created(marketplace.moderation.register_user(&actor, user).await?)
}

async fn approve_tutor(
    State(marketplace): Shared,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Handled {
    ok(marketplace
        .moderation
        .approve_tutor(&actor, &UserId(user_id))
        .await?)
}

async fn block_user(
    State(marketplace): Shared,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Handled {
    ok(marketplace
        .moderation
        .block_user(&actor, &UserId(user_id))
        .await?)
}

async fn toggle_block(
    State(marketplace): Shared,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Handled {
    ok(marketplace
        .moderation
        .toggle_block(&actor, &UserId(user_id))
        .await?)
}

/// Tutor search is open to visitors without identity headers.
async fn browse_tutors(State(marketplace): Shared, Query(search): Query<TutorSearch>) -> Handled {
    ok(marketplace.directory.browse(&search).await?)
}

async fn list_conversations(State(marketplace): Shared, actor: Actor) -> Handled {
    ok(marketplace.messaging.list_conversations(&actor).await?)
}

async fn open_conversation(
    State(marketplace): Shared,
    actor: Actor,
    Json(pair): Json<NewConversation>,
) -> Handled {
    ok(marketplace.messaging.ensure_conversation(&actor, pair).await?)
}

async fn conversation_messages(
    State(marketplace): Shared,
    actor: Actor,
    Path(conversation_id): Path<String>,
) -> Handled {
    ok(marketplace
        .messaging
        .messages(&actor, &ConversationId(conversation_id))
        .await?)
}

async fn send_message(
    State(marketplace): Shared,
    actor: Actor,
    Path(conversation_id): Path<String>,
    Json(message): Json<NewMessage>,
) -> Handled {
    created(
        marketplace
            .messaging
            .send(&actor, &ConversationId(conversation_id), message)
            .await?,
    )
}

async fn mark_conversation_read(
    State(marketplace): Shared,
    actor: Actor,
    Path(conversation_id): Path<String>,
) -> Handled {
    let marked = marketplace
        .messaging
        .mark_read(&actor, &ConversationId(conversation_id))
        .await?;
    ok(json!({ "marked": marked }))
}
