use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::tickets::correlation::derive_subject;
use crate::tickets::model::{
    AgentContext, NewTicket, TicketFilter, TicketOrigin, TicketPriority,
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
}

/// GET /api/tickets?filter=all|open|mine - newest first.
pub async fn ticket_list(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentContext>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = match query.filter.as_deref() {
        None | Some("all") => TicketFilter::All,
        Some("open") => TicketFilter::Open,
        Some("mine") => TicketFilter::AssignedTo(agent.id),
        Some(other) => {
            return Err(ApiError::bad_request(format!("unknown filter '{}'", other)))
        }
    };
    let tickets = state.engine.list(filter).await?;
    Ok(Json(json!({ "success": true, "data": tickets })))
}

/// GET /api/tickets/:id - ticket plus ordered replies.
pub async fn ticket_get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (ticket, replies) = state.engine.get_with_replies(id).await?;
    Ok(Json(json!({
        "success": true,
        "data": { "ticket": ticket, "replies": replies }
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub customer_name: String,
    pub channel_id: String,
    pub message: String,
    pub subject: Option<String>,
    pub priority: Option<TicketPriority>,
}

/// POST /api/tickets - manual creation from the dashboard (walk-in or phone
/// customer), as opposed to the webhook path.
pub async fn ticket_create(
    State(state): State<AppState>,
    Extension(_agent): Extension<AgentContext>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }
    let subject = req
        .subject
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| derive_subject(&req.message));
    let ticket = state
        .engine
        .create(
            NewTicket {
                customer_name: req.customer_name,
                channel_id: req.channel_id,
                subject,
                message: req.message,
                priority: req.priority.unwrap_or_default(),
                origin: TicketOrigin::Manual,
            },
            Utc::now(),
        )
        .await?;
    Ok(Json(json!({ "success": true, "data": ticket })))
}

/// POST /api/tickets/:id/claim - take ownership of an unassigned ticket.
/// Losing a race returns 409 ALREADY_ASSIGNED with no state change.
pub async fn ticket_claim(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state.arbiter.claim(id, &agent).await?;
    Ok(Json(json!({ "success": true, "data": ticket })))
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub text: String,
}

/// POST /api/tickets/:id/reply - assignee answers the customer. A failed
/// outbound delivery still returns success, with a warning attached.
pub async fn ticket_reply(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.engine.reply(id, &agent, req.text).await?;
    let mut body = json!({
        "success": true,
        "data": { "ticket": outcome.ticket, "reply": outcome.reply }
    });
    if let Some(warning) = outcome.delivery_warning {
        body["warning"] = json!(warning);
    }
    Ok(Json(body))
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseRequest {
    pub note: Option<String>,
}

/// POST /api/tickets/:id/close - assignee closes with an optional note.
pub async fn ticket_close(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentContext>,
    Path(id): Path<Uuid>,
    body: Option<Json<CloseRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let note = body.and_then(|Json(req)| req.note);
    let ticket = state.engine.close(id, &agent, note).await?;
    Ok(Json(json!({ "success": true, "data": ticket })))
}

/// POST /api/tickets/:id/reopen - admin only; restores the pre-closure
/// assignee.
pub async fn ticket_reopen(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state.engine.reopen(id, &agent).await?;
    Ok(Json(json!({ "success": true, "data": ticket })))
}
