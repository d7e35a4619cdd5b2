use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::tickets::{InboundMessage, InboundOutcome};

/// POST /webhook/whatsapp - inbound message from the channel collaborator.
///
/// The 200 acknowledgement goes out only after the mutation committed; a 503
/// leaves the message unacknowledged so the upstream channel redelivers.
pub async fn whatsapp_webhook(
    State(state): State<AppState>,
    Json(msg): Json<InboundMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.resolver.resolve_inbound(msg).await?;

    let body = match outcome {
        InboundOutcome::MatchedExisting { ticket, reply } => json!({
            "success": true,
            "data": {
                "outcome": "matched_existing",
                "ticket": ticket,
                "reply": reply,
            }
        }),
        InboundOutcome::CreatedNew { ticket } => json!({
            "success": true,
            "data": {
                "outcome": "created_new",
                "ticket": ticket,
            }
        }),
    };
    Ok(Json(body))
}
