use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::tickets::model::{AgentContext, AgentRole};

/// Agent identity middleware.
///
/// Authentication lives upstream; by the time a request reaches this service
/// the auth layer has verified credentials and installed the caller's
/// identity in `x-agent-id` / `x-agent-role` headers. This middleware only
/// parses those headers into an `AgentContext` extension - it never touches
/// credentials.
pub async fn agent_context_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let agent = require_agent(&headers)?;
    request.extensions_mut().insert(agent);
    Ok(next.run(request).await)
}

/// Parse the identity headers, rejecting requests without a usable identity.
pub fn require_agent(headers: &HeaderMap) -> Result<AgentContext, ApiError> {
    let id = headers
        .get("x-agent-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing x-agent-id header"))?;
    let id = Uuid::parse_str(id)
        .map_err(|_| ApiError::unauthorized("x-agent-id is not a valid UUID"))?;

    let role = match headers.get("x-agent-role").and_then(|v| v.to_str().ok()) {
        Some(raw) => AgentRole::parse(raw)
            .ok_or_else(|| ApiError::unauthorized("x-agent-role must be 'agent' or 'admin'"))?,
        None => AgentRole::Agent,
    };

    Ok(AgentContext { id, role })
}
