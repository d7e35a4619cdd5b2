use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use waticket_api::config;
use waticket_api::database;
use waticket_api::handlers::{self, AppState};
use waticket_api::middleware::agent_context_middleware;
use waticket_api::tickets::{
    MemoryTicketStore, NoopGateway, OutboundGateway, PgTicketStore, TicketStore,
    WhatsAppCloudGateway,
};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL and the
    // WhatsApp credentials.
    let _ = dotenvy::dotenv();

    let config = config::config();
    tracing_subscriber::fmt::init();
    tracing::info!("starting waticket API in {:?} mode", config.environment);

    let store = build_store().await;
    let gateway = build_gateway();
    let state = AppState::new(store, gateway);
    spawn_event_logger(&state);

    let app = app(state);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("waticket API listening on http://{}", bind_addr);
    axum::serve(listener, app).await.expect("server");
}

async fn build_store() -> Arc<dyn TicketStore> {
    if database::manager::is_configured() {
        let pool = database::manager::pool().await.expect("database pool");
        let store = PgTicketStore::new(pool);
        store.ensure_schema().await.expect("ticket schema");
        Arc::new(store)
    } else {
        tracing::warn!("DATABASE_URL not set; using in-memory ticket store (state is not durable)");
        Arc::new(MemoryTicketStore::new())
    }
}

fn build_gateway() -> Arc<dyn OutboundGateway> {
    let wa = &config::config().whatsapp;
    match (&wa.phone_number_id, &wa.access_token) {
        (Some(phone_number_id), Some(token)) => Arc::new(WhatsAppCloudGateway::new(
            &wa.api_base,
            phone_number_id,
            token.clone(),
        )),
        _ => {
            tracing::warn!("WhatsApp credentials not set; outbound replies will not be delivered");
            Arc::new(NoopGateway)
        }
    }
}

/// Log every lifecycle event; dashboards subscribe to the same channel.
fn spawn_event_logger(state: &AppState) {
    let mut rx = state.notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(
                    event = event.name(),
                    ticket = %event.ticket().id,
                    "lifecycle event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger lagged behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // Inbound channel webhook (no agent identity; the upstream channel
        // authenticates at the edge)
        .route("/webhook/whatsapp", post(handlers::webhook::whatsapp_webhook))
        // Agent-facing API
        .merge(ticket_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn ticket_routes() -> Router<AppState> {
    use handlers::tickets;

    Router::new()
        .route(
            "/api/tickets",
            get(tickets::ticket_list).post(tickets::ticket_create),
        )
        .route("/api/tickets/:id", get(tickets::ticket_get))
        .route("/api/tickets/:id/claim", post(tickets::ticket_claim))
        .route("/api/tickets/:id/reply", post(tickets::ticket_reply))
        .route("/api/tickets/:id/close", post(tickets::ticket_close))
        .route("/api/tickets/:id/reopen", post(tickets::ticket_reopen))
        .route_layer(axum::middleware::from_fn(agent_context_middleware))
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Waticket API",
            "version": version,
            "description": "WhatsApp support ticketing backend (Axum)",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "webhook": "/webhook/whatsapp (channel collaborator)",
                "tickets": "/api/tickets[/:id] (agent identity required)",
                "actions": "/api/tickets/:id/{claim,reply,close,reopen}",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.engine.store().ping().await {
        Ok(()) => (
            axum::http::StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "store": "ok" }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "ticket store unavailable",
                "data": { "status": "degraded", "timestamp": now, "store_error": e.to_string() }
            })),
        ),
    }
}
