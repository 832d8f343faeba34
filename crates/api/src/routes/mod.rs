//! API routes

pub mod chat;
pub mod conversations;
pub mod health;
pub mod messages;
pub mod tenant;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// `/tenant/:tenant_id/user/:user_id`
#[derive(Debug, Deserialize)]
pub struct UserPath {
    pub tenant_id: String,
    pub user_id: String,
}

/// `/tenant/:tenant_id/user/:user_id/conversation/:conversation_id`
#[derive(Debug, Deserialize)]
pub struct ConversationPath {
    pub tenant_id: String,
    pub user_id: String,
    pub conversation_id: String,
}

/// `.../conversation/:conversation_id/message/:message_id`
#[derive(Debug, Deserialize)]
pub struct MessagePath {
    pub tenant_id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub message_id: String,
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check at root level for infrastructure monitoring
    let health_routes = Router::new().route("/health", get(health::health));

    let tenant_routes = Router::new()
        .route("/status", get(health::status))
        .route("/tenant", get(tenant::list_tenants))
        .route("/activeUser", get(tenant::active_user))
        .route(
            "/tenant/:tenant_id/current-technical-user",
            get(tenant::current_technical_user),
        )
        .route("/tenant/:tenant_id/configuration", get(tenant::configurations))
        .route("/tenant/:tenant_id/test-profiles", get(tenant::test_profiles));

    let conversation_routes = Router::new()
        .route(
            "/tenant/:tenant_id/user/:user_id/conversation",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/tenant/:tenant_id/user/:user_id/conversation/:conversation_id",
            patch(conversations::rename_conversation).delete(conversations::delete_conversation),
        )
        .route(
            "/tenant/:tenant_id/user/:user_id/conversation/:conversation_id/message",
            get(conversations::list_messages),
        )
        .route(
            "/tenant/:tenant_id/user/:user_id/conversation/:conversation_id/chat",
            post(chat::chat),
        )
        .route(
            "/tenant/:tenant_id/user/:user_id/conversation/:conversation_id/message/:message_id/feedback",
            post(messages::submit_feedback),
        )
        .route(
            "/tenant/:tenant_id/user/:user_id/conversation/:conversation_id/message/:message_id/questions",
            get(messages::suggest_questions),
        )
        .route(
            "/tenant/:tenant_id/user/:user_id/conversation/:conversation_id/message/:message_id/sources",
            get(messages::message_sources),
        );

    let api_v1_routes = Router::new()
        .merge(tenant_routes)
        .merge(conversation_routes)
        .layer(DefaultBodyLimit::max(state.config.max_request_body_bytes));

    let cors = if state.config.cors_allow_any {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
