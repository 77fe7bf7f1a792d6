pub mod relay_routes;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes::relay_routes::{health_handler, relay_handler, CHAT_ID_HEADER};
use crate::state::AppState;

pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let auth_header = HeaderName::from_bytes(state.auth_header.as_bytes())
        .unwrap_or(HeaderName::from_static("x-user-id"));

    let mut cors = CorsLayer::new()
        .allow_methods([Method::POST, Method::GET])
        .allow_headers([header::CONTENT_TYPE, auth_header])
        .expose_headers([HeaderName::from_static(CHAT_ID_HEADER)]);
    if let Ok(origin) = HeaderValue::from_str(cors_origin) {
        cors = cors.allow_origin(origin);
    }

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/messages", post(relay_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
