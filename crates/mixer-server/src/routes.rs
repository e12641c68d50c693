//! Router

use std::path::Path;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::handlers::{
    create_checkout, get_plan, health_check, list_plans, method_not_allowed, stripe_webhook,
};
use crate::state::AppState;

pub fn router(state: AppState, static_dir: &Path) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let checkout = post(create_checkout).fallback(method_not_allowed);
    let webhook = post(stripe_webhook).fallback(method_not_allowed);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/plans", get(list_plans))
        .route("/api/plans/{plan}", get(get_plan))
        // Payments
        .route("/api/create-checkout-session", checkout.clone())
        .route("/api/webhook", webhook.clone())
        // Paths the pages and the Stripe dashboard were first configured with
        .route("/.netlify/functions/create-checkout-session", checkout)
        .route("/.netlify/functions/webhook", webhook)
        // Marketing pages
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
