//! HTTP Handlers

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use mixer_payments::{CheckoutRequest, PaymentError, Plan, PlanCatalog, PlanPricing};

use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub store: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
        }),
    )
}

fn payments_disabled() -> ApiError {
    error(
        StatusCode::SERVICE_UNAVAILABLE,
        "PAYMENTS_DISABLED",
        "Payments not configured",
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.checkout.is_some() && state.webhooks.is_some(),
        store: state.store,
    })
}

/// Pricing catalog
pub async fn list_plans(State(state): State<AppState>) -> Json<PlanCatalog> {
    Json(state.plans.as_ref().clone())
}

/// Single plan by id (`basic`, `pro`, `premium`)
pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan): Path<String>,
) -> Result<Json<PlanPricing>, ApiError> {
    Plan::parse(&plan)
        .and_then(|plan| state.plans.get(plan))
        .cloned()
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "UNKNOWN_PLAN", format!("No plan named {plan}")))
}

/// Create Stripe checkout session
pub async fn create_checkout(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let checkout = state.checkout.as_ref().ok_or_else(payments_disabled)?;

    let request: CheckoutRequest = serde_json::from_str(&body).map_err(|e| {
        tracing::warn!("Unreadable checkout request: {}", e);
        error(StatusCode::BAD_REQUEST, "INVALID_BODY", "Request body must be JSON")
    })?;

    let session = checkout.create_checkout_session(request).await.map_err(|e| match e {
        PaymentError::InvalidRequest(ref reason) => {
            tracing::warn!("Rejected checkout request: {}", reason);
            error(StatusCode::BAD_REQUEST, "MISSING_PARAMETERS", e.user_message())
        }
        _ => {
            tracing::error!("Error creating checkout session: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CHECKOUT_ERROR",
                "Internal server error",
            )
        }
    })?;

    Ok(Json(CheckoutResponse {
        session_id: session.id,
    }))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, ApiError> {
    let webhooks = state.webhooks.as_ref().ok_or_else(payments_disabled)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error(
                StatusCode::BAD_REQUEST,
                "MISSING_SIGNATURE",
                "Missing Stripe signature",
            )
        })?;

    let event = webhooks.parse_event(&body, signature).map_err(|e| {
        tracing::warn!("Webhook signature verification failed: {}", e);
        error(
            StatusCode::BAD_REQUEST,
            "INVALID_SIGNATURE",
            "Webhook signature verification failed",
        )
    })?;

    // Store failures are logged inside; Stripe always gets an acknowledgement
    let outcome = webhooks.handle(event).await;
    tracing::debug!(?outcome, "Webhook handled");

    Ok(Json(WebhookAck { received: true }))
}

/// Any method other than POST on the payment endpoints
pub async fn method_not_allowed() -> ApiError {
    error(
        StatusCode::METHOD_NOT_ALLOWED,
        "METHOD_NOT_ALLOWED",
        "Method not allowed",
    )
}
