//! MemoryMixer web server
//!
//! Axum server for the marketing pages, Stripe checkout session creation
//! and the Stripe webhook endpoint.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixer_payments::{
    CheckoutService, MemoryRecordStore, PlanCatalog, RecordStore, StripeClient, SupabaseStore,
    WebhookHandler,
};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    // Backend records
    let store: Arc<dyn RecordStore> = match SupabaseStore::from_env() {
        Ok(store) => {
            tracing::info!("✓ Supabase configured");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!("⚠ {} - webhook updates go to an in-memory store", e);
            tracing::warn!("  Set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY in .env");
            Arc::new(MemoryRecordStore::new())
        }
    };

    // Initialize payments
    let checkout = StripeClient::from_env()
        .map(|stripe| Arc::new(CheckoutService::new(Arc::new(stripe), &config.app_url)));
    let webhooks = WebhookHandler::from_env(store.clone()).map(Arc::new);

    match (&checkout, &webhooks) {
        (Ok(_), Ok(_)) => tracing::info!("✓ Stripe configured"),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled ({})", e);
            tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
        }
    }

    // Build application state
    let state = AppState {
        checkout: checkout.ok(),
        webhooks: webhooks.ok(),
        plans: Arc::new(PlanCatalog::from_env()),
        store: store.name(),
    };

    let app = routes::router(state, &config.static_dir);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("MemoryMixer server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Redirects return to {}", config.app_url);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                      - Health check");
    tracing::info!("  GET  /api/plans                   - Pricing catalog");
    tracing::info!("  POST /api/create-checkout-session - Create Stripe checkout");
    tracing::info!("  POST /api/webhook                 - Stripe webhook");
    tracing::info!("  GET  /*                           - Pages from {}", config.static_dir.display());

    axum::serve(listener, app).await?;

    Ok(())
}
