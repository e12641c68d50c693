//! Application State

use std::sync::Arc;

use mixer_payments::{CheckoutService, PlanCatalog, WebhookHandler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkout session creation (optional - None if Stripe not configured)
    pub checkout: Option<Arc<CheckoutService>>,

    /// Webhook verification and dispatch (optional - None if Stripe not configured)
    pub webhooks: Option<Arc<WebhookHandler>>,

    /// Plans shown on the pricing page
    pub plans: Arc<PlanCatalog>,

    /// Name of the record store backing the webhook handlers
    pub store: &'static str,
}
