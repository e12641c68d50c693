//! # mixer-payments
//!
//! Payment processing for the MemoryMixer website.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐   create    ┌─────────────────┐  redirect  ┌─────────────┐
//! │  Pricing    │────────────▶│  Stripe Hosted  │───────────▶│  /success   │
//! │  page       │  session    │  Checkout Page  │            │             │
//! └─────────────┘             └────────┬────────┘            └─────────────┘
//!                                      │ webhook (async)
//!                                      ▼
//!                             ┌─────────────────┐   update   ┌─────────────┐
//!                             │ WebhookHandler  │───────────▶│  Supabase   │
//!                             └─────────────────┘            └─────────────┘
//! ```
//!
//! The checkout side only reads identifiers supplied by the client and
//! forwards them to Stripe as session metadata. Profile, purchase and event
//! records are written exclusively by the webhook side.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mixer_payments::{CheckoutRequest, CheckoutService, StripeClient};
//!
//! let stripe = Arc::new(StripeClient::new("sk_test_xxx"));
//! let checkout = CheckoutService::new(stripe, "https://memorymixer.app");
//!
//! let session = checkout.create_checkout_session(CheckoutRequest {
//!     price_id: Some("price_pro_monthly".into()),
//!     user_id: Some("user-123".into()),
//!     plan_name: Some("pro".into()),
//!     ..Default::default()
//! }).await?;
//!
//! // Hand session.id to Stripe.js redirectToCheckout
//! ```

mod checkout;
mod error;
mod plans;
mod signature;
mod store;
mod supabase;
mod webhook;

pub use checkout::{
    CheckoutMode, CheckoutProvider, CheckoutRequest, CheckoutService, CheckoutSession,
    SessionSpec, StripeClient,
};
pub use error::{PaymentError, Result};
pub use plans::{BillingInterval, Plan, PlanCatalog, PlanPricing};
pub use signature::{StripeEvent, WebhookVerifier};
pub use store::{
    EventPurchase, EventRecord, MemoryRecordStore, RecordStore, SubscriptionActivation,
    SubscriptionChange, SubscriptionStatus, UserProfile,
};
pub use supabase::SupabaseStore;
pub use webhook::{WebhookEvent, WebhookHandler, WebhookOutcome, WriteStatus};
