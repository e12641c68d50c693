//! Stripe Webhook Handling
//!
//! Maps verified Stripe events onto profile, purchase and event records.
//! Handling never fails once an event is verified: store errors are logged
//! and the delivery is still acknowledged, so Stripe does not redeliver it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::sync::Arc;

use crate::checkout::{META_EVENT_ID, META_PLAN_NAME, META_USER_ID};
use crate::error::{PaymentError, Result};
use crate::signature::{StripeEvent, WebhookVerifier};
use crate::store::{
    EventPurchase, RecordStore, SubscriptionActivation, SubscriptionChange, SubscriptionStatus,
};

/// How long a freshly activated subscription is considered paid for
pub const ACTIVATION_PERIOD_DAYS: i64 = 30;

/// A field that Stripe sends either as an id or as an expanded object
#[derive(Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

fn expandable_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Expandable>::deserialize(deserializer)?.map(|field| match field {
        Expandable::Id(id) | Expandable::Object { id } => id,
    }))
}

fn metadata_value<'a>(metadata: Option<&'a HashMap<String, String>>, key: &str) -> Option<&'a str> {
    metadata
        .and_then(|m| m.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// The `checkout.session` object of a completed checkout
#[derive(Clone, Debug, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub subscription: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl CompletedSession {
    fn meta(&self, key: &str) -> Option<&str> {
        metadata_value(self.metadata.as_ref(), key)
    }
}

/// The `subscription` object of a subscription change
#[derive(Clone, Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub status: String,
    /// Unix seconds
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

/// The `invoice` object of an invoice payment event
#[derive(Clone, Debug, Deserialize)]
pub struct InvoiceObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub subscription: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

/// Parsed webhook event
#[derive(Clone, Debug)]
pub enum WebhookEvent {
    /// Checkout completed in subscription mode - activate the plan
    SubscriptionCheckoutCompleted(CompletedSession),

    /// Checkout completed in payment mode - record the event package
    PaymentCheckoutCompleted(CompletedSession),

    /// Subscription updated or deleted - sync status and expiry
    SubscriptionChanged {
        event_type: String,
        subscription: SubscriptionObject,
    },

    /// Invoice paid - logged only
    InvoicePaid(InvoiceObject),

    /// Invoice payment failed - logged only
    InvoicePaymentFailed(InvoiceObject),

    /// Unhandled event type
    Other { event_type: String },
}

impl WebhookEvent {
    /// Classify a verified Stripe event by its type
    pub fn classify(event: &StripeEvent) -> Self {
        let result = match event.event_type.as_str() {
            "checkout.session.completed" => Self::decode::<CompletedSession>(event).map(|session| {
                let mode = session.mode.clone();
                match mode.as_deref() {
                    Some("subscription") => Self::SubscriptionCheckoutCompleted(session),
                    Some("payment") => Self::PaymentCheckoutCompleted(session),
                    _ => Self::other(event),
                }
            }),
            "customer.subscription.updated" | "customer.subscription.deleted" => {
                Self::decode(event).map(|subscription| Self::SubscriptionChanged {
                    event_type: event.event_type.clone(),
                    subscription,
                })
            }
            "invoice.payment_succeeded" => Self::decode(event).map(Self::InvoicePaid),
            "invoice.payment_failed" => Self::decode(event).map(Self::InvoicePaymentFailed),
            _ => Ok(Self::other(event)),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Unreadable webhook object, ignoring event"
            );
            Self::other(event)
        })
    }

    fn decode<T: for<'de> Deserialize<'de>>(event: &StripeEvent) -> Result<T> {
        T::deserialize(&event.data.object).map_err(|e| PaymentError::WebhookParse(e.to_string()))
    }

    fn other(event: &StripeEvent) -> Self {
        Self::Other {
            event_type: event.event_type.clone(),
        }
    }
}

/// Result of a single store write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// The write went through and touched this many rows
    Applied(u64),
    /// The store returned an error (already logged)
    Failed,
}

impl WriteStatus {
    fn from_result(result: &Result<u64>) -> Self {
        match result {
            Ok(rows) => Self::Applied(*rows),
            Err(_) => Self::Failed,
        }
    }
}

/// What handling a webhook event did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    SubscriptionActivated {
        user_id: String,
        write: WriteStatus,
    },
    SubscriptionUpdated {
        subscription_id: String,
        write: WriteStatus,
    },
    PurchaseRecorded {
        user_id: String,
        purchase: WriteStatus,
        /// `None` when the purchase carried no event id
        event: Option<WriteStatus>,
    },
    /// Required metadata was missing, nothing was written
    Skipped { reason: &'static str },
    /// Acknowledged and logged without any state change
    Logged,
}

/// Webhook handler
pub struct WebhookHandler {
    verifier: WebhookVerifier,
    store: Arc<dyn RecordStore>,
}

impl WebhookHandler {
    pub fn new(verifier: WebhookVerifier, store: Arc<dyn RecordStore>) -> Self {
        Self { verifier, store }
    }

    /// Create from environment variables
    pub fn from_env(store: Arc<dyn RecordStore>) -> Result<Self> {
        let secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(WebhookVerifier::new(secret), store))
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(&self, payload: &str, signature: &str) -> Result<StripeEvent> {
        self.verifier.construct_event(payload, signature)
    }

    /// Process a verified webhook event
    pub async fn handle(&self, event: StripeEvent) -> WebhookOutcome {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            livemode = event.livemode,
            created = ?event.created,
            "Processing Stripe webhook"
        );

        match WebhookEvent::classify(&event) {
            WebhookEvent::SubscriptionCheckoutCompleted(session) => {
                self.activate_subscription(&session).await
            }

            WebhookEvent::PaymentCheckoutCompleted(session) => self.record_purchase(&session).await,

            WebhookEvent::SubscriptionChanged {
                event_type,
                subscription,
            } => self.apply_subscription_change(&event_type, &subscription).await,

            WebhookEvent::InvoicePaid(invoice) => {
                tracing::info!(
                    invoice_id = ?invoice.id,
                    subscription_id = ?invoice.subscription,
                    "Payment succeeded for invoice"
                );
                WebhookOutcome::Logged
            }

            WebhookEvent::InvoicePaymentFailed(invoice) => {
                tracing::warn!(
                    invoice_id = ?invoice.id,
                    subscription_id = ?invoice.subscription,
                    email = ?invoice.customer_email,
                    "Payment failed for invoice"
                );
                WebhookOutcome::Logged
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                WebhookOutcome::Logged
            }
        }
    }

    async fn activate_subscription(&self, session: &CompletedSession) -> WebhookOutcome {
        let (Some(user_id), Some(plan_name)) =
            (session.meta(META_USER_ID), session.meta(META_PLAN_NAME))
        else {
            tracing::error!(session_id = %session.id, "Missing metadata in session");
            return WebhookOutcome::Skipped {
                reason: "missing userId or planName",
            };
        };

        let activation = SubscriptionActivation {
            subscription_plan: plan_name.to_string(),
            subscription_status: SubscriptionStatus::Active,
            subscription_expiry: Utc::now() + Duration::days(ACTIVATION_PERIOD_DAYS),
            stripe_customer_id: session.customer.clone(),
            stripe_subscription_id: session.subscription.clone(),
        };

        let result = self.store.activate_subscription(user_id, &activation).await;
        match &result {
            Ok(0) => tracing::warn!(user_id = %user_id, "No profile found to activate"),
            Ok(_) => tracing::info!(
                user_id = %user_id,
                plan = %plan_name,
                subscription_id = ?session.subscription,
                "Subscription activated"
            ),
            Err(e) => log_store_error(e, "Error updating subscription"),
        }

        WebhookOutcome::SubscriptionActivated {
            user_id: user_id.to_string(),
            write: WriteStatus::from_result(&result),
        }
    }

    async fn record_purchase(&self, session: &CompletedSession) -> WebhookOutcome {
        let (Some(user_id), Some(plan_name)) =
            (session.meta(META_USER_ID), session.meta(META_PLAN_NAME))
        else {
            tracing::error!(session_id = %session.id, "Missing metadata in session");
            return WebhookOutcome::Skipped {
                reason: "missing userId or planName",
            };
        };
        let event_id = session.meta(META_EVENT_ID);

        let purchase = EventPurchase {
            user_id: user_id.to_string(),
            event_id: event_id.map(str::to_string),
            package_type: plan_name.to_string(),
            stripe_payment_intent_id: session.payment_intent.clone(),
            amount: session.amount_total,
            currency: session.currency.clone(),
            purchased_at: Utc::now(),
        };

        // The two writes are independent; one failing never blocks the other
        let inserted = self.store.insert_purchase(&purchase).await.map(|()| 1);
        match &inserted {
            Ok(_) => tracing::info!(
                user_id = %user_id,
                event_id = ?event_id,
                package = %plan_name,
                "Event package purchased"
            ),
            Err(e) => log_store_error(e, "Error recording event purchase"),
        }

        let event = match event_id {
            Some(event_id) => {
                let result = self.store.enable_event_qr(event_id).await;
                match &result {
                    Ok(0) => tracing::warn!(event_id = %event_id, "No event found to enable QR code"),
                    Ok(_) => tracing::info!(event_id = %event_id, "QR code enabled for event"),
                    Err(e) => log_store_error(e, "Error updating event QR code status"),
                }
                Some(WriteStatus::from_result(&result))
            }
            None => None,
        };

        WebhookOutcome::PurchaseRecorded {
            user_id: user_id.to_string(),
            purchase: WriteStatus::from_result(&inserted),
            event,
        }
    }

    async fn apply_subscription_change(
        &self,
        event_type: &str,
        subscription: &SubscriptionObject,
    ) -> WebhookOutcome {
        let Some(user_id) = metadata_value(subscription.metadata.as_ref(), META_USER_ID) else {
            tracing::error!(
                subscription_id = %subscription.id,
                "Missing userId in subscription metadata"
            );
            return WebhookOutcome::Skipped {
                reason: "missing userId",
            };
        };

        let change = SubscriptionChange {
            subscription_status: SubscriptionStatus::from_stripe(&subscription.status),
            subscription_expiry: subscription
                .current_period_end
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        };

        // Change events are keyed by the Stripe id bound at activation
        let result = self
            .store
            .update_subscription_status(&subscription.id, &change)
            .await;
        match &result {
            Ok(0) => tracing::warn!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                "No profile bound to subscription yet"
            ),
            Ok(rows) => tracing::info!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                event_type = %event_type,
                status = ?change.subscription_status,
                rows,
                "Subscription status updated"
            ),
            Err(e) => log_store_error(e, "Error updating subscription status"),
        }

        WebhookOutcome::SubscriptionUpdated {
            subscription_id: subscription.id.clone(),
            write: WriteStatus::from_result(&result),
        }
    }
}

fn log_store_error(error: &PaymentError, message: &str) {
    tracing::error!(error = %error, retryable = error.is_retryable(), "{}", message);
}
