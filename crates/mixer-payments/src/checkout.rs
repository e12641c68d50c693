//! Stripe Checkout Integration
//!
//! Creates hosted checkout sessions. The internal user id, plan name and
//! optional event id ride along as session metadata and come back on the
//! webhook events for the same session.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionPaymentMethodTypes, CreateCheckoutSessionSubscriptionData,
};

use crate::error::{PaymentError, Result};

/// Metadata key carrying the internal user id
pub const META_USER_ID: &str = "userId";
/// Metadata key carrying the plan or package name
pub const META_PLAN_NAME: &str = "planName";
/// Metadata key carrying the event id of an event package
pub const META_EVENT_ID: &str = "eventId";

/// Checkout mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    /// Recurring plan
    #[default]
    Subscription,
    /// One-time event package
    Payment,
}

impl CheckoutMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subscription" => Some(Self::Subscription),
            "payment" => Some(Self::Payment),
            _ => None,
        }
    }
}

/// Request to create a checkout session, as posted by the pricing page
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Stripe price id
    #[serde(default)]
    pub price_id: Option<String>,

    /// Internal user id (passed in from the app)
    #[serde(default)]
    pub user_id: Option<String>,

    /// Plan or event package name
    #[serde(default)]
    pub plan_name: Option<String>,

    /// Event the package is bought for
    #[serde(default)]
    pub event_id: Option<String>,

    /// `subscription` (default) or `payment`
    #[serde(default)]
    pub mode: Option<String>,
}

/// Everything a provider needs to open a hosted checkout page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSpec {
    pub price_id: String,
    pub mode: CheckoutMode,
    pub client_reference_id: String,
    pub metadata: HashMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,
    pub mode: CheckoutMode,
}

/// Something that can open hosted checkout sessions
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Create the session and return its id
    async fn create_session(&self, spec: &SessionSpec) -> Result<String>;
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;

        Ok(Self::new(&secret_key))
    }
}

#[async_trait]
impl CheckoutProvider for StripeClient {
    async fn create_session(&self, spec: &SessionSpec) -> Result<String> {
        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(spec.success_url.as_str());
        params.cancel_url = Some(spec.cancel_url.as_str());
        params.client_reference_id = Some(spec.client_reference_id.as_str());
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.metadata = Some(spec.metadata.clone());

        match spec.mode {
            CheckoutMode::Subscription => {
                params.mode = Some(CheckoutSessionMode::Subscription);
                // Subscription events only carry the subscription's own metadata
                params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
                    metadata: Some(spec.metadata.clone()),
                    ..Default::default()
                });
            }
            CheckoutMode::Payment => {
                params.mode = Some(CheckoutSessionMode::Payment);
            }
        }

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(spec.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        Ok(session.id.to_string())
    }
}

/// Validates checkout requests and hands them to a [`CheckoutProvider`]
pub struct CheckoutService {
    provider: Arc<dyn CheckoutProvider>,
    app_url: String,
}

impl CheckoutService {
    /// `app_url` is the public base URL the customer returns to
    pub fn new(provider: Arc<dyn CheckoutProvider>, app_url: &str) -> Self {
        Self {
            provider,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a Stripe Checkout session (Hosted approach)
    pub async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let spec = self.session_spec(request)?;

        let id = self.provider.create_session(&spec).await?;
        if id.is_empty() {
            return Err(PaymentError::Stripe("No session id returned".into()));
        }

        tracing::info!(
            session_id = %id,
            user_id = %spec.client_reference_id,
            mode = ?spec.mode,
            "Created checkout session"
        );

        Ok(CheckoutSession {
            id,
            mode: spec.mode,
        })
    }

    /// Validate a request and build the provider-facing session
    pub fn session_spec(&self, request: CheckoutRequest) -> Result<SessionSpec> {
        let (Some(price_id), Some(user_id), Some(plan_name)) = (
            non_empty(request.price_id),
            non_empty(request.user_id),
            non_empty(request.plan_name),
        ) else {
            return Err(PaymentError::InvalidRequest(
                "priceId, userId and planName are required".into(),
            ));
        };
        let event_id = non_empty(request.event_id);

        let mode = match request.mode.as_deref() {
            None | Some("") => CheckoutMode::default(),
            Some(other) => CheckoutMode::parse(other).ok_or_else(|| {
                PaymentError::InvalidRequest(format!("unsupported mode: {other}"))
            })?,
        };

        let mut metadata = HashMap::new();
        metadata.insert(META_USER_ID.to_string(), user_id.clone());
        metadata.insert(META_PLAN_NAME.to_string(), plan_name);
        if let Some(ref event_id) = event_id {
            metadata.insert(META_EVENT_ID.to_string(), event_id.clone());
        }

        let mut cancel_url = Url::parse(&format!("{}/subscribe", self.app_url))
            .map_err(|e| PaymentError::Config(format!("invalid app URL: {e}")))?;
        {
            let mut query = cancel_url.query_pairs_mut();
            query.append_pair("userId", &user_id);
            if let Some(ref event_id) = event_id {
                query.append_pair("eventId", event_id);
            }
        }

        Ok(SessionSpec {
            price_id,
            mode,
            client_reference_id: user_id,
            metadata,
            success_url: format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", self.app_url),
            cancel_url: cancel_url.into(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every session it is asked to create
    #[derive(Default)]
    struct RecordingProvider {
        created: Mutex<Vec<SessionSpec>>,
    }

    #[async_trait]
    impl CheckoutProvider for RecordingProvider {
        async fn create_session(&self, spec: &SessionSpec) -> Result<String> {
            let mut created = self.created.lock().unwrap();
            created.push(spec.clone());
            Ok(format!("cs_test_{}", created.len()))
        }
    }

    /// Answers every request the same way; `None` fails like a Stripe outage
    struct FixedProvider(Option<&'static str>);

    #[async_trait]
    impl CheckoutProvider for FixedProvider {
        async fn create_session(&self, _spec: &SessionSpec) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| PaymentError::Stripe("api_connection_error".into()))
        }
    }

    fn request(price: &str, user: &str, plan: &str) -> CheckoutRequest {
        CheckoutRequest {
            price_id: Some(price.into()),
            user_id: Some(user.into()),
            plan_name: Some(plan.into()),
            ..Default::default()
        }
    }

    fn service(provider: Arc<RecordingProvider>) -> CheckoutService {
        CheckoutService::new(provider, "https://memorymixer.app/")
    }

    #[tokio::test]
    async fn test_subscription_session() {
        let provider = Arc::new(RecordingProvider::default());
        let session = service(provider.clone())
            .create_checkout_session(request("price_pro_monthly", "u1", "pro"))
            .await
            .unwrap();

        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.mode, CheckoutMode::Subscription);

        let created = provider.created.lock().unwrap();
        let sent = &created[0];
        assert_eq!(sent.price_id, "price_pro_monthly");
        assert_eq!(sent.metadata.get(META_USER_ID).map(String::as_str), Some("u1"));
        assert_eq!(sent.metadata.get(META_PLAN_NAME).map(String::as_str), Some("pro"));
        assert!(!sent.metadata.contains_key(META_EVENT_ID));
        assert_eq!(
            sent.success_url,
            "https://memorymixer.app/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(sent.cancel_url, "https://memorymixer.app/subscribe?userId=u1");
    }

    #[tokio::test]
    async fn test_event_package_session() {
        let provider = Arc::new(RecordingProvider::default());
        let mut req = request("price_small", "u1", "small");
        req.event_id = Some("e 1".into());
        req.mode = Some("payment".into());

        let session = service(provider.clone())
            .create_checkout_session(req)
            .await
            .unwrap();
        assert_eq!(session.mode, CheckoutMode::Payment);

        let created = provider.created.lock().unwrap();
        assert_eq!(created[0].metadata.get(META_EVENT_ID).map(String::as_str), Some("e 1"));
        assert_eq!(
            created[0].cancel_url,
            "https://memorymixer.app/subscribe?userId=u1&eventId=e+1"
        );
    }

    #[tokio::test]
    async fn test_missing_fields_create_nothing() {
        let provider = Arc::new(RecordingProvider::default());
        let checkout = service(provider.clone());

        for req in [
            request("", "u1", "pro"),
            request("price_1", "", "pro"),
            request("price_1", "u1", "  "),
            CheckoutRequest::default(),
        ] {
            let result = checkout.create_checkout_session(req).await;
            assert!(matches!(result, Err(PaymentError::InvalidRequest(_))));
        }

        assert!(provider.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_mode_rejected() {
        let provider = Arc::new(RecordingProvider::default());
        let mut req = request("price_1", "u1", "pro");
        req.mode = Some("setup".into());

        let result = service(provider.clone()).create_checkout_session(req).await;
        assert!(matches!(result, Err(PaymentError::InvalidRequest(_))));
        assert!(provider.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_stripe_error() {
        let checkout = CheckoutService::new(Arc::new(FixedProvider(None)), "https://memorymixer.app");

        let result = checkout
            .create_checkout_session(request("price_1", "u1", "pro"))
            .await;
        assert!(matches!(result, Err(PaymentError::Stripe(_))));
    }

    #[tokio::test]
    async fn test_empty_session_id_is_error() {
        let checkout = CheckoutService::new(Arc::new(FixedProvider(Some(""))), "https://memorymixer.app");

        let result = checkout
            .create_checkout_session(request("price_1", "u1", "pro"))
            .await;
        assert!(matches!(result, Err(PaymentError::Stripe(_))));
    }

    #[test]
    fn test_request_wire_format() {
        let req: CheckoutRequest = serde_json::from_str(
            r#"{"priceId":"price_1","userId":"u1","planName":"pro","eventId":"e1"}"#,
        )
        .unwrap();
        assert_eq!(req.price_id.as_deref(), Some("price_1"));
        assert_eq!(req.event_id.as_deref(), Some("e1"));
        assert!(req.mode.is_none());
    }
}
