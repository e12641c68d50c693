//! Supabase Record Store
//!
//! Talks to the PostgREST interface at `{SUPABASE_URL}/rest/v1` using the
//! service-role key, which bypasses row-level security.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;

use crate::error::{PaymentError, Result};
use crate::store::{
    EventPurchase, RecordStore, SubscriptionActivation, SubscriptionChange,
};

const PROFILES: &str = "user_profiles";
const PURCHASES: &str = "event_purchases";
const EVENTS: &str = "events";

#[derive(Serialize)]
struct QrCodePatch {
    has_qr_code: bool,
    qr_code_enabled: bool,
}

/// Supabase (PostgREST) client
pub struct SupabaseStore {
    http: Client,
    rest_url: String,
    service_key: String,
}

impl SupabaseStore {
    /// Create a new Supabase store
    pub fn new(project_url: &str, service_key: &str) -> Self {
        Self {
            http: Client::new(),
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            service_key: service_key.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| PaymentError::Config("SUPABASE_URL not set".into()))?;
        let key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| PaymentError::Config("SUPABASE_SERVICE_ROLE_KEY not set".into()))?;

        Ok(Self::new(&url, &key))
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    /// `PATCH` every row where `column = value`, returning the matched row count
    async fn update_where<T: Serialize + Sync>(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: &T,
    ) -> Result<u64> {
        let response = self
            .http
            .patch(self.table_url(table))
            .query(&[(column, format!("eq.{value}"))])
            .header("apikey", self.service_key.as_str())
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await
            .map_err(|e| PaymentError::Storage(e.to_string()))?;

        let rows: Vec<serde_json::Value> = Self::ensure_success(table, response)
            .await?
            .json()
            .await
            .map_err(|e| PaymentError::Storage(e.to_string()))?;

        Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX))
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<()> {
        let response = self
            .http
            .post(self.table_url(table))
            .header("apikey", self.service_key.as_str())
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(|e| PaymentError::Storage(e.to_string()))?;

        Self::ensure_success(table, response).await?;
        Ok(())
    }

    async fn ensure_success(table: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(PaymentError::Storage(format!("{table}: {status} {body}")))
    }
}

#[async_trait]
impl RecordStore for SupabaseStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn activate_subscription(
        &self,
        user_id: &str,
        activation: &SubscriptionActivation,
    ) -> Result<u64> {
        self.update_where(PROFILES, "id", user_id, activation).await
    }

    async fn update_subscription_status(
        &self,
        subscription_id: &str,
        change: &SubscriptionChange,
    ) -> Result<u64> {
        self.update_where(PROFILES, "stripe_subscription_id", subscription_id, change)
            .await
    }

    async fn insert_purchase(&self, purchase: &EventPurchase) -> Result<()> {
        self.insert(PURCHASES, purchase).await
    }

    async fn enable_event_qr(&self, event_id: &str) -> Result<u64> {
        let patch = QrCodePatch {
            has_qr_code: true,
            qr_code_enabled: true,
        };
        self.update_where(EVENTS, "id", event_id, &patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use axum::{
        http::{HeaderMap, Method, StatusCode, Uri},
        Router,
    };
    use chrono::Utc;

    use crate::store::SubscriptionStatus;

    const KEY: &str = "service-key";

    /// One request as PostgREST saw it
    #[derive(Debug)]
    struct Seen {
        method: Method,
        path: String,
        query: Option<String>,
        headers: HeaderMap,
        body: serde_json::Value,
    }

    impl Seen {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).and_then(|v| v.to_str().ok())
        }
    }

    /// Serve `reply` with `status` for every request and record what arrived
    async fn postgrest(
        status: StatusCode,
        reply: &'static str,
    ) -> (SupabaseStore, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();

        let app = Router::new().fallback(
            move |method: Method, uri: Uri, headers: HeaderMap, body: String| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push(Seen {
                        method,
                        path: uri.path().to_string(),
                        query: uri.query().map(str::to_string),
                        headers,
                        body: serde_json::from_str(&body).unwrap_or_default(),
                    });
                    (status, [("content-type", "application/json")], reply)
                }
            },
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        (SupabaseStore::new(&format!("http://{addr}/"), KEY), seen)
    }

    fn assert_service_role(seen: &Seen) {
        assert_eq!(seen.header("apikey"), Some(KEY));
        assert_eq!(seen.header("authorization"), Some("Bearer service-key"));
    }

    #[test]
    fn test_rest_url_trims_trailing_slash() {
        let store = SupabaseStore::new("https://abc.supabase.co/", KEY);
        assert_eq!(store.table_url(PROFILES), "https://abc.supabase.co/rest/v1/user_profiles");
    }

    #[tokio::test]
    async fn test_activation_patches_profile_by_id() {
        let (store, seen) = postgrest(StatusCode::OK, r#"[{"id":"u1"}]"#).await;
        let activation = SubscriptionActivation {
            subscription_plan: "pro".into(),
            subscription_status: SubscriptionStatus::Active,
            subscription_expiry: Utc::now(),
            stripe_customer_id: Some("cus_1".into()),
            stripe_subscription_id: None,
        };

        let matched = store.activate_subscription("u1", &activation).await.unwrap();
        assert_eq!(matched, 1);

        let seen = seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.method, Method::PATCH);
        assert_eq!(request.path, "/rest/v1/user_profiles");
        assert_eq!(request.query.as_deref(), Some("id=eq.u1"));
        assert_eq!(request.header("prefer"), Some("return=representation"));
        assert_service_role(request);
        assert_eq!(request.body["subscription_plan"], "pro");
        assert_eq!(request.body["subscription_status"], "active");
        assert_eq!(request.body["stripe_customer_id"], "cus_1");
        assert!(request.body.get("stripe_subscription_id").is_none());
    }

    #[tokio::test]
    async fn test_status_change_counts_returned_rows() {
        let (store, seen) = postgrest(StatusCode::OK, "[{},{}]").await;
        let change = SubscriptionChange {
            subscription_status: SubscriptionStatus::Inactive,
            subscription_expiry: None,
        };

        let matched = store.update_subscription_status("sub_1", &change).await.unwrap();
        assert_eq!(matched, 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].query.as_deref(), Some("stripe_subscription_id=eq.sub_1"));
        assert_eq!(seen[0].body, serde_json::json!({"subscription_status": "inactive"}));
    }

    #[tokio::test]
    async fn test_unmatched_update_is_zero() {
        let (store, _) = postgrest(StatusCode::OK, "[]").await;
        assert_eq!(store.enable_event_qr("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enable_event_qr_sets_both_flags() {
        let (store, seen) = postgrest(StatusCode::OK, r#"[{"id":"e1"}]"#).await;

        assert_eq!(store.enable_event_qr("e1").await.unwrap(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::PATCH);
        assert_eq!(seen[0].path, "/rest/v1/events");
        assert_eq!(seen[0].query.as_deref(), Some("id=eq.e1"));
        assert_eq!(
            seen[0].body,
            serde_json::json!({"has_qr_code": true, "qr_code_enabled": true})
        );
    }

    #[tokio::test]
    async fn test_purchase_is_posted() {
        let (store, seen) = postgrest(StatusCode::CREATED, "").await;
        let purchase = EventPurchase {
            user_id: "u1".into(),
            event_id: None,
            package_type: "small".into(),
            stripe_payment_intent_id: Some("pi_1".into()),
            amount: Some(1500),
            currency: Some("usd".into()),
            purchased_at: Utc::now(),
        };

        store.insert_purchase(&purchase).await.unwrap();

        let seen = seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/rest/v1/event_purchases");
        assert_eq!(request.query, None);
        assert_eq!(request.header("prefer"), Some("return=minimal"));
        assert_service_role(request);
        assert_eq!(request.body["package_type"], "small");
        assert_eq!(request.body["stripe_payment_intent_id"], "pi_1");
        assert!(request.body["event_id"].is_null());
        assert!(request.body["purchased_at"].is_string());
    }

    #[tokio::test]
    async fn test_server_error_is_storage_error() {
        let (store, _) = postgrest(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"message":"relation does not exist"}"#,
        )
        .await;

        let err = store.enable_event_qr("e1").await.unwrap_err();
        let PaymentError::Storage(message) = err else {
            panic!("expected a storage error, got {err:?}");
        };
        assert!(message.contains("500"), "{message}");
        assert!(message.contains("relation does not exist"), "{message}");
        assert!(PaymentError::Storage(message).is_retryable());
    }
}
