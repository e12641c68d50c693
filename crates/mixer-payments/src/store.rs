//! Backend Record Store
//!
//! The webhook path writes user profiles, event purchases and event flags
//! through [`RecordStore`]. Field names match the backend's column names so
//! the records can be sent as-is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;

/// Subscription status stored on a user profile
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    /// Only an exact `active` Stripe status counts as active
    pub fn from_stripe(status: &str) -> Self {
        if status == "active" {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

/// A user profile row (`user_profiles`)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub subscription_plan: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub subscription_expiry: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Fields written when a subscription checkout completes
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionActivation {
    pub subscription_plan: String,
    pub subscription_status: SubscriptionStatus,
    pub subscription_expiry: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_id: Option<String>,
}

/// Fields written when Stripe reports a subscription change
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionChange {
    pub subscription_status: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_expiry: Option<DateTime<Utc>>,
}

/// A one-time event package purchase (`event_purchases`), append-only
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPurchase {
    pub user_id: String,
    pub event_id: Option<String>,
    pub package_type: String,
    pub stripe_payment_intent_id: Option<String>,
    /// Amount in the currency's minor unit
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub purchased_at: DateTime<Utc>,
}

/// The QR-code flags of an event row (`events`)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub has_qr_code: bool,
    pub qr_code_enabled: bool,
}

/// Persistence used by the webhook handlers.
///
/// Update operations return how many rows matched the filter.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short name for health output and logs
    fn name(&self) -> &'static str;

    /// Apply an activation to the profile with the given internal id
    async fn activate_subscription(
        &self,
        user_id: &str,
        activation: &SubscriptionActivation,
    ) -> Result<u64>;

    /// Apply a change to profiles bound to the given Stripe subscription id
    async fn update_subscription_status(
        &self,
        subscription_id: &str,
        change: &SubscriptionChange,
    ) -> Result<u64>;

    /// Append a purchase row
    async fn insert_purchase(&self, purchase: &EventPurchase) -> Result<()>;

    /// Turn on both QR-code flags of an event
    async fn enable_event_qr(&self, event_id: &str) -> Result<u64>;
}

/// In-memory record store (for development and tests)
#[derive(Default)]
pub struct MemoryRecordStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
    purchases: RwLock<Vec<EventPurchase>>,
    events: RwLock<HashMap<String, EventRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile row
    pub async fn seed_profile(&self, profile: UserProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }

    /// Insert an event row with both flags off
    pub async fn seed_event(&self, event_id: &str) {
        self.events.write().await.insert(
            event_id.to_string(),
            EventRecord {
                id: event_id.to_string(),
                ..Default::default()
            },
        );
    }

    pub async fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.read().await.get(user_id).cloned()
    }

    pub async fn purchases(&self) -> Vec<EventPurchase> {
        self.purchases.read().await.clone()
    }

    pub async fn event(&self, event_id: &str) -> Option<EventRecord> {
        self.events.read().await.get(event_id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn activate_subscription(
        &self,
        user_id: &str,
        activation: &SubscriptionActivation,
    ) -> Result<u64> {
        let mut profiles = self.profiles.write().await;

        let Some(profile) = profiles.get_mut(user_id) else {
            return Ok(0);
        };

        profile.subscription_plan = Some(activation.subscription_plan.clone());
        profile.subscription_status = Some(activation.subscription_status);
        profile.subscription_expiry = Some(activation.subscription_expiry);
        if let Some(customer) = &activation.stripe_customer_id {
            profile.stripe_customer_id = Some(customer.clone());
        }
        if let Some(subscription) = &activation.stripe_subscription_id {
            profile.stripe_subscription_id = Some(subscription.clone());
        }

        Ok(1)
    }

    async fn update_subscription_status(
        &self,
        subscription_id: &str,
        change: &SubscriptionChange,
    ) -> Result<u64> {
        let mut profiles = self.profiles.write().await;
        let mut matched = 0;

        for profile in profiles
            .values_mut()
            .filter(|p| p.stripe_subscription_id.as_deref() == Some(subscription_id))
        {
            profile.subscription_status = Some(change.subscription_status);
            if let Some(expiry) = change.subscription_expiry {
                profile.subscription_expiry = Some(expiry);
            }
            matched += 1;
        }

        Ok(matched)
    }

    async fn insert_purchase(&self, purchase: &EventPurchase) -> Result<()> {
        self.purchases.write().await.push(purchase.clone());
        Ok(())
    }

    async fn enable_event_qr(&self, event_id: &str) -> Result<u64> {
        let mut events = self.events.write().await;

        match events.get_mut(event_id) {
            Some(event) => {
                event.has_qr_code = true;
                event.qr_code_enabled = true;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn activation(plan: &str) -> SubscriptionActivation {
        SubscriptionActivation {
            subscription_plan: plan.into(),
            subscription_status: SubscriptionStatus::Active,
            subscription_expiry: Utc::now() + Duration::days(30),
            stripe_customer_id: Some("cus_1".into()),
            stripe_subscription_id: Some("sub_1".into()),
        }
    }

    #[test]
    fn test_status_from_stripe() {
        assert_eq!(SubscriptionStatus::from_stripe("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_stripe("trialing"), SubscriptionStatus::Inactive);
        assert_eq!(SubscriptionStatus::from_stripe("canceled"), SubscriptionStatus::Inactive);
    }

    #[test]
    fn test_activation_omits_missing_ids() {
        let mut patch = activation("essential");
        patch.stripe_customer_id = None;

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["subscription_status"], "active");
        assert_eq!(json["stripe_subscription_id"], "sub_1");
        assert!(json.get("stripe_customer_id").is_none());
    }

    #[tokio::test]
    async fn test_activation_requires_existing_profile() {
        let store = MemoryRecordStore::new();
        assert_eq!(store.activate_subscription("ghost", &activation("pro")).await.unwrap(), 0);
        assert!(store.profile("ghost").await.is_none());

        store.seed_profile(UserProfile::new("u1")).await;
        assert_eq!(store.activate_subscription("u1", &activation("pro")).await.unwrap(), 1);

        let profile = store.profile("u1").await.unwrap();
        assert_eq!(profile.subscription_plan.as_deref(), Some("pro"));
        assert_eq!(profile.stripe_subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn test_change_matches_by_subscription_id() {
        let store = MemoryRecordStore::new();
        store.seed_profile(UserProfile::new("u1")).await;
        store.activate_subscription("u1", &activation("pro")).await.unwrap();

        let change = SubscriptionChange {
            subscription_status: SubscriptionStatus::Inactive,
            subscription_expiry: None,
        };
        assert_eq!(store.update_subscription_status("sub_other", &change).await.unwrap(), 0);
        assert_eq!(store.update_subscription_status("sub_1", &change).await.unwrap(), 1);

        let profile = store.profile("u1").await.unwrap();
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::Inactive));
        assert!(profile.subscription_expiry.is_some());
    }

    #[tokio::test]
    async fn test_enable_event_qr() {
        let store = MemoryRecordStore::new();
        assert_eq!(store.enable_event_qr("e1").await.unwrap(), 0);

        store.seed_event("e1").await;
        assert_eq!(store.enable_event_qr("e1").await.unwrap(), 1);

        let event = store.event("e1").await.unwrap();
        assert!(event.has_qr_code && event.qr_code_enabled);
    }
}
