//! Subscription Plan Catalog
//!
//! The tiers shown on the pricing page. Stripe price ids can be overridden
//! per deployment; everything else is fixed copy.

use serde::{Deserialize, Serialize};

/// Subscription plan tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Basic,
    Pro,
    Premium,
}

impl Plan {
    pub const ALL: [Self; 3] = [Self::Basic, Self::Pro, Self::Premium];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "pro" => Some(Self::Pro),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }

    /// Environment variable overriding the Stripe price id
    const fn price_env(self) -> &'static str {
        match self {
            Self::Basic => "STRIPE_PRICE_BASIC",
            Self::Pro => "STRIPE_PRICE_PRO",
            Self::Premium => "STRIPE_PRICE_PREMIUM",
        }
    }

    const fn default_price_id(self) -> &'static str {
        match self {
            Self::Basic => "price_basic_monthly",
            Self::Pro => "price_pro_monthly",
            Self::Premium => "price_premium_monthly",
        }
    }

    /// Get pricing for this plan
    pub fn pricing(self, price_id: impl Into<String>) -> PlanPricing {
        let (name, cents, features): (&str, i64, &[&str]) = match self {
            Self::Basic => (
                "Basic Plan",
                999,
                &[
                    "Up to 5 events per month",
                    "2GB storage",
                    "Up to 100 guests per event",
                    "Basic analytics",
                    "Email support",
                ],
            ),
            Self::Pro => (
                "Pro Plan",
                1999,
                &[
                    "Up to 25 events per month",
                    "10GB storage",
                    "Up to 500 guests per event",
                    "Advanced analytics",
                    "Priority support",
                    "Custom branding",
                ],
            ),
            Self::Premium => (
                "Premium Plan",
                3999,
                &[
                    "Unlimited events",
                    "50GB storage",
                    "Unlimited guests",
                    "Premium analytics",
                    "24/7 phone support",
                    "White-label solution",
                    "API access",
                ],
            ),
        };

        PlanPricing {
            id: self,
            name: name.into(),
            cents,
            interval: BillingInterval::Monthly,
            price_id: price_id.into(),
            features: features.iter().map(|f| (*f).to_string()).collect(),
            popular: self == Self::Pro,
        }
    }
}

/// Billing interval; every tier is billed monthly
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
}

/// Pricing information
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPricing {
    pub id: Plan,
    pub name: String,
    pub cents: i64,
    pub interval: BillingInterval,
    pub price_id: String,
    pub features: Vec<String>,
    pub popular: bool,
}

/// The priced tiers offered on the pricing page
#[derive(Clone, Debug, Serialize)]
pub struct PlanCatalog {
    pub plans: Vec<PlanPricing>,
}

impl PlanCatalog {
    /// Catalog with the default price ids
    pub fn new() -> Self {
        Self::with_prices(|plan| plan.default_price_id().to_string())
    }

    /// Create from environment variables, falling back to default price ids
    pub fn from_env() -> Self {
        Self::with_prices(|plan| {
            std::env::var(plan.price_env()).unwrap_or_else(|_| plan.default_price_id().to_string())
        })
    }

    fn with_prices(price_for: impl Fn(Plan) -> String) -> Self {
        Self {
            plans: Plan::ALL
                .into_iter()
                .map(|plan| plan.pricing(price_for(plan)))
                .collect(),
        }
    }

    pub fn get(&self, plan: Plan) -> Option<&PlanPricing> {
        self.plans.iter().find(|p| p.id == plan)
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::new()
    }
}
