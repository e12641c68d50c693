//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Caller supplied missing or malformed fields
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend record store error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Stripe(_) | Self::Storage(_))
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Stripe(_) => "Payment processing failed. Please try again.",
            Self::WebhookSignature(_) => "Webhook signature verification failed",
            Self::WebhookParse(_) => "Webhook payload could not be read",
            Self::InvalidRequest(_) => "Missing required parameters",
            Self::Config(_) => "Service configuration error.",
            Self::Storage(_) => "Internal server error",
        }
    }
}
