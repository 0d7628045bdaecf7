//! Hosted checkout through the external payment processor.

pub mod handlers;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid checkout session id '{0}'")]
    InvalidSessionId(String),
}

/// Everything needed to open a hosted checkout for one application fee.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_email: Option<String>,
    pub job_id: i64,
    pub product_name: String,
    /// Price in the smallest currency unit.
    pub unit_amount: i64,
    pub currency: String,
    pub product_image: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
    pub customer_email: Option<String>,
    pub client_reference_id: Option<String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentError>;
}

/// Checkout session ids look like `cs_test_a1B2...`: the `cs_` prefix followed
/// by ASCII letters, digits and underscores.
pub fn is_checkout_session_id(id: &str) -> bool {
    id.strip_prefix("cs_").is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Converts an order total in major units (pounds) to minor units (pence).
pub fn unit_amount(order_total: f64) -> i64 {
    (order_total * 100.0).round() as i64
}
