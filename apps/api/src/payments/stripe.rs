//! Stripe Checkout over its REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::payments::{
    is_checkout_session_id, CheckoutRequest, CheckoutSession, PaymentError, PaymentProcessor,
};

const STRIPE_API_URL: &str = "https://api.stripe.com/v1";

#[derive(Debug, Deserialize)]
struct StripeError {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Result<Self, PaymentError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            secret_key,
        })
    }

    async fn parse(response: reqwest::Response) -> Result<CheckoutSession, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

/// `GET` URL of one checkout session. The id is checked and appended as a
/// single encoded path segment.
pub fn session_url(session_id: &str) -> Result<Url, PaymentError> {
    let invalid = || PaymentError::InvalidSessionId(session_id.to_string());
    if !is_checkout_session_id(session_id) {
        return Err(invalid());
    }
    let mut url = Url::parse(STRIPE_API_URL).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .extend(["checkout", "sessions", session_id]);
    Ok(url)
}

/// Form-encoded body for `POST /v1/checkout/sessions`, one card line item.
pub fn checkout_form_params(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        (
            "client_reference_id".to_string(),
            request.job_id.to_string(),
        ),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.product_name.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.unit_amount.to_string(),
        ),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];
    if let Some(email) = &request.customer_email {
        params.push(("customer_email".to_string(), email.clone()));
    }
    if let Some(image) = &request.product_image {
        params.push((
            "line_items[0][price_data][product_data][images][0]".to_string(),
            image.clone(),
        ));
    }
    params
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .post(format!("{STRIPE_API_URL}/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&checkout_form_params(request))
            .send()
            .await?;

        let session = Self::parse(response).await?;
        info!(
            "Created checkout session {} for job {}",
            session.id, request.job_id
        );
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .get(session_url(session_id)?)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let session = Self::parse(response).await?;
        debug!(
            "Checkout session {} status {:?}",
            session.id, session.payment_status
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            customer_email: Some("sam@example.com".into()),
            job_id: 42,
            product_name: "Fix leaking tap".into(),
            unit_amount: 500,
            currency: "gbp".into(),
            product_image: None,
            success_url: "https://app.test/ok".into(),
            cancel_url: "https://app.test/request".into(),
        }
    }

    fn value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_form_params_single_line_item() {
        let params = checkout_form_params(&request());
        assert_eq!(value(&params, "mode"), Some("payment"));
        assert_eq!(value(&params, "client_reference_id"), Some("42"));
        assert_eq!(
            value(&params, "line_items[0][price_data][unit_amount]"),
            Some("500")
        );
        assert_eq!(
            value(&params, "line_items[0][price_data][currency]"),
            Some("gbp")
        );
        assert_eq!(value(&params, "line_items[0][quantity]"), Some("1"));
        assert_eq!(value(&params, "customer_email"), Some("sam@example.com"));
    }

    #[test]
    fn test_form_params_optional_fields_omitted() {
        let mut req = request();
        req.customer_email = None;
        let params = checkout_form_params(&req);
        assert_eq!(value(&params, "customer_email"), None);
        assert_eq!(
            value(&params, "line_items[0][price_data][product_data][images][0]"),
            None
        );
    }

    #[test]
    fn test_session_url_stays_under_sessions() {
        let url = session_url("cs_test_a1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.stripe.com/v1/checkout/sessions/cs_test_a1"
        );
    }

    #[test]
    fn test_session_url_rejects_path_tricks() {
        for id in ["cs_x/../../customers/cus_123", "..", "cs_x%2F..", ""] {
            assert!(matches!(
                session_url(id),
                Err(PaymentError::InvalidSessionId(_))
            ));
        }
    }

    #[test]
    fn test_session_deserializes_from_stripe_shape() {
        let raw = r#"{
            "id": "cs_test_a1",
            "object": "checkout.session",
            "url": "https://checkout.stripe.com/c/pay/cs_test_a1",
            "payment_status": "paid",
            "amount_total": 500,
            "customer_email": "sam@example.com",
            "client_reference_id": "42"
        }"#;
        let session: CheckoutSession = serde_json::from_str(raw).unwrap();
        assert!(session.is_paid());
        assert_eq!(session.amount_total, Some(500));
    }
}
