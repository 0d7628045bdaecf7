use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::applications::queries::mark_application_paid;
use crate::auth::AuthSession;
use crate::errors::AppError;
use crate::payments::{is_checkout_session_id, unit_amount, CheckoutRequest, CheckoutSession};
use crate::profiles::queries::find_user_by_email;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub order_total: Option<f64>,
    pub job_id: Option<i64>,
    pub job_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutReturnQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
    #[serde(rename = "unitAmount")]
    pub unit_amount: Option<String>,
    #[serde(rename = "userEmail")]
    pub user_email: Option<String>,
    pub session_id: Option<String>,
}

/// Success URL the processor redirects to. The session id placeholder is
/// appended verbatim so the processor can substitute it.
pub fn success_url(
    origin: &str,
    job_id: i64,
    unit_amount: i64,
    email: Option<&str>,
) -> Result<String, AppError> {
    let base = format!("{}/api/checkout_sessions", origin.trim_end_matches('/'));
    let url = Url::parse_with_params(
        &base,
        &[
            ("jobId", job_id.to_string()),
            ("unitAmount", unit_amount.to_string()),
            ("userEmail", email.unwrap_or_default().to_string()),
        ],
    )
    .map_err(|e| AppError::Validation(format!("Invalid origin '{origin}': {e}")))?;
    Ok(format!("{url}&session_id={{CHECKOUT_SESSION_ID}}"))
}

fn request_origin<'a>(headers: &'a HeaderMap, fallback: &'a str) -> &'a str {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && *v != "null")
        .unwrap_or(fallback)
}

/// POST /api/checkout_sessions
pub async fn handle_create_checkout(
    State(state): State<AppState>,
    session: AuthSession,
    headers: HeaderMap,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutSession>, AppError> {
    let (Some(order_total), Some(job_id), Some(job_name)) = (
        req.order_total.filter(|t| *t > 0.0),
        req.job_id,
        req.job_name.filter(|n| !n.trim().is_empty()),
    ) else {
        return Err(AppError::Validation("Invalid request data".to_string()));
    };

    let amount = unit_amount(order_total);
    let origin = request_origin(&headers, &state.config.public_base_url);

    let request = CheckoutRequest {
        customer_email: session.email.clone(),
        job_id,
        product_name: job_name,
        unit_amount: amount,
        currency: state.config.checkout_currency.clone(),
        product_image: state.config.checkout_product_image.clone(),
        success_url: success_url(origin, job_id, amount, session.email.as_deref())?,
        cancel_url: format!("{}/request", origin.trim_end_matches('/')),
    };

    let checkout = state.payments.create_checkout_session(&request).await?;
    Ok(Json(checkout))
}

/// GET /api/checkout_sessions
///
/// Return leg of the hosted checkout. Failures answer 400 `{error}` rather than
/// the usual error envelope, since the browser lands here directly.
pub async fn handle_checkout_return(
    State(state): State<AppState>,
    Query(query): Query<CheckoutReturnQuery>,
) -> Response {
    match confirm_payment(&state, &query).await {
        Ok(()) => Redirect::to(&format!(
            "{}/applications?status=success-payment",
            state.config.public_base_url.trim_end_matches('/')
        ))
        .into_response(),
        Err(message) => {
            warn!("Error updating application payment: {message}");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
        }
    }
}

async fn confirm_payment(state: &AppState, query: &CheckoutReturnQuery) -> Result<(), String> {
    let job_id: i64 = query
        .job_id
        .as_deref()
        .and_then(|v| v.parse().ok())
        .ok_or("jobId is required")?;
    let session_id = query
        .session_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or("session_id is required")?;
    if !is_checkout_session_id(session_id) {
        return Err("Invalid session_id".to_string());
    }

    let checkout = state
        .payments
        .retrieve_checkout_session(session_id)
        .await
        .map_err(|e| e.to_string())?;

    if !checkout.is_paid() {
        return Err("Checkout session has not been paid".to_string());
    }
    if let Some(reference) = &checkout.client_reference_id {
        if reference != &job_id.to_string() {
            return Err("Checkout session does not belong to this job".to_string());
        }
    }

    let email = checkout
        .customer_email
        .clone()
        .or_else(|| query.user_email.clone())
        .filter(|e| !e.is_empty())
        .ok_or("userEmail is required")?;
    let amount = checkout
        .amount_total
        .or_else(|| query.unit_amount.as_deref().and_then(|v| v.parse().ok()))
        .ok_or("unitAmount is required")?;

    let user = find_user_by_email(&state.db, &email)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("User not found")?;

    let application = mark_application_paid(&state.db, job_id, user.id, amount)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("Application not found")?;

    info!(
        "Application {} for job {} paid ({} minor units)",
        application.id, job_id, amount
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_success_url_encodes_email_and_keeps_placeholder() {
        let url = success_url("https://app.test/", 7, 500, Some("sam+1@example.com")).unwrap();
        assert!(url.starts_with("https://app.test/api/checkout_sessions?jobId=7&unitAmount=500"));
        assert!(url.contains("userEmail=sam%2B1%40example.com"));
        assert!(url.ends_with("&session_id={CHECKOUT_SESSION_ID}"));
    }

    #[test]
    fn test_success_url_rejects_bad_origin() {
        assert!(success_url("not a url", 7, 500, None).is_err());
    }

    #[test]
    fn test_request_origin_falls_back() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_origin(&headers, "https://fallback"), "https://fallback");
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://app.test"));
        assert_eq!(request_origin(&headers, "https://fallback"), "https://app.test");
    }
}
