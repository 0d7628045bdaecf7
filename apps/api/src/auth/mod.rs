//! Session authentication against the external identity provider.
//!
//! Handlers that require a logged-in user take [`AuthSession`] as an extractor;
//! public handlers simply don't. Verification itself sits behind the
//! [`SessionVerifier`] trait so the router can run against a fake in tests.

pub mod handlers;
pub mod jwks;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::errors::AppError;
use crate::state::AppState;

/// Cookie the session token is stored under after onboarding.
pub const SESSION_COOKIE: &str = "hanko-token";
/// Legacy cookie set by the identity provider's own web component.
pub const PROVIDER_COOKIE: &str = "hanko";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session token missing")]
    MissingToken,

    #[error("invalid session token: {0}")]
    InvalidToken(String),

    #[error("no signing key for kid '{0}'")]
    UnknownKey(String),

    #[error("failed to fetch key set: {0}")]
    KeySet(String),
}

/// Claims extracted from a verified session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Subject id at the identity provider.
    pub sub: String,
    pub email: Option<String>,
    pub exp: i64,
}

#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<SessionClaims, AuthError>;
}

/// Authenticated caller, extracted from the request by verifying its session token.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub auth_provider_id: String,
    pub email: Option<String>,
    pub exp: i64,
    /// The raw token, re-issued as a cookie during onboarding.
    pub token: String,
}

impl AuthSession {
    fn new(claims: SessionClaims, token: String) -> Self {
        Self {
            auth_provider_id: claims.sub,
            email: claims.email,
            exp: claims.exp,
            token,
        }
    }
}

/// Finds the session token. Lookup order: `Authorization: Bearer`, the
/// `hanko-token` header, the `hanko-token` cookie, the `hanko` header, the `hanko` cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };
    let jar = CookieJar::from_headers(headers);
    let cookie_value = |name: &str| {
        jar.get(name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| header_value(SESSION_COOKIE))
        .or_else(|| cookie_value(SESSION_COOKIE))
        .or_else(|| header_value(PROVIDER_COOKIE))
        .or_else(|| cookie_value(PROVIDER_COOKIE))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(&parts.headers).ok_or(AuthError::MissingToken)?;
        let claims = state.sessions.verify(&token).await?;
        debug!("Session verified for subject {}", claims.sub);
        Ok(AuthSession::new(claims, token))
    }
}
