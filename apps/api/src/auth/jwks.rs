//! Identity-provider token verification against its published JSON Web Key Set.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::auth::{AuthError, SessionClaims, SessionVerifier};

/// How long a fetched key set is trusted before it is fetched again.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);
/// Minimum gap between fetch attempts, so tokens with unknown kids can't force one per request.
const JWKS_REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

/// Claims as issued by the identity provider.
#[derive(Debug, Deserialize)]
pub struct ProviderClaims {
    pub sub: String,
    pub exp: i64,
    pub email: Option<ProviderEmail>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderEmail {
    pub address: String,
}

impl From<ProviderClaims> for SessionClaims {
    fn from(claims: ProviderClaims) -> Self {
        SessionClaims {
            sub: claims.sub,
            email: claims.email.map(|e| e.address),
            exp: claims.exp,
        }
    }
}

/// Verifies RS256 session tokens with keys fetched from `{api_url}/.well-known/jwks.json`.
pub struct JwksVerifier {
    http: Client,
    jwks_url: String,
    audience: Option<String>,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_refresh: RwLock<Option<Instant>>,
    last_attempt: RwLock<Option<Instant>>,
}

impl JwksVerifier {
    pub fn new(api_url: &str, audience: Option<String>) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::KeySet(e.to_string()))?;

        Ok(Self {
            http,
            jwks_url: jwks_url(api_url),
            audience,
            keys: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
            last_attempt: RwLock::new(None),
        })
    }

    async fn refresh_keys(&self) -> Result<(), AuthError> {
        debug!("Refreshing JWKS keys from {}", self.jwks_url);

        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::KeySet(e.to_string()))?;
        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| AuthError::KeySet(e.to_string()))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys.into_iter().filter(|k| k.kty == "RSA") {
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                continue;
            };
            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(err) => warn!("Skipping malformed JWK {}: {err}", jwk.kid),
            }
        }

        let key_count = keys.len();
        *self.keys.write().await = keys;
        *self.last_refresh.write().await = Some(Instant::now());

        debug!("Refreshed {key_count} JWKS keys");
        Ok(())
    }

    /// Returns the key for `kid`, refreshing the set when stale or when the kid is
    /// unknown, at most once per cooldown.
    async fn get_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let cached = self.keys.read().await.get(kid).cloned();
        let last_refresh = *self.last_refresh.read().await;
        let last_attempt = *self.last_attempt.read().await;

        if should_refresh(last_refresh, last_attempt, cached.is_some()) {
            *self.last_attempt.write().await = Some(Instant::now());
            if let Err(e) = self.refresh_keys().await {
                warn!("Failed to refresh JWKS keys: {e}");
            }
        } else if let Some(key) = cached {
            return Ok(key);
        }

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

#[async_trait]
impl SessionVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token missing key id".to_string()))?;

        let key = self.get_key(&kid).await?;

        let data = decode::<ProviderClaims>(token, &key, &self.validation())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(data.claims.into())
    }
}

fn should_refresh(
    last_refresh: Option<Instant>,
    last_attempt: Option<Instant>,
    have_key: bool,
) -> bool {
    if last_attempt.is_some_and(|at| at.elapsed() < JWKS_REFRESH_COOLDOWN) {
        return false;
    }
    let stale = last_refresh.map_or(true, |at| at.elapsed() > JWKS_CACHE_TTL);
    stale || !have_key
}

fn jwks_url(api_url: &str) -> String {
    format!("{}/.well-known/jwks.json", api_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwks_url_strips_trailing_slash() {
        assert_eq!(
            jwks_url("https://auth.example.com/"),
            "https://auth.example.com/.well-known/jwks.json"
        );
        assert_eq!(
            jwks_url("https://auth.example.com"),
            "https://auth.example.com/.well-known/jwks.json"
        );
    }

    #[test]
    fn test_provider_claims_flatten_email() {
        let raw = r#"{
            "sub": "b4c1f1d2-0000-4000-8000-000000000001",
            "exp": 1735689600,
            "aud": ["localhost"],
            "email": {"address": "sam@example.com", "is_primary": true, "is_verified": true}
        }"#;
        let claims: ProviderClaims = serde_json::from_str(raw).unwrap();
        let session: SessionClaims = claims.into();
        assert_eq!(session.sub, "b4c1f1d2-0000-4000-8000-000000000001");
        assert_eq!(session.email.as_deref(), Some("sam@example.com"));
        assert_eq!(session.exp, 1735689600);
    }

    #[test]
    fn test_provider_claims_without_email() {
        let claims: ProviderClaims =
            serde_json::from_str(r#"{"sub": "abc", "exp": 1}"#).unwrap();
        assert_eq!(SessionClaims::from(claims).email, None);
    }

    fn ago(secs: u64) -> Instant {
        Instant::now()
            .checked_sub(Duration::from_secs(secs))
            .unwrap()
    }

    #[test]
    fn test_refresh_when_never_fetched_or_stale() {
        assert!(should_refresh(None, None, false));
        assert!(should_refresh(Some(ago(7200)), Some(ago(7200)), true));
        assert!(!should_refresh(Some(ago(60)), Some(ago(60)), true));
    }

    #[test]
    fn test_unknown_kid_refresh_respects_cooldown() {
        assert!(!should_refresh(Some(ago(5)), Some(ago(5)), false));
        assert!(!should_refresh(None, Some(ago(1)), false));
        assert!(should_refresh(Some(ago(45)), Some(ago(45)), false));
    }

    #[tokio::test]
    async fn test_unknown_kid_does_not_refetch_within_cooldown() {
        let verifier = JwksVerifier::new("http://127.0.0.1:9", None).unwrap();
        *verifier.last_attempt.write().await = Some(Instant::now());
        *verifier.last_refresh.write().await = Some(Instant::now());

        let err = verifier.get_key("forged-kid").await.err().unwrap();
        assert!(matches!(err, AuthError::UnknownKey(_)));
        assert!(verifier.last_attempt.read().await.unwrap().elapsed() < JWKS_REFRESH_COOLDOWN);
    }

    #[tokio::test]
    async fn test_malformed_token_rejected_before_key_lookup() {
        let verifier = JwksVerifier::new("http://127.0.0.1:9", None).unwrap();
        let err = verifier.verify("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }
}
