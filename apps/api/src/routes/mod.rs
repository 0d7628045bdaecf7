pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::applications::handlers as applications;
use crate::auth::handlers as auth;
use crate::categories;
use crate::jobs::handlers as jobs;
use crate::payments::handlers as payments;
use crate::profiles::handlers as profiles;
use crate::shortlist::handlers as shortlist;
use crate::state::AppState;

/// Request bodies (multipart uploads included) are capped at 10 MiB.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Jobs
        .route(
            "/api/jobs",
            get(jobs::handle_list_jobs).post(jobs::handle_create_job),
        )
        .route(
            "/api/jobs/:id",
            get(jobs::handle_get_job)
                .put(jobs::handle_update_job)
                .delete(jobs::handle_delete_job),
        )
        .route("/api/my-jobs", get(jobs::handle_my_jobs))
        // Applications
        .route(
            "/api/application",
            post(applications::handle_create_application)
                .get(applications::handle_list_applications)
                .put(applications::handle_update_application)
                .delete(applications::handle_delete_application),
        )
        .route("/api/shortlist", post(shortlist::handle_shortlist))
        // Users and profiles
        .route(
            "/api/user-job-profile",
            get(profiles::handle_get_profile)
                .post(profiles::handle_upsert_profile)
                .put(profiles::handle_update_profile),
        )
        .route("/api/add-user", post(auth::handle_add_user))
        .route(
            "/api/connect-user-after-add-user",
            post(auth::handle_connect_user),
        )
        .route("/api/users/me", get(auth::handle_me))
        .route("/api/logout", get(auth::handle_logout))
        .route("/api/categories", get(categories::handle_list_categories))
        // Checkout
        .route(
            "/api/checkout_sessions",
            post(payments::handle_create_checkout).get(payments::handle_checkout_return),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{AuthError, SessionClaims, SessionVerifier};
    use crate::cache::UserCache;
    use crate::config::{Config, StorageBackend};
    use crate::payments::{CheckoutRequest, CheckoutSession, PaymentError, PaymentProcessor};
    use crate::storage::testing::MemoryStorage;
    use crate::storage::UploadContext;

    const VALID_TOKEN: &str = "valid-token";

    struct FakeVerifier;

    #[async_trait]
    impl SessionVerifier for FakeVerifier {
        async fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
            if token == VALID_TOKEN {
                Ok(SessionClaims {
                    sub: "subject-1".to_string(),
                    email: Some("sam@example.com".to_string()),
                    exp: i64::MAX,
                })
            } else {
                Err(AuthError::InvalidToken("bad signature".to_string()))
            }
        }
    }

    struct RejectingPayments;

    #[async_trait]
    impl PaymentProcessor for RejectingPayments {
        async fn create_checkout_session(
            &self,
            _request: &CheckoutRequest,
        ) -> Result<CheckoutSession, PaymentError> {
            Err(PaymentError::Api {
                status: 400,
                message: "not in tests".to_string(),
            })
        }

        async fn retrieve_checkout_session(
            &self,
            _session_id: &str,
        ) -> Result<CheckoutSession, PaymentError> {
            Err(PaymentError::Api {
                status: 404,
                message: "No such checkout session".to_string(),
            })
        }
    }

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/tradesman_test".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            enable_cache: false,
            hanko_api_url: "https://auth.test".to_string(),
            hanko_audience: None,
            storage_backend: StorageBackend::Cloudinary,
            storage_folder: "stashspot".to_string(),
            s3: None,
            cloudinary: None,
            stripe_secret_key: "sk_test".to_string(),
            checkout_currency: "gbp".to_string(),
            checkout_product_image: None,
            public_base_url: "https://app.test".to_string(),
            app_env: "development".to_string(),
            seed_on_startup: false,
            port: 8080,
            rust_log: "info".to_string(),
        }
    }

    /// Router over a pool that never connects; only paths that answer before
    /// touching the database can be exercised.
    fn test_app() -> Router {
        let config = test_config();
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        build_router(AppState {
            db,
            sessions: Arc::new(FakeVerifier),
            storage: Arc::new(MemoryStorage::default()),
            upload_ctx: UploadContext::default(),
            payments: Arc::new(RejectingPayments),
            cache: UserCache::disabled(),
            config,
        })
    }

    fn authed(method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {VALID_TOKEN}"))
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        authed(method, uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let response = test_app()
            .oneshot(Request::get("/api/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["status"], 401);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_invalid_cookie_token_is_401() {
        let request = Request::get("/api/my-jobs")
            .header(header::COOKIE, "hanko-token=forged")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_checked_before_body() {
        let request = Request::post("/api/shortlist")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"jobId": 1, "shortlistedApplicantsIds": [2]}"#))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_shortlist_requires_ids() {
        let response = test_app()
            .oneshot(json_request("POST", "/api/shortlist", r#"{"jobId": 1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_checkout_requires_order_fields() {
        let response = test_app()
            .oneshot(json_request(
                "POST",
                "/api/checkout_sessions",
                r#"{"jobId": 4, "jobName": "Fix fence"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "Invalid request data"
        );
    }

    #[tokio::test]
    async fn test_checkout_with_processor_failure_is_502() {
        let response = test_app()
            .oneshot(json_request(
                "POST",
                "/api/checkout_sessions",
                r#"{"orderTotal": 5, "jobId": 4, "jobName": "Fix fence"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_checkout_return_without_session_is_400() {
        let response = test_app()
            .oneshot(
                Request::get("/api/checkout_sessions?jobId=4&unitAmount=500")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "session_id is required");
    }

    #[tokio::test]
    async fn test_checkout_return_unverified_session_is_400() {
        let response = test_app()
            .oneshot(
                Request::get("/api/checkout_sessions?jobId=4&session_id=cs_forged")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("No such checkout session"));
    }

    #[tokio::test]
    async fn test_checkout_return_rejects_malformed_session_id() {
        let response = test_app()
            .oneshot(
                Request::get(
                    "/api/checkout_sessions?jobId=4&session_id=cs_x%2F..%2F..%2Fcustomers%2Fcus_1",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid session_id");
    }

    #[tokio::test]
    async fn test_application_create_requires_job_id() {
        let response = test_app()
            .oneshot(json_request("POST", "/api/application", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "jobId is required"
        );
    }

    #[tokio::test]
    async fn test_application_delete_requires_id() {
        let request = authed("DELETE", "/api/application")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "Application ID is required"
        );
    }

    #[tokio::test]
    async fn test_application_update_requires_id() {
        let boundary = "X-TRADESMAN-BOUNDARY";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"status\"\r\n\r\n\
             ACCEPTED\r\n\
             --{boundary}--\r\n"
        );
        let request = authed("PUT", "/api/application")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "Application ID is required"
        );
    }

    #[tokio::test]
    async fn test_logout_expires_cookies() {
        let response = test_app()
            .oneshot(Request::get("/api/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().any(|c| c.starts_with("hanko-token=;")));
        assert!(cookies.iter().any(|c| c.starts_with("hanko=;")));
        assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    }
}
