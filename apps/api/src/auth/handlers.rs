use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{AuthSession, PROVIDER_COOKIE, SESSION_COOKIE};
use crate::cache::user_cache_key;
use crate::errors::AppError;
use crate::forms::FormData;
use crate::models::user::UserWithProfile;
use crate::profiles::form::{account_email, parse_experience_details, ProfileFields};
use crate::profiles::handlers::upload_profile_picture;
use crate::profiles::queries::{
    claim_user, find_user_by_email, find_user_by_provider_id, load_user_with_profile,
    upsert_profile,
};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub status: &'static str,
    pub token: String,
    pub data: TokenResponseData,
}

#[derive(Debug, Serialize)]
pub struct TokenResponseData {
    pub user: UserWithProfile,
}

#[derive(Debug, Deserialize)]
pub struct ConnectUserRequest {
    pub email: Option<String>,
}

/// Session cookie carrying the provider token. Marked secure when the request
/// arrived over HTTPS through a proxy.
fn session_cookie(token: String, headers: &HeaderMap) -> Cookie<'static> {
    let secure = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));

    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").build();
    cookie.make_removal();
    cookie
}

fn token_response(
    jar: CookieJar,
    session: AuthSession,
    headers: &HeaderMap,
    user: UserWithProfile,
) -> impl IntoResponse {
    let jar = jar.add(session_cookie(session.token.clone(), headers));
    (
        jar,
        Json(TokenResponse {
            status: "success",
            token: session.token,
            data: TokenResponseData { user },
        }),
    )
}

/// GET /api/logout
pub async fn handle_logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar
        .add(expired_cookie(SESSION_COOKIE))
        .add(expired_cookie(PROVIDER_COOKIE));
    (StatusCode::NO_CONTENT, jar)
}

/// POST /api/add-user
///
/// Onboarding: binds the verified session subject to the user with the posted
/// email, saves their profile and stores the token as the session cookie.
pub async fn handle_add_user(
    State(state): State<AppState>,
    session: AuthSession,
    jar: CookieJar,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = FormData::from_multipart(multipart).await?;
    let fields = ProfileFields::from_form(&form);
    let details = parse_experience_details(&form)?.unwrap_or_default();

    let email = account_email(session.email.as_deref(), fields.email.as_deref())?;

    let user = claim_user(&state.db, &email, &session.auth_provider_id).await?;
    let picture = upload_profile_picture(&state, &mut form).await?;
    let profile = upsert_profile(&state.db, user.id, &fields, picture.as_deref(), &details).await?;

    state
        .cache
        .invalidate(&user_cache_key(&session.auth_provider_id))
        .await;
    info!("Onboarded user {} ({})", user.id, user.email);

    let user = UserWithProfile {
        user,
        user_profile: Some(profile),
    };
    Ok(token_response(jar, session, &headers, user))
}

/// POST /api/connect-user-after-add-user
pub async fn handle_connect_user(
    State(state): State<AppState>,
    session: AuthSession,
    jar: CookieJar,
    headers: HeaderMap,
    Json(req): Json<ConnectUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::Validation("email is required".to_string()))?;

    let user = find_user_by_email(&state.db, email.trim())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user registered with {email}")))?;

    if user.auth_provider_id.as_deref() != Some(session.auth_provider_id.as_str()) {
        return Err(AppError::Forbidden(
            "This account belongs to a different session".to_string(),
        ));
    }

    let user = load_user_with_profile(&state.db, user).await?;
    Ok(token_response(jar, session, &headers, user))
}

/// GET /api/users/me
pub async fn handle_me(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<UserWithProfile>, AppError> {
    let key = user_cache_key(&session.auth_provider_id);
    if let Some(user) = state.cache.get_json::<UserWithProfile>(&key).await {
        return Ok(Json(user));
    }

    let user = find_user_by_provider_id(&state.db, &session.auth_provider_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No user is registered for this session".to_string()))?;
    let user = load_user_with_profile(&state.db, user).await?;

    state.cache.set_json(&key, &user).await;
    Ok(Json(user))
}
