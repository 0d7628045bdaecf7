use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::auth::AuthSession;
use crate::cache::user_cache_key;
use crate::errors::AppError;
use crate::forms::FormData;
use crate::models::profile::UserProfileWithDetails;
use crate::profiles::form::{account_email, parse_experience_details, ProfileFields};
use crate::profiles::queries::{
    claim_user, find_profile_by_id, find_user_by_provider_id, load_profile_for_user,
    require_user, update_profile, upsert_profile,
};
use crate::state::AppState;
use crate::storage::upload_files;

#[derive(Serialize)]
pub struct ProfileResponse {
    pub profile: UserProfileWithDetails,
}

/// Uploads the optional `image` part and returns its URL.
pub async fn upload_profile_picture(
    state: &AppState,
    form: &mut FormData,
) -> Result<Option<String>, AppError> {
    let files = form.take_files("image");
    let urls = upload_files(state.storage.as_ref(), &state.upload_ctx, files).await?;
    Ok(urls.into_iter().next())
}

/// GET /api/user-job-profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = require_user(&state.db, &session.auth_provider_id).await?;
    let profile = load_profile_for_user(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;
    Ok(Json(ProfileResponse { profile }))
}

/// POST /api/user-job-profile
pub async fn handle_upsert_profile(
    State(state): State<AppState>,
    session: AuthSession,
    multipart: Multipart,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut form = FormData::from_multipart(multipart).await?;
    let fields = ProfileFields::from_form(&form);
    let details = parse_experience_details(&form)?.unwrap_or_default();

    let user = match find_user_by_provider_id(&state.db, &session.auth_provider_id).await? {
        Some(user) => user,
        None => {
            let email = account_email(session.email.as_deref(), fields.email.as_deref())?;
            claim_user(&state.db, &email, &session.auth_provider_id).await?
        }
    };

    let picture = upload_profile_picture(&state, &mut form).await?;
    let profile = upsert_profile(&state.db, user.id, &fields, picture.as_deref(), &details).await?;

    state
        .cache
        .invalidate(&user_cache_key(&session.auth_provider_id))
        .await;
    info!("Profile {} saved for user {}", profile.profile.id, user.id);
    Ok(Json(ProfileResponse { profile }))
}

/// PUT /api/user-job-profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    session: AuthSession,
    multipart: Multipart,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut form = FormData::from_multipart(multipart).await?;
    let profile_id: i64 = form
        .parsed("id")?
        .ok_or_else(|| AppError::Validation("id is required".to_string()))?;
    let fields = ProfileFields::from_form(&form);
    let details = parse_experience_details(&form)?;

    let existing = find_profile_by_id(&state.db, profile_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {profile_id} not found")))?;
    let user = require_user(&state.db, &session.auth_provider_id).await?;
    if existing.user_id != user.id {
        return Err(AppError::Forbidden(
            "You can only update your own profile".to_string(),
        ));
    }

    let picture = upload_profile_picture(&state, &mut form).await?;
    let profile = update_profile(
        &state.db,
        profile_id,
        &fields,
        picture.as_deref(),
        details.as_deref(),
    )
    .await?;

    state
        .cache
        .invalidate(&user_cache_key(&session.auth_provider_id))
        .await;
    info!("Profile {profile_id} updated");
    Ok(Json(ProfileResponse { profile }))
}
