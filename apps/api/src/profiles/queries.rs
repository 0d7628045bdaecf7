use std::collections::HashMap;

use sqlx::{PgPool, Postgres, Transaction};

use crate::errors::{is_unique_violation, AppError};
use crate::models::profile::{ExperienceDetailRow, UserProfileRow, UserProfileWithDetails};
use crate::models::user::{UserRow, UserWithProfile};
use crate::profiles::form::{ExperienceDetailInput, ProfileFields};

pub async fn find_user_by_provider_id(
    pool: &PgPool,
    auth_provider_id: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE auth_provider_id = $1")
        .bind(auth_provider_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// The user linked to the session subject, or 404 when they never onboarded.
pub async fn require_user(pool: &PgPool, auth_provider_id: &str) -> Result<UserRow, AppError> {
    find_user_by_provider_id(pool, auth_provider_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No user is registered for this session".to_string()))
}

/// Creates the user for `email`, or binds an existing one that has no session
/// subject yet. `None` when the email already belongs to a different subject.
pub async fn upsert_user_by_email(
    pool: &PgPool,
    email: &str,
    auth_provider_id: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (email, auth_provider_id)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE
            SET auth_provider_id = EXCLUDED.auth_provider_id,
                updated_at = now()
            WHERE users.auth_provider_id IS NULL
               OR users.auth_provider_id = EXCLUDED.auth_provider_id
        RETURNING *
        "#,
    )
    .bind(email)
    .bind(auth_provider_id)
    .fetch_optional(pool)
    .await
}

/// Maps the outcome of [`upsert_user_by_email`] onto the caller-facing result:
/// an account held by another subject is forbidden, never rebound.
pub fn claimed_user(
    outcome: Result<Option<UserRow>, sqlx::Error>,
) -> Result<UserRow, AppError> {
    match outcome {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(AppError::Forbidden(
            "This email is registered to a different account".to_string(),
        )),
        Err(e) if is_unique_violation(&e) => Err(AppError::Forbidden(
            "This session is already linked to another account".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Binds the session subject to the user for `email`, refusing accounts already
/// held by someone else.
pub async fn claim_user(
    pool: &PgPool,
    email: &str,
    auth_provider_id: &str,
) -> Result<UserRow, AppError> {
    claimed_user(upsert_user_by_email(pool, email, auth_provider_id).await)
}

/// Inserts or overwrites the user's profile and replaces its experience details.
/// A `None` picture keeps the stored one.
pub async fn upsert_profile(
    pool: &PgPool,
    user_id: i64,
    fields: &ProfileFields,
    profile_picture: Option<&str>,
    details: &[ExperienceDetailInput],
) -> Result<UserProfileWithDetails, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let profile = sqlx::query_as::<_, UserProfileRow>(
        r#"
        INSERT INTO user_profiles
            (user_id, first_name, last_name, full_name, email, phone, address, city,
             state, postal_code, country, job_title, experience, education, skills, bio,
             profile_picture)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (user_id) DO UPDATE SET
            first_name = EXCLUDED.first_name,
            last_name = EXCLUDED.last_name,
            full_name = EXCLUDED.full_name,
            email = EXCLUDED.email,
            phone = EXCLUDED.phone,
            address = EXCLUDED.address,
            city = EXCLUDED.city,
            state = EXCLUDED.state,
            postal_code = EXCLUDED.postal_code,
            country = EXCLUDED.country,
            job_title = EXCLUDED.job_title,
            experience = EXCLUDED.experience,
            education = EXCLUDED.education,
            skills = EXCLUDED.skills,
            bio = EXCLUDED.bio,
            profile_picture = COALESCE(EXCLUDED.profile_picture, user_profiles.profile_picture),
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(fields.first_name.clone().unwrap_or_default())
    .bind(fields.last_name.clone().unwrap_or_default())
    .bind(fields.full_name().unwrap_or_default())
    .bind(fields.email.clone().unwrap_or_default())
    .bind(fields.phone.clone().unwrap_or_default())
    .bind(fields.address.clone().unwrap_or_default())
    .bind(fields.city.clone().unwrap_or_default())
    .bind(fields.state.clone().unwrap_or_default())
    .bind(fields.postal_code.clone().unwrap_or_default())
    .bind(fields.country.clone().unwrap_or_default())
    .bind(fields.job_title.clone().unwrap_or_default())
    .bind(fields.experience.clone().unwrap_or_default())
    .bind(fields.education.clone().unwrap_or_default())
    .bind(fields.skills.clone().unwrap_or_default())
    .bind(fields.bio.clone().unwrap_or_default())
    .bind(profile_picture)
    .fetch_one(&mut *tx)
    .await?;

    let experience_details = replace_experience_details(&mut tx, profile.id, details).await?;
    tx.commit().await?;

    Ok(UserProfileWithDetails {
        profile,
        experience_details,
    })
}

/// Partial update of an existing profile: absent fields keep their stored values,
/// and experience details are only replaced when `details` is given.
pub async fn update_profile(
    pool: &PgPool,
    profile_id: i64,
    fields: &ProfileFields,
    profile_picture: Option<&str>,
    details: Option<&[ExperienceDetailInput]>,
) -> Result<UserProfileWithDetails, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let profile = sqlx::query_as::<_, UserProfileRow>(
        r#"
        UPDATE user_profiles SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            full_name = COALESCE($4, full_name),
            email = COALESCE($5, email),
            phone = COALESCE($6, phone),
            address = COALESCE($7, address),
            city = COALESCE($8, city),
            state = COALESCE($9, state),
            postal_code = COALESCE($10, postal_code),
            country = COALESCE($11, country),
            job_title = COALESCE($12, job_title),
            experience = COALESCE($13, experience),
            education = COALESCE($14, education),
            skills = COALESCE($15, skills),
            bio = COALESCE($16, bio),
            profile_picture = COALESCE($17, profile_picture),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(profile_id)
    .bind(&fields.first_name)
    .bind(&fields.last_name)
    .bind(fields.full_name())
    .bind(&fields.email)
    .bind(&fields.phone)
    .bind(&fields.address)
    .bind(&fields.city)
    .bind(&fields.state)
    .bind(&fields.postal_code)
    .bind(&fields.country)
    .bind(&fields.job_title)
    .bind(&fields.experience)
    .bind(&fields.education)
    .bind(&fields.skills)
    .bind(&fields.bio)
    .bind(profile_picture)
    .fetch_one(&mut *tx)
    .await?;

    let experience_details = match details {
        Some(details) => replace_experience_details(&mut tx, profile.id, details).await?,
        None => {
            sqlx::query_as::<_, ExperienceDetailRow>(
                "SELECT * FROM experience_details WHERE user_profile_id = $1 ORDER BY id",
            )
            .bind(profile.id)
            .fetch_all(&mut *tx)
            .await?
        }
    };
    tx.commit().await?;

    Ok(UserProfileWithDetails {
        profile,
        experience_details,
    })
}

/// Deletes every experience detail of the profile and inserts `details` in order.
async fn replace_experience_details(
    tx: &mut Transaction<'_, Postgres>,
    profile_id: i64,
    details: &[ExperienceDetailInput],
) -> Result<Vec<ExperienceDetailRow>, sqlx::Error> {
    sqlx::query("DELETE FROM experience_details WHERE user_profile_id = $1")
        .bind(profile_id)
        .execute(&mut **tx)
        .await?;

    let mut rows = Vec::with_capacity(details.len());
    for detail in details {
        let row = sqlx::query_as::<_, ExperienceDetailRow>(
            r#"
            INSERT INTO experience_details
                (user_profile_id, company_name, role, duration, location, initial, color)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(profile_id)
        .bind(&detail.company_name)
        .bind(&detail.role)
        .bind(&detail.duration)
        .bind(&detail.location)
        .bind(&detail.initial)
        .bind(&detail.color)
        .fetch_one(&mut **tx)
        .await?;
        rows.push(row);
    }
    Ok(rows)
}

pub async fn find_profile_by_id(
    pool: &PgPool,
    profile_id: i64,
) -> Result<Option<UserProfileRow>, sqlx::Error> {
    sqlx::query_as::<_, UserProfileRow>("SELECT * FROM user_profiles WHERE id = $1")
        .bind(profile_id)
        .fetch_optional(pool)
        .await
}

pub async fn load_profile_for_user(
    pool: &PgPool,
    user_id: i64,
) -> Result<Option<UserProfileWithDetails>, sqlx::Error> {
    let profile =
        sqlx::query_as::<_, UserProfileRow>("SELECT * FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    let Some(profile) = profile else {
        return Ok(None);
    };

    let experience_details = sqlx::query_as::<_, ExperienceDetailRow>(
        "SELECT * FROM experience_details WHERE user_profile_id = $1 ORDER BY id",
    )
    .bind(profile.id)
    .fetch_all(pool)
    .await?;

    Ok(Some(UserProfileWithDetails {
        profile,
        experience_details,
    }))
}

pub async fn load_user_with_profile(
    pool: &PgPool,
    user: UserRow,
) -> Result<UserWithProfile, sqlx::Error> {
    let user_profile = load_profile_for_user(pool, user.id).await?;
    Ok(UserWithProfile { user, user_profile })
}

/// Users keyed by id, each with their profile and experience details. Ids with no
/// matching user are absent from the map.
pub async fn load_users_with_profiles(
    pool: &PgPool,
    user_ids: &[i64],
) -> Result<HashMap<i64, UserWithProfile>, sqlx::Error> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ANY($1)")
        .bind(user_ids.to_vec())
        .fetch_all(pool)
        .await?;

    let profiles =
        sqlx::query_as::<_, UserProfileRow>("SELECT * FROM user_profiles WHERE user_id = ANY($1)")
            .bind(user_ids.to_vec())
            .fetch_all(pool)
            .await?;

    let profile_ids: Vec<i64> = profiles.iter().map(|p| p.id).collect();
    let details = sqlx::query_as::<_, ExperienceDetailRow>(
        "SELECT * FROM experience_details WHERE user_profile_id = ANY($1) ORDER BY id",
    )
    .bind(profile_ids)
    .fetch_all(pool)
    .await?;

    let mut details_by_profile: HashMap<i64, Vec<ExperienceDetailRow>> = HashMap::new();
    for detail in details {
        details_by_profile
            .entry(detail.user_profile_id)
            .or_default()
            .push(detail);
    }

    let mut profiles_by_user: HashMap<i64, UserProfileWithDetails> = profiles
        .into_iter()
        .map(|profile| {
            let experience_details = details_by_profile.remove(&profile.id).unwrap_or_default();
            (
                profile.user_id,
                UserProfileWithDetails {
                    profile,
                    experience_details,
                },
            )
        })
        .collect();

    Ok(users
        .into_iter()
        .map(|user| {
            let user_profile = profiles_by_user.remove(&user.id);
            (user.id, UserWithProfile { user, user_profile })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::errors::testing::database_error;

    fn user(auth_provider_id: &str) -> UserRow {
        let now = Utc::now();
        UserRow {
            id: 7,
            email: "sam@example.com".into(),
            auth_provider_id: Some(auth_provider_id.into()),
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_claimed_user_passes_through_bound_row() {
        let row = claimed_user(Ok(Some(user("subject-a")))).unwrap();
        assert_eq!(row.auth_provider_id.as_deref(), Some("subject-a"));
    }

    #[test]
    fn test_account_of_other_subject_is_forbidden() {
        let err = claimed_user(Ok(None)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_subject_bound_elsewhere_is_forbidden() {
        let err = claimed_user(Err(database_error("23505"))).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = claimed_user(Err(sqlx::Error::RowNotFound)).unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
