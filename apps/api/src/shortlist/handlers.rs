use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::auth::AuthSession;
use crate::errors::AppError;
use crate::jobs::queries::{find_job, touch_job};
use crate::models::application::ApplicationStatus;
use crate::models::job::JobRow;
use crate::models::user::UserRow;
use crate::profiles::queries::require_user;
use crate::shortlist::pool::process_with_concurrency;
use crate::state::AppState;

/// Applicants updated at once when propagating a shortlist.
pub const SHORTLIST_CONCURRENCY: usize = 2;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortlistRequest {
    pub job_id: Option<i64>,
    pub shortlisted_applicants_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortlistResponse {
    pub job: JobRow,
    pub updated_users: Vec<UserRow>,
    pub failed_user_ids: Vec<i64>,
}

/// Links one applicant to the job's shortlist and flags their application.
async fn shortlist_applicant(
    pool: &PgPool,
    job_id: i64,
    user_id: i64,
) -> Result<UserRow, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO job_shortlists (job_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(job_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE applications
        SET status = $3, updated_at = now()
        WHERE job_id = $1 AND applicant_id = $2
        "#,
    )
    .bind(job_id)
    .bind(user_id)
    .bind(ApplicationStatus::Shortlisted.as_str())
    .execute(&mut *tx)
    .await?;

    let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(user)
}

/// POST /api/shortlist
///
/// The job is touched first; applicants are then processed two at a time.
/// Individual failures are reported back, not rolled back.
pub async fn handle_shortlist(
    State(state): State<AppState>,
    session: AuthSession,
    Json(req): Json<ShortlistRequest>,
) -> Result<Json<ShortlistResponse>, AppError> {
    let (Some(job_id), Some(mut applicant_ids)) = (req.job_id, req.shortlisted_applicants_ids)
    else {
        return Err(AppError::Validation(
            "Job ID and shortlisted applicants are required".to_string(),
        ));
    };
    applicant_ids.sort_unstable();
    applicant_ids.dedup();

    let user = require_user(&state.db, &session.auth_provider_id).await?;
    let job = find_job(&state.db, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;
    if job.user_id != user.id {
        return Err(AppError::Forbidden(
            "Only the job owner can shortlist applicants".to_string(),
        ));
    }

    let job = touch_job(&state.db, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

    let db = &state.db;
    let outcome = process_with_concurrency(applicant_ids, SHORTLIST_CONCURRENCY, |user_id| {
        shortlist_applicant(db, job_id, user_id)
    })
    .await;

    let failed_user_ids: Vec<i64> = outcome
        .errors
        .iter()
        .map(|(user_id, e)| {
            warn!("Failed to shortlist user {user_id} for job {job_id}: {e}");
            *user_id
        })
        .collect();

    info!(
        "Shortlist for job {job_id}: {} updated, {} failed",
        outcome.results.len(),
        failed_user_ids.len()
    );

    Ok(Json(ShortlistResponse {
        job,
        updated_users: outcome.results,
        failed_user_ids,
    }))
}
