use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::applications::queries::{
    applications_for_applicant, delete_application, find_application, insert_application,
    update_application_status,
};
use crate::auth::AuthSession;
use crate::categories::categories_by_ids;
use crate::errors::{is_unique_violation, AppError};
use crate::forms::FormData;
use crate::jobs::filters::parse_datetime;
use crate::jobs::queries::{find_job, jobs_by_ids, shortlists_for_jobs};
use crate::models::application::{ApplicationRow, ApplicationStatus};
use crate::models::category::CategoryRow;
use crate::models::job::JobRow;
use crate::models::user::UserRow;
use crate::profiles::queries::require_user;
use crate::state::AppState;

/// Applications returned by `GET /api/application`.
pub const APPLICATION_LIST_LIMIT: i64 = 10;

pub const DUPLICATE_APPLICATION_MESSAGE: &str = "An application already exists for this job.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    pub job_id: Option<i64>,
    pub status: Option<String>,
    pub application_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationIdQuery {
    pub id: Option<String>,
}

#[derive(Serialize)]
pub struct ApplicationResponse {
    pub application: ApplicationRow,
}

#[derive(Serialize)]
pub struct DeletedApplicationResponse {
    pub message: &'static str,
    pub application: ApplicationRow,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationJob {
    #[serde(flatten)]
    pub job: JobRow,
    pub category: Option<CategoryRow>,
    pub short_list: Vec<UserRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationListItem {
    #[serde(flatten)]
    pub application: ApplicationRow,
    pub job: Option<ApplicationJob>,
    pub applicant: UserRow,
}

fn parse_status(value: Option<&str>) -> Result<Option<ApplicationStatus>, AppError> {
    value
        .map(|s| s.parse::<ApplicationStatus>().map_err(AppError::Validation))
        .transpose()
}

/// A second application for the same (job, applicant) pair is a client error.
fn application_insert_error(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::Validation(DUPLICATE_APPLICATION_MESSAGE.to_string())
    } else {
        AppError::Database(err)
    }
}

/// The applicant and the owner of the job may change an application.
async fn authorize(
    state: &AppState,
    user: &UserRow,
    application: &ApplicationRow,
) -> Result<(), AppError> {
    if application.applicant_id == user.id {
        return Ok(());
    }
    let owns_job = find_job(&state.db, application.job_id)
        .await?
        .is_some_and(|job| job.user_id == user.id);
    if owns_job {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the applicant or the job owner can change this application".to_string(),
        ))
    }
}

/// POST /api/application
pub async fn handle_create_application(
    State(state): State<AppState>,
    session: AuthSession,
    Json(req): Json<CreateApplicationRequest>,
) -> Result<Json<ApplicationResponse>, AppError> {
    let job_id = req
        .job_id
        .ok_or_else(|| AppError::Validation("jobId is required".to_string()))?;
    let status = parse_status(req.status.as_deref())?.unwrap_or(ApplicationStatus::Pending);
    let application_date = match req.application_date.as_deref().filter(|d| !d.is_empty()) {
        Some(raw) => parse_datetime(raw, false).ok_or_else(|| {
            AppError::Validation(format!("applicationDate must be a date, got '{raw}'"))
        })?,
        None => Utc::now(),
    };

    let applicant = require_user(&state.db, &session.auth_provider_id).await?;
    if find_job(&state.db, job_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Job {job_id} not found")));
    }

    let application = insert_application(&state.db, job_id, applicant.id, status, application_date)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                warn!("Duplicate application by user {} for job {job_id}", applicant.id);
            }
            application_insert_error(e)
        })?;

    info!(
        "Application {} created for job {job_id} by user {}",
        application.id, applicant.id
    );
    Ok(Json(ApplicationResponse { application }))
}

/// GET /api/application
pub async fn handle_list_applications(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<Vec<ApplicationListItem>>, AppError> {
    let applicant = require_user(&state.db, &session.auth_provider_id).await?;
    let applications =
        applications_for_applicant(&state.db, applicant.id, APPLICATION_LIST_LIMIT).await?;

    let job_ids: Vec<i64> = applications.iter().map(|a| a.job_id).collect();
    let mut jobs = jobs_by_ids(&state.db, &job_ids).await?;
    let category_ids: Vec<i64> = jobs.values().map(|j| j.category_id).collect();
    let categories = categories_by_ids(&state.db, &category_ids).await?;
    let shortlists = shortlists_for_jobs(&state.db, &job_ids).await?;

    let items = applications
        .into_iter()
        .map(|application| {
            let job = jobs.remove(&application.job_id).map(|job| ApplicationJob {
                category: categories.get(&job.category_id).cloned(),
                short_list: shortlists.get(&job.id).cloned().unwrap_or_default(),
                job,
            });
            ApplicationListItem {
                application,
                job,
                applicant: applicant.clone(),
            }
        })
        .collect();

    Ok(Json(items))
}

/// PUT /api/application
pub async fn handle_update_application(
    State(state): State<AppState>,
    session: AuthSession,
    multipart: Multipart,
) -> Result<Json<ApplicationResponse>, AppError> {
    let form = FormData::from_multipart(multipart).await?;
    let id: i64 = form
        .parsed("id")?
        .ok_or_else(|| AppError::Validation("Application ID is required".to_string()))?;
    let status = parse_status(form.text("status"))?
        .ok_or_else(|| AppError::Validation("Status is required".to_string()))?;

    let user = require_user(&state.db, &session.auth_provider_id).await?;
    let existing = find_application(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))?;
    authorize(&state, &user, &existing).await?;

    let application = update_application_status(&state.db, id, status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))?;
    info!("Application {id} set to {status}");
    Ok(Json(ApplicationResponse { application }))
}

/// DELETE /api/application?id=
pub async fn handle_delete_application(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<ApplicationIdQuery>,
) -> Result<Json<DeletedApplicationResponse>, AppError> {
    let id: i64 = query
        .id
        .as_deref()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| AppError::Validation("Application ID is required".to_string()))?;

    let user = require_user(&state.db, &session.auth_provider_id).await?;
    let existing = find_application(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))?;
    authorize(&state, &user, &existing).await?;

    let application = delete_application(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))?;
    info!("Application {id} deleted");
    Ok(Json(DeletedApplicationResponse {
        message: "Application deleted successfully",
        application,
    }))
}
