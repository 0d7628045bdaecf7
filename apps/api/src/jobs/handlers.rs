use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::auth::AuthSession;
use crate::categories::find_category;
use crate::errors::AppError;
use crate::forms::FormData;
use crate::jobs::filters::{JobFilter, JobSearchParams, Page, Pagination};
use crate::jobs::form::{JobChanges, NewJob};
use crate::jobs::queries::{
    delete_job, find_job, insert_job, jobs_for_owner, load_job_detail, search_jobs, update_job,
    JobDetail, JobListItem, MyJob,
};
use crate::models::job::JobRow;
use crate::models::user::UserRow;
use crate::profiles::queries::require_user;
use crate::state::AppState;
use crate::storage::upload_files;

#[derive(Serialize)]
pub struct JobResponse {
    pub job: JobRow,
}

#[derive(Serialize)]
pub struct DeletedJobResponse {
    pub message: &'static str,
    pub job: JobRow,
}

#[derive(Serialize)]
pub struct MyJobsResponse {
    pub jobs: Vec<MyJob>,
}

async fn ensure_category_exists(state: &AppState, category_id: i64) -> Result<(), AppError> {
    match find_category(&state.db, category_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::Validation(format!(
            "categoryId {category_id} does not exist"
        ))),
    }
}

/// Loads the job and checks the caller owns it.
async fn owned_job(state: &AppState, user: &UserRow, id: i64) -> Result<JobRow, AppError> {
    let job = find_job(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
    if job.user_id != user.id {
        return Err(AppError::Forbidden(
            "Only the job owner can change this job".to_string(),
        ));
    }
    Ok(job)
}

/// GET /api/jobs
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobSearchParams>,
) -> Result<Json<Page<JobListItem>>, AppError> {
    let filter = JobFilter::from_params(&params);
    let pagination = Pagination::from_params(&params);
    let (docs, total) = search_jobs(&state.db, &filter, pagination).await?;
    Ok(Json(pagination.wrap(docs, total)))
}

/// POST /api/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    session: AuthSession,
    multipart: Multipart,
) -> Result<Json<JobResponse>, AppError> {
    let mut form = FormData::from_multipart(multipart).await?;
    let new_job = NewJob::from_form(&form)?;

    let owner = require_user(&state.db, &session.auth_provider_id).await?;
    ensure_category_exists(&state, new_job.category_id).await?;

    let files = form.take_files("images");
    let urls = upload_files(state.storage.as_ref(), &state.upload_ctx, files).await?;
    let image = urls.first().map(String::as_str).unwrap_or_default();

    let job = insert_job(&state.db, owner.id, &new_job, image).await?;
    info!("Job {} created by user {}", job.id, owner.id);
    Ok(Json(JobResponse { job }))
}

/// GET /api/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<JobDetail>, AppError> {
    let job = load_job_detail(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
    Ok(Json(job))
}

/// PUT /api/jobs/:id
pub async fn handle_update_job(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<JobResponse>, AppError> {
    let mut form = FormData::from_multipart(multipart).await?;
    let mut changes = JobChanges::from_form(&form)?;

    let user = require_user(&state.db, &session.auth_provider_id).await?;
    let current = owned_job(&state, &user, id).await?;
    changes.check_against(&current)?;
    if let Some(category_id) = changes.category_id {
        ensure_category_exists(&state, category_id).await?;
    }

    let files = form.take_files("images");
    let urls = upload_files(state.storage.as_ref(), &state.upload_ctx, files).await?;
    if let Some(url) = urls.into_iter().next() {
        changes.image = Some(url);
    }

    let job = update_job(&state.db, id, &changes).await?;
    info!("Job {id} updated");
    Ok(Json(JobResponse { job }))
}

/// DELETE /api/jobs/:id
pub async fn handle_delete_job(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<i64>,
) -> Result<Json<DeletedJobResponse>, AppError> {
    let user = require_user(&state.db, &session.auth_provider_id).await?;
    owned_job(&state, &user, id).await?;

    let job = delete_job(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
    info!("Job {id} deleted");
    Ok(Json(DeletedJobResponse {
        message: "Job deleted successfully",
        job,
    }))
}

/// GET /api/my-jobs
pub async fn handle_my_jobs(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<MyJobsResponse>, AppError> {
    let user = require_user(&state.db, &session.auth_provider_id).await?;
    let jobs = jobs_for_owner(&state.db, user.id).await?;
    Ok(Json(MyJobsResponse { jobs }))
}
