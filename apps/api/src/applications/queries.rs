use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::application::{ApplicationRow, ApplicationStatus};

pub async fn insert_application(
    pool: &PgPool,
    job_id: i64,
    applicant_id: i64,
    status: ApplicationStatus,
    application_date: DateTime<Utc>,
) -> Result<ApplicationRow, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(
        r#"
        INSERT INTO applications (job_id, applicant_id, status, application_date)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(applicant_id)
    .bind(status.as_str())
    .bind(application_date)
    .fetch_one(pool)
    .await
}

pub async fn find_application(pool: &PgPool, id: i64) -> Result<Option<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>("SELECT * FROM applications WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn applications_for_applicant(
    pool: &PgPool,
    applicant_id: i64,
    limit: i64,
) -> Result<Vec<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(
        "SELECT * FROM applications WHERE applicant_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(applicant_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn applications_for_jobs(
    pool: &PgPool,
    job_ids: &[i64],
) -> Result<Vec<ApplicationRow>, sqlx::Error> {
    if job_ids.is_empty() {
        return Ok(vec![]);
    }
    sqlx::query_as::<_, ApplicationRow>(
        "SELECT * FROM applications WHERE job_id = ANY($1) ORDER BY application_date DESC",
    )
    .bind(job_ids.to_vec())
    .fetch_all(pool)
    .await
}

/// Sets the status and stamps `application_date` with the current time.
pub async fn update_application_status(
    pool: &PgPool,
    id: i64,
    status: ApplicationStatus,
) -> Result<Option<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(
        r#"
        UPDATE applications
        SET status = $2, application_date = now(), updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await
}

pub async fn delete_application(
    pool: &PgPool,
    id: i64,
) -> Result<Option<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>("DELETE FROM applications WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Records a completed checkout against the (job, applicant) application.
pub async fn mark_application_paid(
    pool: &PgPool,
    job_id: i64,
    applicant_id: i64,
    amount: i64,
) -> Result<Option<ApplicationRow>, sqlx::Error> {
    sqlx::query_as::<_, ApplicationRow>(
        r#"
        UPDATE applications
        SET is_paid = TRUE, payment_amount = $3, updated_at = now()
        WHERE job_id = $1 AND applicant_id = $2
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(applicant_id)
    .bind(amount)
    .fetch_optional(pool)
    .await
}
