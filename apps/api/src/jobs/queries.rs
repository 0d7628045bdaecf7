use std::collections::HashMap;

use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::applications::queries::applications_for_jobs;
use crate::categories::categories_by_ids;
use crate::jobs::filters::{JobFilter, Pagination};
use crate::jobs::form::{JobChanges, NewJob};
use crate::models::application::ApplicationRow;
use crate::models::category::CategoryRow;
use crate::models::job::JobRow;
use crate::models::user::{UserRow, UserWithProfile};
use crate::profiles::queries::load_users_with_profiles;

const JOBS_WITH_CATEGORY: &str = "FROM jobs j JOIN categories c ON c.id = j.category_id";

/// A search result: the job with its category and owner.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListItem {
    #[serde(flatten)]
    pub job: JobRow,
    pub category: Option<CategoryRow>,
    pub user: Option<UserWithProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationWithApplicant {
    #[serde(flatten)]
    pub application: ApplicationRow,
    pub applicant: Option<UserWithProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: JobRow,
    pub category: Option<CategoryRow>,
    pub applications: Vec<ApplicationWithApplicant>,
}

/// A job as seen by its owner.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyJob {
    #[serde(flatten)]
    pub job: JobRow,
    pub applications: Vec<ApplicationRow>,
    pub short_list: Vec<UserRow>,
}

#[derive(Debug, FromRow)]
struct ShortlistedUser {
    job_id: i64,
    #[sqlx(flatten)]
    user: UserRow,
}

pub async fn search_jobs(
    pool: &PgPool,
    filter: &JobFilter,
    pagination: Pagination,
) -> Result<(Vec<JobListItem>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) {JOBS_WITH_CATEGORY}"));
    filter.push_where(&mut count);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Postgres>::new(format!("SELECT j.* {JOBS_WITH_CATEGORY}"));
    filter.push_where(&mut select);
    select
        .push(" ORDER BY j.created_at DESC, j.id DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let jobs: Vec<JobRow> = select.build_query_as::<JobRow>().fetch_all(pool).await?;

    let category_ids: Vec<i64> = jobs.iter().map(|j| j.category_id).collect();
    let owner_ids: Vec<i64> = jobs.iter().map(|j| j.user_id).collect();
    let categories = categories_by_ids(pool, &category_ids).await?;
    let owners = load_users_with_profiles(pool, &owner_ids).await?;

    let items = jobs
        .into_iter()
        .map(|job| JobListItem {
            category: categories.get(&job.category_id).cloned(),
            user: owners.get(&job.user_id).cloned(),
            job,
        })
        .collect();

    Ok((items, total))
}

pub async fn find_job(pool: &PgPool, id: i64) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn jobs_by_ids(
    pool: &PgPool,
    ids: &[i64],
) -> Result<HashMap<i64, JobRow>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ANY($1)")
        .bind(ids.to_vec())
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|j| (j.id, j)).collect())
}

pub async fn load_job_detail(pool: &PgPool, id: i64) -> Result<Option<JobDetail>, sqlx::Error> {
    let Some(job) = find_job(pool, id).await? else {
        return Ok(None);
    };

    let category = categories_by_ids(pool, &[job.category_id])
        .await?
        .remove(&job.category_id);
    let applications = applications_for_jobs(pool, &[job.id]).await?;
    let applicant_ids: Vec<i64> = applications.iter().map(|a| a.applicant_id).collect();
    let applicants = load_users_with_profiles(pool, &applicant_ids).await?;

    let applications = applications
        .into_iter()
        .map(|application| ApplicationWithApplicant {
            applicant: applicants.get(&application.applicant_id).cloned(),
            application,
        })
        .collect();

    Ok(Some(JobDetail {
        job,
        category,
        applications,
    }))
}

pub async fn insert_job(
    pool: &PgPool,
    owner_id: i64,
    job: &NewJob,
    image: &str,
) -> Result<JobRow, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(
        r#"
        INSERT INTO jobs
            (title, description, category_id, user_id, price, city, years, image,
             start_date, end_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(&job.title)
    .bind(&job.description)
    .bind(job.category_id)
    .bind(owner_id)
    .bind(job.price)
    .bind(&job.city)
    .bind(&job.years)
    .bind(image)
    .bind(job.start_date)
    .bind(job.end_date)
    .fetch_one(pool)
    .await
}

pub async fn update_job(
    pool: &PgPool,
    id: i64,
    changes: &JobChanges,
) -> Result<JobRow, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            category_id = COALESCE($4, category_id),
            price = COALESCE($5, price),
            city = COALESCE($6, city),
            years = COALESCE($7, years),
            image = COALESCE($8, image),
            status = COALESCE($9, status),
            start_date = COALESCE($10, start_date),
            end_date = COALESCE($11, end_date),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&changes.title)
    .bind(&changes.description)
    .bind(changes.category_id)
    .bind(changes.price)
    .bind(&changes.city)
    .bind(&changes.years)
    .bind(&changes.image)
    .bind(changes.status.map(|s| s.as_str()))
    .bind(changes.start_date)
    .bind(changes.end_date)
    .fetch_one(pool)
    .await
}

pub async fn delete_job(pool: &PgPool, id: i64) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>("DELETE FROM jobs WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Bumps `updated_at` and returns the job, or `None` if it no longer exists.
pub async fn touch_job(pool: &PgPool, id: i64) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>("UPDATE jobs SET updated_at = now() WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Shortlisted users per job id.
pub async fn shortlists_for_jobs(
    pool: &PgPool,
    job_ids: &[i64],
) -> Result<HashMap<i64, Vec<UserRow>>, sqlx::Error> {
    if job_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, ShortlistedUser>(
        r#"
        SELECT s.job_id, u.*
        FROM job_shortlists s
        JOIN users u ON u.id = s.user_id
        WHERE s.job_id = ANY($1)
        ORDER BY s.created_at
        "#,
    )
    .bind(job_ids.to_vec())
    .fetch_all(pool)
    .await?;

    let mut by_job: HashMap<i64, Vec<UserRow>> = HashMap::new();
    for row in rows {
        by_job.entry(row.job_id).or_default().push(row.user);
    }
    Ok(by_job)
}

pub async fn jobs_for_owner(pool: &PgPool, owner_id: i64) -> Result<Vec<MyJob>, sqlx::Error> {
    let jobs = sqlx::query_as::<_, JobRow>(
        "SELECT * FROM jobs WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    let job_ids: Vec<i64> = jobs.iter().map(|j| j.id).collect();
    let mut applications: HashMap<i64, Vec<ApplicationRow>> = HashMap::new();
    for application in applications_for_jobs(pool, &job_ids).await? {
        applications
            .entry(application.job_id)
            .or_default()
            .push(application);
    }
    let mut shortlists = shortlists_for_jobs(pool, &job_ids).await?;

    Ok(jobs
        .into_iter()
        .map(|job| MyJob {
            applications: applications.remove(&job.id).unwrap_or_default(),
            short_list: shortlists.remove(&job.id).unwrap_or_default(),
            job,
        })
        .collect())
}
