use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::forms::FormData;
use crate::jobs::filters::parse_datetime;
use crate::models::job::{JobRow, JobStatus};

/// Validated fields of a job creation form.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub title: String,
    pub description: String,
    pub category_id: i64,
    pub price: f64,
    pub city: String,
    pub years: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Fields of a job update form. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub price: Option<f64>,
    pub city: Option<String>,
    pub years: Option<String>,
    pub image: Option<String>,
    pub status: Option<JobStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

fn price(form: &FormData) -> Result<Option<f64>, AppError> {
    match form.parsed::<f64>("price")? {
        Some(p) if !p.is_finite() || p < 0.0 => Err(AppError::Validation(
            "price must be a non-negative number".to_string(),
        )),
        other => Ok(other),
    }
}

fn date(form: &FormData, name: &str, end_of_day: bool) -> Result<Option<DateTime<Utc>>, AppError> {
    form.text(name)
        .map(|v| {
            parse_datetime(v, end_of_day)
                .ok_or_else(|| AppError::Validation(format!("{name} must be a date, got '{v}'")))
        })
        .transpose()
}

fn check_dates(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    match (start, end) {
        (Some(s), Some(e)) if e < s => Err(AppError::Validation(
            "endDate must not be before startDate".to_string(),
        )),
        _ => Ok(()),
    }
}

impl NewJob {
    pub fn from_form(form: &FormData) -> Result<Self, AppError> {
        let category_id = form
            .parsed::<i64>("categoryId")?
            .ok_or_else(|| AppError::Validation("categoryId is required".to_string()))?;
        let price = price(form)?
            .ok_or_else(|| AppError::Validation("price is required".to_string()))?;
        let start_date = date(form, "startDate", false)?;
        let end_date = date(form, "endDate", true)?;
        check_dates(start_date, end_date)?;

        Ok(Self {
            title: form.required_text("title")?,
            description: form.required_text("description")?,
            category_id,
            price,
            city: form.text_or_default("city"),
            years: form.text_or_default("years"),
            start_date,
            end_date,
        })
    }
}

impl JobChanges {
    pub fn from_form(form: &FormData) -> Result<Self, AppError> {
        let status = form
            .text("status")
            .map(|s| s.parse::<JobStatus>().map_err(AppError::Validation))
            .transpose()?;
        let start_date = date(form, "startDate", false)?;
        let end_date = date(form, "endDate", true)?;
        check_dates(start_date, end_date)?;

        let text = |name: &str| form.text(name).map(str::to_string);
        Ok(Self {
            title: text("title"),
            description: text("description"),
            category_id: form.parsed("categoryId")?,
            price: price(form)?,
            city: text("city"),
            years: text("years"),
            image: text("image"),
            status,
            start_date,
            end_date,
        })
    }

    /// Checks the date range that results from applying these changes to `current`.
    pub fn check_against(&self, current: &JobRow) -> Result<(), AppError> {
        check_dates(
            self.start_date.or(current.start_date),
            self.end_date.or(current.end_date),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> FormData {
        let mut form = FormData::default();
        for (k, v) in pairs {
            form.insert_text(k, v);
        }
        form
    }

    fn valid() -> Vec<(&'static str, &'static str)> {
        vec![
            ("title", "Replace kitchen tap"),
            ("description", "Mixer tap, parts supplied"),
            ("categoryId", "1"),
            ("price", "85.50"),
            ("city", "Leeds"),
            ("startDate", "2024-06-01"),
            ("endDate", "2024-06-02"),
        ]
    }

    #[test]
    fn test_new_job_from_valid_form() {
        let job = NewJob::from_form(&form(&valid())).unwrap();
        assert_eq!(job.title, "Replace kitchen tap");
        assert_eq!(job.category_id, 1);
        assert_eq!(job.price, 85.5);
        assert_eq!(job.years, "");
        assert!(job.start_date.unwrap() < job.end_date.unwrap());
    }

    #[test]
    fn test_new_job_missing_fields() {
        let mut pairs = valid();
        pairs.retain(|(k, _)| *k != "title");
        let err = NewJob::from_form(&form(&pairs)).unwrap_err();
        assert!(err.to_string().contains("title is required"));

        let mut pairs = valid();
        pairs.retain(|(k, _)| *k != "categoryId");
        assert!(NewJob::from_form(&form(&pairs)).is_err());
    }

    #[test]
    fn test_new_job_rejects_bad_values() {
        let mut pairs = valid();
        pairs.push(("price", "-3"));
        assert!(NewJob::from_form(&form(&pairs)).is_err());

        let mut pairs = valid();
        pairs.push(("endDate", "2024-05-01"));
        let err = NewJob::from_form(&form(&pairs)).unwrap_err();
        assert!(err.to_string().contains("endDate"));

        let mut pairs = valid();
        pairs.push(("startDate", "soon"));
        assert!(NewJob::from_form(&form(&pairs)).is_err());
    }

    #[test]
    fn test_changes_are_partial() {
        let changes = JobChanges::from_form(&form(&[("status", "in progress"), ("price", "40")]))
            .unwrap();
        assert_eq!(changes.status, Some(JobStatus::InProgress));
        assert_eq!(changes.price, Some(40.0));
        assert_eq!(changes.title, None);
        assert_eq!(changes.category_id, None);
    }

    #[test]
    fn test_changes_reject_unknown_status() {
        let err = JobChanges::from_form(&form(&[("status", "archived")])).unwrap_err();
        assert!(err.to_string().contains("archived"));
    }

    fn stored_job(start: &str, end: &str) -> JobRow {
        let now = Utc::now();
        JobRow {
            id: 1,
            title: "Re-grout shower".into(),
            description: "Small en-suite".into(),
            category_id: 1,
            user_id: 1,
            price: 60.0,
            city: "Hull".into(),
            years: String::new(),
            image: String::new(),
            start_date: parse_datetime(start, false),
            end_date: parse_datetime(end, true),
            status: "OPEN".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_changes_end_date_checked_against_stored_start() {
        let job = stored_job("2024-06-10", "2024-06-20");

        let changes = JobChanges::from_form(&form(&[("endDate", "2024-06-01")])).unwrap();
        let err = changes.check_against(&job).unwrap_err();
        assert!(err.to_string().contains("endDate must not be before startDate"));

        let changes = JobChanges::from_form(&form(&[("startDate", "2024-06-25")])).unwrap();
        assert!(changes.check_against(&job).is_err());

        let changes = JobChanges::from_form(&form(&[("endDate", "2024-06-15")])).unwrap();
        assert!(changes.check_against(&job).is_ok());
    }
}
