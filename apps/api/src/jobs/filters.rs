//! Job search: query parameters to SQL predicates and pagination.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw query string of `GET /api/jobs`. Everything is optional and loosely typed;
/// values that fail to parse are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSearchParams {
    pub keyword: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobFilter {
    pub keyword: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub docs: Vec<T>,
    pub total_docs: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn positive_price(value: &Option<String>) -> Option<f64> {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p > 0.0)
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date. A bare date means
/// the start of that day, or its last instant when `end_of_day` is set.
pub fn parse_datetime(value: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)?
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)?
    };
    Some(date.and_time(time).and_utc())
}

/// Escapes `%`, `_` and `\` so user input matches literally inside a LIKE pattern.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_clause(qb: &mut QueryBuilder<'_, Postgres>, first: &mut bool) {
    qb.push(if *first { " WHERE " } else { " AND " });
    *first = false;
}

impl JobFilter {
    pub fn from_params(params: &JobSearchParams) -> Self {
        Self {
            keyword: non_empty(&params.keyword),
            location: non_empty(&params.location),
            category: non_empty(&params.category),
            min_price: positive_price(&params.min_price),
            max_price: positive_price(&params.max_price),
            created_from: params
                .start_date
                .as_deref()
                .and_then(|v| parse_datetime(v, false)),
            created_to: params
                .end_date
                .as_deref()
                .and_then(|v| parse_datetime(v, true)),
        }
    }

    /// Appends ` WHERE ...` for the active predicates. Expects the query to alias
    /// `jobs` as `j` and the joined `categories` as `c`.
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        let mut first = true;

        if let Some(keyword) = &self.keyword {
            push_clause(qb, &mut first);
            qb.push("j.title ILIKE ")
                .push_bind(format!("%{}%", escape_like(keyword)));
        }
        if let Some(location) = &self.location {
            push_clause(qb, &mut first);
            qb.push("j.city = ").push_bind(location.clone());
        }
        if let Some(category) = &self.category {
            push_clause(qb, &mut first);
            qb.push("c.name ILIKE ")
                .push_bind(format!("%{}%", escape_like(category)));
        }
        if let Some(min) = self.min_price {
            push_clause(qb, &mut first);
            qb.push("j.price >= ").push_bind(min);
        }
        if let Some(max) = self.max_price {
            push_clause(qb, &mut first);
            qb.push("j.price <= ").push_bind(max);
        }
        if let Some(from) = self.created_from {
            push_clause(qb, &mut first);
            qb.push("j.created_at >= ").push_bind(from);
        }
        if let Some(to) = self.created_to {
            push_clause(qb, &mut first);
            qb.push("j.created_at <= ").push_bind(to);
        }
    }
}

impl Pagination {
    pub fn from_params(params: &JobSearchParams) -> Self {
        let page = params
            .page
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .max(1);
        let limit = params
            .limit
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        Self { page, limit }
    }

    /// Rows to skip. Saturates instead of overflowing on absurd page numbers.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total_docs: i64) -> i64 {
        (total_docs + self.limit - 1) / self.limit
    }

    pub fn wrap<T>(&self, docs: Vec<T>, total_docs: i64) -> Page<T> {
        Page {
            docs,
            total_docs,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages(total_docs),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Query;
    use axum::http::Uri;
    use chrono::{Datelike, Timelike};

    use super::*;

    const BASE: &str = "SELECT j.* FROM jobs j JOIN categories c ON c.id = j.category_id";

    fn params(pairs: &[(&str, &str)]) -> JobSearchParams {
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let uri: Uri = format!("/api/jobs?{query}").parse().unwrap();
        Query::<JobSearchParams>::try_from_uri(&uri).unwrap().0
    }

    fn sql_for(filter: &JobFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new(BASE);
        filter.push_where(&mut qb);
        qb.sql().to_string()
    }

    #[test]
    fn test_no_filters_no_where() {
        let filter = JobFilter::from_params(&JobSearchParams::default());
        assert_eq!(filter, JobFilter::default());
        assert_eq!(sql_for(&filter), BASE);
    }

    #[test]
    fn test_predicates_in_bind_order() {
        let filter = JobFilter::from_params(&params(&[
            ("keyword", "boiler"),
            ("location", "Leeds"),
            ("category", "plumb"),
            ("minPrice", "50"),
            ("maxPrice", "500"),
        ]));
        assert_eq!(
            sql_for(&filter),
            format!(
                "{BASE} WHERE j.title ILIKE $1 AND j.city = $2 AND c.name ILIKE $3 \
                 AND j.price >= $4 AND j.price <= $5"
            )
        );
    }

    #[test]
    fn test_price_bounds_are_independent_and_ignore_non_positive() {
        let filter = JobFilter::from_params(&params(&[("minPrice", "0"), ("maxPrice", "200")]));
        assert_eq!(filter.min_price, None);
        assert_eq!(filter.max_price, Some(200.0));
        assert_eq!(sql_for(&filter), format!("{BASE} WHERE j.price <= $1"));

        let filter = JobFilter::from_params(&params(&[("minPrice", "-5"), ("maxPrice", "abc")]));
        assert_eq!(filter.min_price, None);
        assert_eq!(filter.max_price, None);
    }

    #[test]
    fn test_date_range() {
        let filter = JobFilter::from_params(&params(&[
            ("startDate", "2024-03-01"),
            ("endDate", "2024-03-31"),
        ]));
        let from = filter.created_from.unwrap();
        let to = filter.created_to.unwrap();
        assert_eq!((from.day(), from.hour()), (1, 0));
        assert_eq!((to.day(), to.hour(), to.minute()), (31, 23, 59));
        assert_eq!(
            sql_for(&filter),
            format!("{BASE} WHERE j.created_at >= $1 AND j.created_at <= $2")
        );
    }

    #[test]
    fn test_rfc3339_dates_and_garbage() {
        let ts = parse_datetime("2024-05-02T10:30:00+01:00", true).unwrap();
        assert_eq!(ts.hour(), 9);
        assert!(parse_datetime("yesterday", false).is_none());
    }

    #[test]
    fn test_blank_text_filters_ignored() {
        let filter = JobFilter::from_params(&params(&[("keyword", ""), ("location", "")]));
        assert!(filter.keyword.is_none());
        assert!(filter.location.is_none());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("tiling"), "tiling");
    }

    #[test]
    fn test_pagination_defaults_and_clamps() {
        let p = Pagination::from_params(&JobSearchParams::default());
        assert_eq!(p, Pagination { page: 1, limit: 10 });
        assert_eq!(p.offset(), 0);

        let p = Pagination::from_params(&params(&[("page", "3"), ("limit", "500")]));
        assert_eq!(p, Pagination { page: 3, limit: 100 });
        assert_eq!(p.offset(), 200);

        let p = Pagination::from_params(&params(&[("page", "0"), ("limit", "0")]));
        assert_eq!(p, Pagination { page: 1, limit: 1 });
    }

    #[test]
    fn test_huge_page_offset_saturates() {
        let p = Pagination::from_params(&params(&[
            ("page", "9223372036854775807"),
            ("limit", "10"),
        ]));
        assert_eq!(p.page, i64::MAX);
        assert_eq!(p.offset(), i64::MAX);
    }

    #[test]
    fn test_total_pages() {
        let p = Pagination { page: 1, limit: 10 };
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(10), 1);
        assert_eq!(p.total_pages(11), 2);

        let page = p.wrap(vec![1, 2, 3], 23);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_docs, 23);
    }
}
