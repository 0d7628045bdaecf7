//! Job categories: listing and the default seed set.

use std::collections::HashMap;

use axum::{extract::State, Json};
use sqlx::PgPool;
use tracing::info;

use crate::errors::AppError;
use crate::models::category::CategoryRow;
use crate::state::AppState;

pub struct DefaultCategory {
    pub name: &'static str,
    pub description: &'static str,
    pub image_url: &'static str,
}

pub const DEFAULT_CATEGORIES: [DefaultCategory; 9] = [
    DefaultCategory {
        name: "Plumbing",
        description: "Expert plumbing services for all your needs.",
        image_url: "/plumbing.png",
    },
    DefaultCategory {
        name: "Electrical",
        description: "Professional electrical work, from repairs to installations.",
        image_url: "/electrical.png",
    },
    DefaultCategory {
        name: "Carpentry",
        description: "Quality carpentry services for custom builds and repairs.",
        image_url: "/carpentry.png",
    },
    DefaultCategory {
        name: "Painting",
        description: "Interior and exterior painting services to refresh your space.",
        image_url: "/painting.png",
    },
    DefaultCategory {
        name: "HVAC",
        description: "Heating, ventilation, and air conditioning services.",
        image_url: "/HVAC.png",
    },
    DefaultCategory {
        name: "Landscaping",
        description: "Beautiful landscaping services to enhance your home's exterior.",
        image_url: "/landscaping.png",
    },
    DefaultCategory {
        name: "Roofing",
        description: "Roof repairs and installations for your home.",
        image_url: "/roofing.png",
    },
    DefaultCategory {
        name: "Flooring",
        description: "Floor installation and repair services for all types of floors.",
        image_url: "/flooring.png",
    },
    DefaultCategory {
        name: "Window Installation",
        description: "Professional window installation and repair services.",
        image_url: "/window-installation.png",
    },
];

/// Upserts the default categories by name. Safe to run on every start.
pub async fn seed_default_categories(pool: &PgPool) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;
    for category in &DEFAULT_CATEGORIES {
        sqlx::query(
            r#"
            INSERT INTO categories (name, description, image_url)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
                SET description = EXCLUDED.description,
                    image_url = EXCLUDED.image_url
            "#,
        )
        .bind(category.name)
        .bind(category.description)
        .bind(category.image_url)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!("Seeded {} default categories", DEFAULT_CATEGORIES.len());
    Ok(DEFAULT_CATEGORIES.len())
}

pub async fn find_category(pool: &PgPool, id: i64) -> Result<Option<CategoryRow>, sqlx::Error> {
    sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn categories_by_ids(
    pool: &PgPool,
    ids: &[i64],
) -> Result<HashMap<i64, CategoryRow>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE id = ANY($1)")
        .bind(ids.to_vec())
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|c| (c.id, c)).collect())
}

/// GET /api/categories
pub async fn handle_list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryRow>>, AppError> {
    let categories =
        sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY name ASC")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(categories))
}
