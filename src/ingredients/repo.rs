use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

impl Ingredient {
    /// Ingredients owned by the user, name descending.
    pub async fn list_by_user(db: &PgPool, user_id: i64) -> anyhow::Result<Vec<Ingredient>> {
        let rows = sqlx::query_as::<_, Ingredient>(
            r#"
            SELECT id, user_id, name
            FROM ingredients
            WHERE user_id = $1
            ORDER BY name DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn create(db: &PgPool, user_id: i64, name: &str) -> anyhow::Result<Ingredient> {
        let ingredient = sqlx::query_as::<_, Ingredient>(
            r#"
            INSERT INTO ingredients (user_id, name)
            VALUES ($1, $2)
            RETURNING id, user_id, name
            "#,
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(db)
        .await?;
        Ok(ingredient)
    }

    /// IDs from `ids` that exist and belong to the user.
    pub async fn owned_ids(db: &PgPool, user_id: i64, ids: &[i64]) -> anyhow::Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM ingredients
            WHERE user_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(ids)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
