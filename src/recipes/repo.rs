use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::ingredients::repo::Ingredient;
use crate::tags::repo::Tag;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub image_path: Option<String>,
}

/// Scalar fields written on create and update.
#[derive(Debug, Clone)]
pub struct RecipeWrite {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
}

const RECIPE_COLUMNS: &str = "id, user_id, title, time_minutes, price, link, image_path";

impl Recipe {
    /// Recipes owned by the user, newest identifier first.
    pub async fn list_by_user(db: &PgPool, user_id: i64) -> anyhow::Result<Vec<Recipe>> {
        let rows = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE user_id = $1 ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_id(db: &PgPool, user_id: i64, id: i64) -> anyhow::Result<Option<Recipe>> {
        let row = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    /// Insert the recipe and its relation rows in one transaction.
    pub async fn create(
        db: &PgPool,
        user_id: i64,
        data: &RecipeWrite,
        tag_ids: &[i64],
        ingredient_ids: &[i64],
    ) -> anyhow::Result<Recipe> {
        let mut tx = db.begin().await?;
        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            INSERT INTO recipes (user_id, title, time_minutes, price, link)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECIPE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&data.title)
        .bind(data.time_minutes)
        .bind(data.price)
        .bind(&data.link)
        .fetch_one(&mut *tx)
        .await?;

        link_tags(&mut tx, recipe.id, tag_ids).await?;
        link_ingredients(&mut tx, recipe.id, ingredient_ids).await?;
        tx.commit().await?;
        Ok(recipe)
    }

    /// Update scalar fields; relation arrays, when supplied, replace the
    /// stored set. Returns `None` when the recipe is absent or not owned.
    pub async fn update(
        db: &PgPool,
        user_id: i64,
        id: i64,
        data: &RecipeWrite,
        tag_ids: Option<&[i64]>,
        ingredient_ids: Option<&[i64]>,
    ) -> anyhow::Result<Option<Recipe>> {
        let mut tx = db.begin().await?;
        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            UPDATE recipes
            SET title = $3, time_minutes = $4, price = $5, link = $6
            WHERE id = $1 AND user_id = $2
            RETURNING {RECIPE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(&data.title)
        .bind(data.time_minutes)
        .bind(data.price)
        .bind(&data.link)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(recipe) = recipe else {
            return Ok(None);
        };

        if let Some(ids) = tag_ids {
            sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
                .bind(recipe.id)
                .execute(&mut *tx)
                .await?;
            link_tags(&mut tx, recipe.id, ids).await?;
        }
        if let Some(ids) = ingredient_ids {
            sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
                .bind(recipe.id)
                .execute(&mut *tx)
                .await?;
            link_ingredients(&mut tx, recipe.id, ids).await?;
        }

        tx.commit().await?;
        Ok(Some(recipe))
    }

    /// Returns false when nothing was deleted.
    pub async fn delete(db: &PgPool, user_id: i64, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_image_path(
        db: &PgPool,
        user_id: i64,
        id: i64,
        path: &str,
    ) -> anyhow::Result<Option<Recipe>> {
        let row = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            UPDATE recipes
            SET image_path = $3
            WHERE id = $1 AND user_id = $2
            RETURNING {RECIPE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(path)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    /// Requester-scoped keyword search. Each supplied substring restricts to
    /// recipes linked to a matching ingredient/tag name (case-sensitive
    /// containment); both together combine with AND.
    pub async fn search(
        db: &PgPool,
        user_id: i64,
        ingredient: Option<&str>,
        tag: Option<&str>,
    ) -> anyhow::Result<Vec<Recipe>> {
        let rows = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            SELECT {RECIPE_COLUMNS}
            FROM recipes r
            WHERE r.user_id = $1
              AND ($2::text IS NULL OR EXISTS (
                    SELECT 1
                    FROM recipe_ingredients ri
                    JOIN ingredients i ON i.id = ri.ingredient_id
                    WHERE ri.recipe_id = r.id AND i.name LIKE '%' || $2 || '%'))
              AND ($3::text IS NULL OR EXISTS (
                    SELECT 1
                    FROM recipe_tags rt
                    JOIN tags t ON t.id = rt.tag_id
                    WHERE rt.recipe_id = r.id AND t.name LIKE '%' || $3 || '%'))
            ORDER BY r.id DESC
            "#
        ))
        .bind(user_id)
        .bind(ingredient)
        .bind(tag)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn tag_ids_map(
        db: &PgPool,
        recipe_ids: &[i64],
    ) -> anyhow::Result<HashMap<i64, Vec<i64>>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT recipe_id, tag_id
            FROM recipe_tags
            WHERE recipe_id = ANY($1)
            ORDER BY tag_id
            "#,
        )
        .bind(recipe_ids)
        .fetch_all(db)
        .await?;
        Ok(group_pairs(rows))
    }

    pub async fn ingredient_ids_map(
        db: &PgPool,
        recipe_ids: &[i64],
    ) -> anyhow::Result<HashMap<i64, Vec<i64>>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT recipe_id, ingredient_id
            FROM recipe_ingredients
            WHERE recipe_id = ANY($1)
            ORDER BY ingredient_id
            "#,
        )
        .bind(recipe_ids)
        .fetch_all(db)
        .await?;
        Ok(group_pairs(rows))
    }

    pub async fn tags_for(db: &PgPool, recipe_id: i64) -> anyhow::Result<Vec<Tag>> {
        let rows = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.user_id, t.name
            FROM tags t
            JOIN recipe_tags rt ON rt.tag_id = t.id
            WHERE rt.recipe_id = $1
            ORDER BY t.id
            "#,
        )
        .bind(recipe_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn ingredients_for(db: &PgPool, recipe_id: i64) -> anyhow::Result<Vec<Ingredient>> {
        let rows = sqlx::query_as::<_, Ingredient>(
            r#"
            SELECT i.id, i.user_id, i.name
            FROM ingredients i
            JOIN recipe_ingredients ri ON ri.ingredient_id = i.id
            WHERE ri.recipe_id = $1
            ORDER BY i.id
            "#,
        )
        .bind(recipe_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}

async fn link_tags(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    tag_ids: &[i64],
) -> anyhow::Result<()> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO recipe_tags (recipe_id, tag_id)
        SELECT $1, unnest($2::bigint[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(recipe_id)
    .bind(tag_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn link_ingredients(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    ingredient_ids: &[i64],
) -> anyhow::Result<()> {
    if ingredient_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id)
        SELECT $1, unnest($2::bigint[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(recipe_id)
    .bind(ingredient_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn group_pairs(rows: Vec<(i64, i64)>) -> HashMap<i64, Vec<i64>> {
    let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
    for (recipe_id, related_id) in rows {
        map.entry(recipe_id).or_default().push(related_id);
    }
    map
}
