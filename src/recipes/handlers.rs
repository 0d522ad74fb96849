use std::collections::HashSet;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::auth::jwt::AuthUser;
use crate::error::ApiError;
use crate::ingredients::repo::Ingredient;
use crate::ingredients::IngredientRead;
use crate::recipes::dto::{
    CreateRecipeRequest, PatchRecipeRequest, RecipeDetail, RecipeRead, SearchParams,
    UpdateRecipeRequest,
};
use crate::recipes::images::{ext_from_mime, recipe_image_path};
use crate::recipes::repo::{Recipe, RecipeWrite};
use crate::state::AppState;
use crate::tags::repo::Tag;
use crate::tags::TagRead;

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route("/recipes/search-recipe", get(search_recipes))
        .route(
            "/recipes/:id",
            get(get_recipe)
                .put(update_recipe)
                .patch(partial_update_recipe)
                .delete(delete_recipe),
        )
        .route(
            "/recipes/:id/upload-image",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
}

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<RecipeRead>>, ApiError> {
    let recipes = Recipe::list_by_user(&state.db, user_id).await?;
    Ok(Json(to_reads(&state.db, recipes).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<RecipeRead>), ApiError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("title", "This field may not be blank."));
    }
    validate_recipe_fields(payload.time_minutes, payload.price)?;
    ensure_owned_tags(&state.db, user_id, &payload.tags).await?;
    ensure_owned_ingredients(&state.db, user_id, &payload.ingredients).await?;

    let data = RecipeWrite {
        title: title.to_string(),
        time_minutes: payload.time_minutes,
        price: payload.price,
        link: payload.link,
    };
    let recipe = Recipe::create(&state.db, user_id, &data, &payload.tags, &payload.ingredients)
        .await?;

    info!(user_id = %user_id, recipe_id = %recipe.id, "recipe created");
    let read = to_read(&state.db, recipe).await?;
    Ok((StatusCode::CREATED, Json(read)))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let recipe = Recipe::find_by_id(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound("Recipe not found"))?;

    let tags = Recipe::tags_for(&state.db, recipe.id).await?;
    let ingredients = Recipe::ingredients_for(&state.db, recipe.id).await?;
    Ok(Json(RecipeDetail::from_parts(
        recipe,
        tags.into_iter().map(TagRead::from).collect(),
        ingredients.into_iter().map(IngredientRead::from).collect(),
    )))
}

#[instrument(skip(state, payload))]
pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateRecipeRequest>,
) -> Result<Json<RecipeRead>, ApiError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("title", "This field may not be blank."));
    }
    validate_recipe_fields(payload.time_minutes, payload.price)?;
    ensure_owned_tags(&state.db, user_id, &payload.tags).await?;
    ensure_owned_ingredients(&state.db, user_id, &payload.ingredients).await?;

    let data = RecipeWrite {
        title: title.to_string(),
        time_minutes: payload.time_minutes,
        price: payload.price,
        link: payload.link,
    };
    // Full update always replaces both relation sets.
    let recipe = Recipe::update(
        &state.db,
        user_id,
        id,
        &data,
        Some(&payload.tags),
        Some(&payload.ingredients),
    )
    .await?
    .ok_or(ApiError::NotFound("Recipe not found"))?;

    let read = to_read(&state.db, recipe).await?;
    Ok(Json(read))
}

#[instrument(skip(state, payload))]
pub async fn partial_update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<PatchRecipeRequest>,
) -> Result<Json<RecipeRead>, ApiError> {
    let existing = Recipe::find_by_id(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound("Recipe not found"))?;

    if let Some(tags) = &payload.tags {
        ensure_owned_tags(&state.db, user_id, tags).await?;
    }
    if let Some(ingredients) = &payload.ingredients {
        ensure_owned_ingredients(&state.db, user_id, ingredients).await?;
    }

    let title = match payload.title {
        Some(t) => {
            let t = t.trim().to_string();
            if t.is_empty() {
                return Err(ApiError::validation("title", "This field may not be blank."));
            }
            t
        }
        None => existing.title,
    };
    let data = RecipeWrite {
        title,
        time_minutes: payload.time_minutes.unwrap_or(existing.time_minutes),
        price: payload.price.unwrap_or(existing.price),
        link: payload.link.or(existing.link),
    };
    validate_recipe_fields(data.time_minutes, data.price)?;

    let recipe = Recipe::update(
        &state.db,
        user_id,
        id,
        &data,
        payload.tags.as_deref(),
        payload.ingredients.as_deref(),
    )
    .await?
    .ok_or(ApiError::NotFound("Recipe not found"))?;

    let read = to_read(&state.db, recipe).await?;
    Ok(Json(read))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !Recipe::delete(&state.db, user_id, id).await? {
        return Err(ApiError::NotFound("Recipe not found"));
    }
    info!(user_id = %user_id, recipe_id = %id, "recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    mut mp: Multipart,
) -> Result<Json<RecipeRead>, ApiError> {
    let existing = Recipe::find_by_id(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound("Recipe not found"))?;

    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::validation("image", e.to_string()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation("image", e.to_string()))?;
        upload = Some((content_type, data));
    }

    let Some((content_type, data)) = upload else {
        return Err(ApiError::validation("image", "No file was submitted."));
    };
    let Some(ext) = ext_from_mime(&content_type) else {
        warn!(%content_type, "rejected non-image upload");
        return Err(ApiError::validation(
            "image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        ));
    };

    let key = recipe_image_path(ext);
    state.storage.put_object(&key, data).await?;

    let recipe = finish_image_upload(&state, user_id, id, &key).await?;

    // The row now points at the new file; the superseded one is disposable.
    if let Some(old_key) = existing.image_path {
        if let Err(e) = state.storage.delete_object(&old_key).await {
            warn!(error = %e, key = %old_key, "failed to remove replaced image");
        }
    }

    info!(user_id = %user_id, recipe_id = %id, key = %key, "image uploaded");
    let read = to_read(&state.db, recipe).await?;
    Ok(Json(read))
}

#[instrument(skip(state))]
pub async fn search_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<RecipeRead>>, ApiError> {
    // An empty query string means "no filter", same as an absent parameter.
    let recipes = Recipe::search(
        &state.db,
        user_id,
        params.ingredient.as_deref().filter(|s| !s.is_empty()),
        params.tag.as_deref().filter(|s| !s.is_empty()),
    )
    .await?;
    Ok(Json(to_reads(&state.db, recipes).await?))
}

/// Bounds matching the `NUMERIC(8, 2)` price column; checked up front so the
/// caller gets a field-detail 400 instead of a database error.
fn validate_recipe_fields(time_minutes: i32, price: Decimal) -> Result<(), ApiError> {
    if time_minutes < 0 {
        return Err(ApiError::validation(
            "time_minutes",
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    if price.is_sign_negative() {
        return Err(ApiError::validation(
            "price",
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    if price >= Decimal::new(1_000_000, 0) {
        return Err(ApiError::validation(
            "price",
            "Ensure that there are no more than 6 digits before the decimal point.",
        ));
    }
    if price.normalize().scale() > 2 {
        return Err(ApiError::validation(
            "price",
            "Ensure that there are no more than 2 decimal places.",
        ));
    }
    Ok(())
}

/// Points the row at the freshly stored file. When the recipe disappeared
/// mid-request the file is removed again so nothing is left orphaned.
async fn finish_image_upload(
    state: &AppState,
    user_id: i64,
    id: i64,
    key: &str,
) -> Result<Recipe, ApiError> {
    match Recipe::set_image_path(&state.db, user_id, id, key).await? {
        Some(recipe) => Ok(recipe),
        None => {
            if let Err(e) = state.storage.delete_object(key).await {
                warn!(error = %e, key = %key, "failed to remove orphaned image");
            }
            Err(ApiError::NotFound("Recipe not found"))
        }
    }
}

/// Rejects the request when any referenced tag is absent or owned by someone else.
async fn ensure_owned_tags(db: &PgPool, user_id: i64, ids: &[i64]) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }
    let owned: HashSet<i64> = Tag::owned_ids(db, user_id, ids).await?.into_iter().collect();
    if ids.iter().any(|id| !owned.contains(id)) {
        return Err(ApiError::validation(
            "tags",
            "Tags must exist and belong to the authenticated user.",
        ));
    }
    Ok(())
}

async fn ensure_owned_ingredients(db: &PgPool, user_id: i64, ids: &[i64]) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }
    let owned: HashSet<i64> = Ingredient::owned_ids(db, user_id, ids)
        .await?
        .into_iter()
        .collect();
    if ids.iter().any(|id| !owned.contains(id)) {
        return Err(ApiError::validation(
            "ingredients",
            "Ingredients must exist and belong to the authenticated user.",
        ));
    }
    Ok(())
}

async fn to_read(db: &PgPool, recipe: Recipe) -> Result<RecipeRead, ApiError> {
    let tags = Recipe::tag_ids_map(db, &[recipe.id]).await?;
    let ingredients = Recipe::ingredient_ids_map(db, &[recipe.id]).await?;
    let id = recipe.id;
    Ok(RecipeRead::from_parts(
        recipe,
        tags.get(&id).cloned().unwrap_or_default(),
        ingredients.get(&id).cloned().unwrap_or_default(),
    ))
}

async fn to_reads(db: &PgPool, recipes: Vec<Recipe>) -> Result<Vec<RecipeRead>, ApiError> {
    let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
    let mut tag_map = Recipe::tag_ids_map(db, &ids).await?;
    let mut ingredient_map = Recipe::ingredient_ids_map(db, &ids).await?;
    Ok(recipes
        .into_iter()
        .map(|r| {
            let id = r.id;
            RecipeRead::from_parts(
                r,
                tag_map.remove(&id).unwrap_or_default(),
                ingredient_map.remove(&id).unwrap_or_default(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::async_trait;
    use bytes::Bytes;
    use sqlx::PgPool;

    use super::*;
    use crate::recipes::dto::UpdateRecipeRequest;
    use crate::storage::StorageClient;
    use crate::users::repo::{NewUser, User};

    async fn seed_user(db: &PgPool, email: &str) -> User {
        let new = NewUser::user(email, "").expect("valid email");
        User::create(db, &new, "unused-hash")
            .await
            .expect("user created")
    }

    fn base_payload(title: &str) -> CreateRecipeRequest {
        CreateRecipeRequest {
            title: title.into(),
            time_minutes: 10,
            price: Decimal::new(550, 2),
            link: None,
            tags: vec![],
            ingredients: vec![],
        }
    }

    #[test]
    fn field_validation_bounds() {
        assert!(validate_recipe_fields(10, Decimal::new(550, 2)).is_ok());
        assert!(validate_recipe_fields(10, Decimal::new(99_999_999, 2)).is_ok());
        assert!(validate_recipe_fields(-1, Decimal::new(550, 2)).is_err());
        assert!(validate_recipe_fields(10, Decimal::new(-100, 2)).is_err());
        assert!(validate_recipe_fields(10, Decimal::new(1_000_000, 0)).is_err());
        assert!(validate_recipe_fields(10, Decimal::new(2505, 3)).is_err());
    }

    #[sqlx::test]
    async fn create_rejects_cross_user_relations(pool: PgPool) {
        let me = seed_user(&pool, "me@mail.com").await;
        let other = seed_user(&pool, "other_user@mail.com").await;
        let state = AppState::for_tests(pool.clone());

        let their_ingredient = Ingredient::create(&pool, other.id, "Peixe").await.unwrap();
        let mut payload = base_payload("Peixe com alho");
        payload.ingredients = vec![their_ingredient.id];
        let err = create_recipe(State(state.clone()), AuthUser(me.id), Json(payload))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Validation {
                field: "ingredients",
                ..
            }
        ));

        let their_tag = Tag::create(&pool, other.id, "Vegan").await.unwrap();
        let mut payload = base_payload("Grass Pie");
        payload.tags = vec![their_tag.id];
        let err = create_recipe(State(state), AuthUser(me.id), Json(payload))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation { field: "tags", .. }));
    }

    #[sqlx::test]
    async fn create_links_own_relations(pool: PgPool) {
        let me = seed_user(&pool, "me@mail.com").await;
        let state = AppState::for_tests(pool.clone());
        let tag = Tag::create(&pool, me.id, "Dessert").await.unwrap();
        let ingredient = Ingredient::create(&pool, me.id, "Cebola").await.unwrap();

        let mut payload = base_payload("Chocolate cake");
        payload.tags = vec![tag.id];
        payload.ingredients = vec![ingredient.id];
        let (status, Json(read)) = create_recipe(State(state), AuthUser(me.id), Json(payload))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(read.tags, vec![tag.id]);
        assert_eq!(read.ingredients, vec![ingredient.id]);
    }

    #[sqlx::test]
    async fn put_with_omitted_relations_clears_sets(pool: PgPool) {
        let me = seed_user(&pool, "me@mail.com").await;
        let state = AppState::for_tests(pool.clone());
        let tag = Tag::create(&pool, me.id, "Vegan").await.unwrap();
        let recipe = Recipe::create(
            &pool,
            me.id,
            &RecipeWrite {
                title: "Sample recipe".into(),
                time_minutes: 10,
                price: Decimal::new(550, 2),
                link: None,
            },
            &[tag.id],
            &[],
        )
        .await
        .unwrap();

        let payload: UpdateRecipeRequest =
            serde_json::from_str(r#"{"title":"New title","time_minutes":5,"price":"3.00"}"#)
                .unwrap();
        let Json(read) = update_recipe(State(state), AuthUser(me.id), Path(recipe.id), Json(payload))
            .await
            .unwrap();
        assert!(read.tags.is_empty());
    }

    #[sqlx::test]
    async fn search_ignores_empty_params(pool: PgPool) {
        let me = seed_user(&pool, "me@mail.com").await;
        let state = AppState::for_tests(pool.clone());
        // No ingredients or tags linked at all.
        Recipe::create(
            &pool,
            me.id,
            &RecipeWrite {
                title: "Plain toast".into(),
                time_minutes: 2,
                price: Decimal::new(100, 2),
                link: None,
            },
            &[],
            &[],
        )
        .await
        .unwrap();

        let Json(found) = search_recipes(
            State(state),
            AuthUser(me.id),
            Query(SearchParams {
                ingredient: Some("".into()),
                tag: Some("".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Plain toast");
    }

    #[sqlx::test]
    async fn vanished_recipe_cleans_up_stored_image(pool: PgPool) {
        #[derive(Default)]
        struct RecordingStorage {
            deletes: Mutex<Vec<String>>,
        }
        #[async_trait]
        impl StorageClient for RecordingStorage {
            async fn put_object(&self, _key: &str, _body: Bytes) -> anyhow::Result<()> {
                Ok(())
            }
            async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
                self.deletes.lock().unwrap().push(key.to_string());
                Ok(())
            }
        }

        let me = seed_user(&pool, "me@mail.com").await;
        let storage = Arc::new(RecordingStorage::default());
        let state = AppState::from_parts(pool, AppState::test_config(), storage.clone());

        let err = finish_image_upload(&state, me.id, 9999, "recipe/orphan.png")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(
            storage.deletes.lock().unwrap().as_slice(),
            ["recipe/orphan.png"]
        );
    }
}
