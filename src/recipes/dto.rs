use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ingredients::IngredientRead;
use crate::recipes::repo::Recipe;
use crate::tags::TagRead;

#[derive(Debug, Deserialize)]
pub struct CreateRecipeRequest {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub ingredients: Vec<i64>,
}

/// Full update: scalar fields are required and the relation arrays always
/// replace the stored sets; an omitted array clears the set.
#[derive(Debug, Deserialize)]
pub struct UpdateRecipeRequest {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub ingredients: Vec<i64>,
}

/// Partial update: only supplied fields change.
#[derive(Debug, Default, Deserialize)]
pub struct PatchRecipeRequest {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub ingredient: Option<String>,
    pub tag: Option<String>,
}

/// Reference representation: relations as ID arrays. Used by list, create,
/// update and search responses.
#[derive(Debug, Serialize)]
pub struct RecipeRead {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub image: Option<String>,
    pub tags: Vec<i64>,
    pub ingredients: Vec<i64>,
}

impl RecipeRead {
    pub fn from_parts(recipe: Recipe, tags: Vec<i64>, ingredients: Vec<i64>) -> Self {
        Self {
            id: recipe.id,
            title: recipe.title,
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            link: recipe.link,
            image: recipe.image_path,
            tags,
            ingredients,
        }
    }
}

/// Detail representation: relations expanded to full objects.
#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub image: Option<String>,
    pub tags: Vec<TagRead>,
    pub ingredients: Vec<IngredientRead>,
}

impl RecipeDetail {
    pub fn from_parts(recipe: Recipe, tags: Vec<TagRead>, ingredients: Vec<IngredientRead>) -> Self {
        Self {
            id: recipe.id,
            title: recipe.title,
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            link: recipe.link,
            image: recipe.image_path,
            tags,
            ingredients,
        }
    }
}
