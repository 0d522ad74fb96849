use serde::{Deserialize, Serialize};

use crate::ingredients::repo::Ingredient;

#[derive(Debug, Deserialize)]
pub struct CreateIngredientRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct IngredientRead {
    pub id: i64,
    pub name: String,
}

impl From<Ingredient> for IngredientRead {
    fn from(i: Ingredient) -> Self {
        Self {
            id: i.id,
            name: i.name,
        }
    }
}
