use serde::{Deserialize, Serialize};

use crate::tags::repo::Tag;

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TagRead {
    pub id: i64,
    pub name: String,
}

impl From<Tag> for TagRead {
    fn from(t: Tag) -> Self {
        Self {
            id: t.id,
            name: t.name,
        }
    }
}
