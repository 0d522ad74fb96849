use uuid::Uuid;

/// Maps an uploaded content type to the stored file extension. Anything not
/// listed here is rejected as a non-image payload.
pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Storage key for a recipe image: a fresh random identifier per upload,
/// namespaced under the entity type.
pub fn recipe_image_path(ext: &str) -> String {
    format!("recipe/{}.{}", Uuid::new_v4(), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_from_mime_known_types() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/gif"), Some("gif"));
    }

    #[test]
    fn ext_from_mime_rejects_non_images() {
        assert_eq!(ext_from_mime("application/octet-stream"), None);
        assert_eq!(ext_from_mime("text/plain"), None);
        assert_eq!(ext_from_mime("image"), None);
    }

    #[test]
    fn image_paths_are_unique_and_namespaced() {
        let a = recipe_image_path("png");
        let b = recipe_image_path("png");
        assert!(a.starts_with("recipe/"));
        assert!(a.ends_with(".png"));
        assert_ne!(a, b);
    }
}
