use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: OffsetDateTime,
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Account factory: normalizes the email and fixes the staff/superuser flags
/// before anything touches the database.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl NewUser {
    pub fn user(email: &str, name: &str) -> anyhow::Result<Self> {
        Self::with_flags(email, name, false, false)
    }

    pub fn superuser(email: &str) -> anyhow::Result<Self> {
        Self::with_flags(email, "", true, true)
    }

    fn with_flags(email: &str, name: &str, is_staff: bool, is_superuser: bool) -> anyhow::Result<Self> {
        let email = normalize_email(email);
        anyhow::ensure!(!email.is_empty(), "users must have an email address");
        Ok(Self {
            email,
            name: name.to_string(),
            is_staff,
            is_superuser,
        })
    }
}

impl User {
    pub async fn create(db: &PgPool, new: &NewUser, password_hash: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, name, password_hash, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, name, password_hash, is_active, is_staff, is_superuser, created_at
            "#,
        )
        .bind(&new.email)
        .bind(&new.name)
        .bind(password_hash)
        .bind(new.is_staff)
        .bind(new.is_superuser)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, password_hash, is_active, is_staff, is_superuser, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, password_hash, is_active, is_staff, is_superuser, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_normalizes_email() {
        let new = NewUser::user("  DANnilO@mail.cCom ", "Danilo").expect("valid email");
        assert_eq!(new.email, "dannilo@mail.ccom");
        assert!(!new.is_staff);
        assert!(!new.is_superuser);
    }

    #[test]
    fn new_user_rejects_empty_email() {
        assert!(NewUser::user("", "nobody").is_err());
        assert!(NewUser::user("   ", "nobody").is_err());
    }

    #[test]
    fn superuser_sets_both_flags() {
        let new = NewUser::superuser("admin@mail.com").expect("valid email");
        assert!(new.is_staff);
        assert!(new.is_superuser);
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("test@mail.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
        assert!(!is_valid_email("test"));
        assert!(!is_valid_email("test@mail"));
        assert!(!is_valid_email("te st@mail.com"));
        assert!(!is_valid_email(""));
    }
}
