use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{info, instrument, warn};

use crate::auth::jwt::{AuthUser, JwtKeys};
use crate::auth::password::{hash_password, verify_password};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::dto::{
    CreateUserRequest, PublicUser, RefreshRequest, TokenRequest, TokenResponse,
};
use crate::users::repo::{is_valid_email, normalize_email, NewUser, User};

const MIN_PASSWORD_LEN: usize = 5;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_user))
        .route("/token", post(obtain_token))
        .route("/token/refresh", post(refresh_token))
        .route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let new_user = NewUser::user(&payload.email, &payload.name)
        .map_err(|e| ApiError::validation("email", e.to_string()))?;

    if !is_valid_email(&new_user.email) {
        warn!(email = %new_user.email, "invalid email");
        return Err(ApiError::validation("email", "Enter a valid email address."));
    }

    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::validation(
            "password",
            format!(
                "Ensure this field has at least {} characters.",
                MIN_PASSWORD_LEN
            ),
        ));
    }

    if User::find_by_email(&state.db, &new_user.email).await?.is_some() {
        warn!(email = %new_user.email, "email already registered");
        return Err(ApiError::validation(
            "email",
            "user with this email already exists.",
        ));
    }

    let hash = hash_password(&payload.password)?;
    let user = match User::create(&state.db, &new_user, &hash).await {
        Ok(u) => u,
        // Lost the race with a concurrent create on the same email.
        Err(e) if is_unique_violation(&e) => {
            warn!(email = %new_user.email, "email already registered");
            return Err(ApiError::validation(
                "email",
                "user with this email already exists.",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, email = %user.email, "user created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|db| db.code())
        .map_or(false, |code| code == "23505")
}

#[instrument(skip(state, payload))]
pub async fn obtain_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("email", "Enter a valid email address."));
    }

    let user = match User::find_by_email(&state.db, &email).await? {
        Some(u) => u,
        None => {
            warn!(email = %email, "login unknown email");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    if !user.is_active {
        warn!(user_id = %user.id, "login on inactive account");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;

    info!(user_id = %user.id, email = %user.email, "token issued");
    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;

    #[sqlx::test]
    async fn duplicate_email_maps_to_field_validation(pool: PgPool) {
        let new = NewUser::user("daniloxc@msn.com", "").expect("valid email");
        User::create(&pool, &new, "hash").await.expect("first insert");

        // Straight to the constraint, bypassing the pre-insert lookup.
        let err = User::create(&pool, &new, "hash").await.unwrap_err();
        assert!(is_unique_violation(&err));

        let state = AppState::for_tests(pool);
        let payload = CreateUserRequest {
            email: "daniloxc@msn.com".into(),
            name: "".into(),
            password: "Sstring1".into(),
        };
        let err = create_user(State(state), Json(payload)).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation { field: "email", .. }));
    }

    #[sqlx::test]
    async fn create_user_persists_normalized_email(pool: PgPool) {
        let state = AppState::for_tests(pool.clone());
        let payload = CreateUserRequest {
            email: " DANnilO@mail.cCom ".into(),
            name: "John Doe".into(),
            password: "Sstring1".into(),
        };
        let (status, Json(user)) = create_user(State(state), Json(payload)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user.email, "dannilo@mail.ccom");

        let stored = User::find_by_email(&pool, "dannilo@mail.ccom")
            .await
            .unwrap()
            .expect("stored user");
        assert_eq!(stored.name, "John Doe");
    }
}
