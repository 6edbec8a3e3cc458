use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use quarry_common::Error;
use quarry_db::{NewUser, UserPatch, UserRecord};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ApiResult;
use crate::state::SharedState;
use crate::validation;

/// Body for `POST /api/users`.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Body for `PUT /api/users/{id}`. Unique keys are immutable after creation;
/// any `username`/`email` fields in the request body are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn status(State(state): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    let users = state.store.user_count()?;
    Ok(Json(json!({ "status": "running", "users": users })))
}

pub async fn create_user(
    State(state): State<SharedState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    validation::validate_new_user(&req)?;

    // Advisory pre-checks for a friendly message; the unique indexes remain
    // authoritative if another request wins the race in between.
    if state.store.username_exists(&req.username)? {
        return Err(Error::Duplicate(format!("username '{}' already exists", req.username)).into());
    }
    if state.store.email_exists(&req.email)? {
        return Err(Error::Duplicate(format!("email '{}' already exists", req.email)).into());
    }

    let user = state.store.create(&NewUser {
        username: req.username,
        email: req.email,
        password: req.password,
        first_name: req.first_name,
        last_name: req.last_name,
    })?;
    info!("created user {} ({})", user.id, user.username);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(State(state): State<SharedState>) -> ApiResult<Json<Vec<UserRecord>>> {
    Ok(Json(state.store.list()?))
}

pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.store.get(id)?))
}

pub async fn get_user_by_username(
    State(state): State<SharedState>,
    Path(username): Path<String>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.store.get_by_username(&username)?))
}

pub async fn get_user_by_email(
    State(state): State<SharedState>,
    Path(email): Path<String>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.store.get_by_email(&email)?))
}

pub async fn update_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserRecord>> {
    if let Some(password) = &req.password {
        validation::validate_password(password)?;
    }
    let user = state.store.update(
        id,
        &UserPatch {
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
        },
    )?;
    Ok(Json(user))
}

pub async fn deactivate_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserRecord>> {
    let user = state.store.deactivate(id)?;
    info!("deactivated user {}", user.id);
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.store.delete(id)?;
    info!("deleted user {}", id);
    Ok(StatusCode::NO_CONTENT)
}
