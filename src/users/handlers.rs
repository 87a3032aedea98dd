use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use super::dto::{LoginRequest, LoginResponse, RegisterRequest, UpdateUserRequest, UserResponse};
use crate::{
    auth::{jwt::bearer, AuthUser},
    error::AppResult,
    state::AppState,
    validation::ValidatedJson,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/user/register", post(register))
        .route("/api/user/login", post(login))
        .route("/api/user/profile", get(profile))
        .route("/api/user/update", put(update))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    caller: Option<AuthUser>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state.users.register(caller.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (user, token) = state.users.login(payload).await?;
    Ok(Json(LoginResponse {
        uuid: user.uuid,
        username: user.username,
        token: bearer(&token),
    }))
}

#[instrument(skip(state))]
pub async fn profile(
    State(state): State<AppState>,
    caller: AuthUser,
) -> AppResult<Json<UserResponse>> {
    let user = state.users.profile(&caller).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update(
    State(state): State<AppState>,
    caller: AuthUser,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state.users.update(&caller, payload).await?;
    Ok(Json(user.into()))
}
