use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, MessageResponse, RegisterRequest, SignupResponse,
            UpdateProfileRequest,
        },
        jwt::AuthUser,
        repo_types::User,
        services,
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(register))
        .route("/register", post(register))
        .route("/verify/:token", get(verify))
        .route("/login", post(login))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).put(update_profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    let Json(payload) = payload?;
    let user = services::signup(&state, payload.validate()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "Account created. Check your email to verify your account.".into(),
            user,
        }),
    ))
}

#[instrument(skip(state, token))]
pub async fn verify(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    services::verify_email(&state, &token).await?;
    Ok(Json(MessageResponse {
        message: "Email verified. You can now log in.".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(payload) = payload?;
    let (token, user) = services::login(&state, payload.validate()?).await?;
    Ok(Json(LoginResponse { token, user }))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<User>> {
    Ok(Json(services::profile(&state, user_id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AppResult<Json<User>> {
    let Json(payload) = payload?;
    let user = services::update_profile(&state, user_id, payload.validate()?).await?;
    Ok(Json(user))
}
