use axum::{
    extract::{rejection::PathRejection, DefaultBodyLimit, Path, State},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{dto::MessageResponse, jwt::AuthUser},
    error::AppResult,
    listings::{form::ListingForm, repo_types::Listing, services},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/listings", get(list_listings))
        .route("/listings/:id", get(get_listing))
}

pub fn write_routes(max_body: usize) -> Router<AppState> {
    Router::new()
        .route("/listings", axum::routing::post(create_listing))
        .route(
            "/listings/:id",
            axum::routing::put(update_listing).delete(delete_listing),
        )
        .layer(DefaultBodyLimit::max(max_body))
}

#[instrument(skip(state))]
pub async fn list_listings(State(state): State<AppState>) -> AppResult<Json<Vec<Listing>>> {
    Ok(Json(services::list_all(&state).await?))
}

#[instrument(skip(state, path))]
pub async fn get_listing(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<Listing>> {
    let Path(id) = path?;
    Ok(Json(services::get(&state, id).await?))
}

#[instrument(skip(state, form))]
pub async fn create_listing(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    form: ListingForm,
) -> AppResult<(StatusCode, HeaderMap, Json<Listing>)> {
    let new = form.fields.into_new()?;
    let listing = services::create(&state, user_id, new, form.file).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/listings/{}", listing.id)) {
        headers.insert(LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(listing)))
}

#[instrument(skip(state, path, form))]
pub async fn update_listing(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<i64>, PathRejection>,
    form: ListingForm,
) -> AppResult<Json<Listing>> {
    let Path(id) = path?;
    let patch = form.fields.into_patch()?;
    Ok(Json(
        services::update(&state, id, user_id, patch, form.file).await?,
    ))
}

#[instrument(skip(state, path))]
pub async fn delete_listing(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Path(id) = path?;
    services::delete(&state, id, user_id).await?;
    Ok(Json(MessageResponse {
        message: "Listing deleted".into(),
    }))
}
