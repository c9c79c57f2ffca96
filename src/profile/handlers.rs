use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::identity::AuthUser,
    error::AppError,
    profile::{dto::UpdateRequest, services::Profile},
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me/info", get(info))
        .route("/me/update", post(update))
}

#[instrument(skip_all)]
pub async fn info(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Profile>, AppError> {
    let profile = state.profile.get_profile(&identity).await?;
    Ok(Json(profile))
}

#[instrument(skip_all)]
pub async fn update(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<(), AppError> {
    let Json(req) = payload?;
    state
        .profile
        .update_profile(&identity, &req.field, &req.value)
        .await
}
