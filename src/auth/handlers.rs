use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::dto::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse},
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(payload) = payload?;
    let ip = peer.map(|ConnectInfo(addr)| addr.ip());
    let token = state
        .auth
        .login(&payload.email, &payload.password, ip)
        .await?;
    Ok(Json(LoginResponse { token }))
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, AppError> {
    let Json(payload) = payload?;
    state.auth.register(payload.into()).await?;
    Ok(Json(RegisterResponse {
        status: StatusCode::OK.as_u16(),
        message: "Registration successful",
    }))
}
