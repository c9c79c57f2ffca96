use crate::{auth::identity::require_identity, state::AppState};
use axum::{middleware, Router};

mod dto;
pub mod handlers;
pub mod services;

/// Profile routes, all behind the bearer-token gate.
pub fn router(state: AppState) -> Router<AppState> {
    handlers::me_routes().route_layer(middleware::from_fn_with_state(state, require_identity))
}
