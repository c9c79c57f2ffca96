//! Request-scoped identity.
//!
//! `require_identity` verifies the bearer token and stores the resulting
//! [`Identity`] in that request's extensions. Nothing outlives the request;
//! handlers pull it back out with [`AuthUser`].

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{
    auth::jwt::TokenCodec,
    error::AppError,
    state::AppState,
    store::{User, UserId},
};

/// Minimal authenticated-user view handed to request handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub profile_img: Option<String>,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            first_name: user.first_name().to_string(),
            last_name: user.last_name().to_string(),
            email: user.email().to_string(),
            profile_img: user.profile_img.clone(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok())?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify the `Authorization: Bearer` header against the codec.
pub fn identity_from_headers(headers: &HeaderMap, tokens: &TokenCodec) -> Result<Identity, AppError> {
    let token = bearer_token(headers).ok_or_else(|| {
        warn!("missing or malformed Authorization header");
        AppError::Unauthorized
    })?;
    tokens.verify(token).map_err(|_| {
        warn!("invalid or expired token");
        AppError::Unauthorized
    })
}

/// Gate for authenticated routes; rejects before the handler runs.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = identity_from_headers(req.headers(), &state.tokens)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// The identity bound to this request, if a token was verified for it.
pub fn current_identity(extensions: &Extensions) -> Option<&Identity> {
    extensions.get::<Identity>()
}

/// Extractor for handlers behind [`require_identity`]. Absent identity is a 401.
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_identity(&parts.extensions)
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}
