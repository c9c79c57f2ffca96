use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::{
    auth::identity::Identity,
    error::AppError,
    store::{CredentialStore, ProfileField},
    telemetry::operation_parent,
};

/// Profile as returned to the owner.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Profile {
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "LastName")]
    pub last_name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "ProfileIMG")]
    pub profile_img: String,
}

/// Read and update of the caller's own profile. Callers must already hold a
/// verified [`Identity`].
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn CredentialStore>,
    span: Span,
}

impl ProfileService {
    pub fn new(store: Arc<dyn CredentialStore>, span: Span) -> Self {
        Self { store, span }
    }

    pub async fn get_profile(&self, identity: &Identity) -> Result<Profile, AppError> {
        let parent = operation_parent(&self.span);
        let span = info_span!(parent: &parent, "get_profile", user_id = identity.id);
        span.follows_from(&self.span);
        self.get_profile_inner(identity).instrument(span).await
    }

    async fn get_profile_inner(&self, identity: &Identity) -> Result<Profile, AppError> {
        let user = match self.store.find_user_by_id(identity.id).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                error!(op = "find_user_by_id", "user row missing for verified identity");
                return Err(AppError::Internal);
            }
            Err(e) => {
                error!(error = %e, op = "find_user_by_id", "error querying user's info");
                return Err(AppError::Internal);
            }
        };
        Ok(Profile {
            first_name: user.first_name().to_string(),
            last_name: user.last_name().to_string(),
            email: user.email().to_string(),
            profile_img: user.profile_img.unwrap_or_default(),
        })
    }

    /// `field` must name one of the whitelisted columns (any case).
    pub async fn update_profile(
        &self,
        identity: &Identity,
        field: &str,
        value: &str,
    ) -> Result<(), AppError> {
        let parent = operation_parent(&self.span);
        let span = info_span!(parent: &parent, "update_profile", user_id = identity.id);
        span.follows_from(&self.span);
        self.update_profile_inner(identity, field, value)
            .instrument(span)
            .await
    }

    async fn update_profile_inner(
        &self,
        identity: &Identity,
        field: &str,
        value: &str,
    ) -> Result<(), AppError> {
        let field: ProfileField = field.parse().map_err(|_| {
            warn!(field = %field, "illegal profile field");
            AppError::BadRequest("Illegal field".into())
        })?;
        let rows = self
            .store
            .update_profile_field(identity.id, field, value)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    op = "update_profile_field",
                    column = field.column(),
                    "user data modification failed"
                );
                AppError::Internal
            })?;
        if rows == 0 {
            warn!(column = field.column(), "profile update matched no row");
        } else {
            info!(column = field.column(), "profile updated");
        }
        Ok(())
    }
}
