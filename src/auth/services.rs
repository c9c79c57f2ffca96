use std::{fmt, net::IpAddr, sync::Arc};

use time::OffsetDateTime;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::{
    auth::{
        identity::Identity,
        jwt::TokenCodec,
        password::{hash_password_blocking, verify_password_blocking},
    },
    error::AppError,
    store::{CredentialStore, NewUser, StoreError},
    telemetry::operation_parent,
};

/// Registration failures. The messages are shown to the client as-is.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("invalid authcode")]
    InvalidAuthcode,
    #[error("account already exists")]
    AccountExists,
    #[error("failed to hash password")]
    Hashing,
    #[error("registration failed")]
    Failed,
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[derive(Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub authcode: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("authcode", &self.authcode)
            .finish()
    }
}

/// Login and invitation-gated registration.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenCodec>,
    span: Span,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: Arc<TokenCodec>, span: Span) -> Self {
        Self {
            store,
            tokens,
            span,
        }
    }

    /// Returns a session token. Unknown email and wrong password give the same
    /// `Unauthorized`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<IpAddr>,
    ) -> Result<String, AppError> {
        let parent = operation_parent(&self.span);
        let span = info_span!(parent: &parent, "login", user = %email);
        span.follows_from(&self.span);
        self.login_inner(email, password, ip).instrument(span).await
    }

    async fn login_inner(
        &self,
        email: &str,
        password: &str,
        ip: Option<IpAddr>,
    ) -> Result<String, AppError> {
        let user = self.store.find_user_by_email(email).await.map_err(|e| {
            error!(error = %e, op = "find_user_by_email", "login lookup failed");
            AppError::Internal
        })?;

        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let ok = verify_password_blocking(password.to_string(), stored_hash).await;
        let user = match user {
            Some(u) if ok => u,
            _ => {
                warn!("invalid email or password");
                return Err(AppError::Unauthorized);
            }
        };

        let identity = Identity::from(&user);
        let token = self.tokens.issue(&identity).map_err(|e| {
            error!(error = %e, user_id = user.id, "jwt sign failed");
            AppError::Internal
        })?;

        let ip = ip.map(|ip| ip.to_string());
        if let Err(e) = self
            .store
            .record_login(user.id, OffsetDateTime::now_utc(), ip)
            .await
        {
            warn!(error = %e, user_id = user.id, op = "record_login", "last-login bookkeeping failed");
        }

        info!(user_id = user.id, "user logged in");
        Ok(token)
    }

    /// Redeem the invitation code and create the user in one transaction.
    pub async fn register(&self, req: Registration) -> Result<(), RegistrationError> {
        let parent = operation_parent(&self.span);
        let span = info_span!(parent: &parent, "register", user = %req.email);
        span.follows_from(&self.span);
        self.register_inner(req).instrument(span).await
    }

    async fn register_inner(&self, req: Registration) -> Result<(), RegistrationError> {
        let failed = |op: &'static str| {
            move |e: StoreError| {
                error!(error = %e, op, "user creation failed");
                RegistrationError::Failed
            }
        };

        let mut tx = self
            .store
            .begin_registration()
            .await
            .map_err(failed("begin_registration"))?;

        let claimed = tx
            .claim_invitation(&req.authcode, &req.email, OffsetDateTime::now_utc())
            .await
            .map_err(failed("claim_invitation"))?;
        if !claimed {
            warn!(reason = "invalid authcode", "user creation failed");
            return Err(RegistrationError::InvalidAuthcode);
        }

        if tx
            .email_taken(&req.email)
            .await
            .map_err(failed("email_taken"))?
        {
            warn!(reason = "account already exists", "user creation failed");
            return Err(RegistrationError::AccountExists);
        }

        let password_hash = hash_password_blocking(req.password).await.map_err(|e| {
            error!(error = %e, "failed to hash password");
            RegistrationError::Hashing
        })?;

        let new_user = NewUser {
            email: req.email,
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            auth_code: req.authcode,
        };
        let id = match tx.insert_user(new_user).await {
            Ok(id) => id,
            Err(StoreError::Conflict) => {
                warn!(reason = "account already exists", "user creation failed");
                return Err(RegistrationError::AccountExists);
            }
            Err(e) => return Err(failed("insert_user")(e)),
        };

        match tx.commit().await {
            Ok(()) => {}
            Err(StoreError::Conflict) => return Err(RegistrationError::AccountExists),
            Err(e) => return Err(failed("commit")(e)),
        }

        info!(user_id = id, "user registered");
        Ok(())
    }
}
