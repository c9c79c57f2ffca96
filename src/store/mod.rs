//! Typed access to the `users` and `authcodes` tables.
//!
//! The store holds no business rules. Everything that decides whether a login
//! or registration is allowed lives in the services; the store only runs the
//! statements and reports what happened.

use async_trait::async_trait;
use time::OffsetDateTime;

mod models;
pub mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use models::{IllegalField, InvitationCode, NewUser, ProfileField, User, UserId};
pub use postgres::PgCredentialStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("unique constraint violated")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Stamp last-login time and client address.
    async fn record_login(&self, id: UserId, at: OffsetDateTime, ip: Option<String>)
        -> StoreResult<()>;

    /// Returns the number of rows changed.
    async fn update_profile_field(
        &self,
        id: UserId,
        field: ProfileField,
        value: &str,
    ) -> StoreResult<u64>;

    async fn begin_registration(&self) -> StoreResult<Box<dyn RegistrationTx>>;
}

/// One registration as a single transaction. Dropping without `commit` rolls back.
#[async_trait]
pub trait RegistrationTx: Send {
    /// Flip `used` on a matching, unused, unexpired code. `false` when nothing matched.
    async fn claim_invitation(
        &mut self,
        code: &str,
        email: &str,
        now: OffsetDateTime,
    ) -> StoreResult<bool>;

    async fn email_taken(&mut self, email: &str) -> StoreResult<bool>;

    /// Fails with [`StoreError::Conflict`] when the email is already present.
    async fn insert_user(&mut self, user: NewUser) -> StoreResult<UserId>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
