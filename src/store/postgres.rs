use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::debug;

use super::{
    CredentialStore, NewUser, ProfileField, RegistrationTx, StoreError, StoreResult, User, UserId,
};

const USER_COLUMNS: &str = r#"
    id, email, password_hash, first_name, last_name, phone, profile_img,
    auth_code, created_at, last_login, last_login_ip
"#;

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn conflict_or_db(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn record_login(
        &self,
        id: UserId,
        at: OffsetDateTime,
        ip: Option<String>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_login = $1, last_login_ip = $2 WHERE id = $3")
            .bind(at)
            .bind(ip)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn update_profile_field(
        &self,
        id: UserId,
        field: ProfileField,
        value: &str,
    ) -> StoreResult<u64> {
        let res = sqlx::query(field.update_statement())
            .bind(value)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }

    async fn begin_registration(&self) -> StoreResult<Box<dyn RegistrationTx>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgRegistrationTx { tx }))
    }
}

pub struct PgRegistrationTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RegistrationTx for PgRegistrationTx {
    async fn claim_invitation(
        &mut self,
        code: &str,
        email: &str,
        now: OffsetDateTime,
    ) -> StoreResult<bool> {
        // The row lock taken here serialises concurrent claims of the same code.
        let res = sqlx::query(
            r#"
            UPDATE authcodes
            SET used = TRUE
            WHERE authcode = $1
              AND email = $2
              AND used = FALSE
              AND (expires_at IS NULL OR expires_at > $3)
            "#,
        )
        .bind(code)
        .bind(email)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        debug!(rows = res.rows_affected(), "claim invitation");
        Ok(res.rows_affected() == 1)
    }

    async fn email_taken(&mut self, email: &str) -> StoreResult<bool> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(taken)
    }

    async fn insert_user(&mut self, user: NewUser) -> StoreResult<UserId> {
        let id: UserId = sqlx::query_scalar(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, auth_code)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.auth_code)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(conflict_or_db)?;
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(conflict_or_db)
    }
}
