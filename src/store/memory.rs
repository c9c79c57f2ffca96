//! In-memory store for tests.
//!
//! A registration transaction holds the table lock from `begin_registration`
//! until commit or drop, so concurrent registrations are serialised the way a
//! row lock would serialise them in Postgres.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    CredentialStore, InvitationCode, NewUser, ProfileField, RegistrationTx, StoreError,
    StoreResult, User, UserId,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Vec<User>,
    codes: Vec<InvitationCode>,
    next_id: UserId,
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    profile_writes: Arc<AtomicUsize>,
}

fn injected() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_code(&self, code: &str, email: &str, expires_at: Option<OffsetDateTime>) {
        self.tables.lock().await.codes.push(InvitationCode {
            authcode: code.into(),
            email: email.into(),
            created_at: OffsetDateTime::now_utc(),
            expires_at,
            used: false,
        });
    }

    pub async fn code(&self, code: &str) -> Option<InvitationCode> {
        self.tables
            .lock()
            .await
            .codes
            .iter()
            .find(|c| c.authcode == code)
            .cloned()
    }

    pub async fn users(&self) -> Vec<User> {
        self.tables.lock().await.users.clone()
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn profile_writes(&self) -> usize {
        self.profile_writes.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(())
    }

    fn check_writes(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        self.check_reads()?;
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn record_login(
        &self,
        id: UserId,
        at: OffsetDateTime,
        ip: Option<String>,
    ) -> StoreResult<()> {
        self.check_writes()?;
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == id) {
            user.last_login = Some(at);
            user.last_login_ip = ip;
        }
        Ok(())
    }

    async fn update_profile_field(
        &self,
        id: UserId,
        field: ProfileField,
        value: &str,
    ) -> StoreResult<u64> {
        self.check_writes()?;
        self.profile_writes.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(0);
        };
        match field {
            ProfileField::Phone => user.phone = Some(value.to_string()),
            ProfileField::FirstName => user.first_name = value.to_string(),
            ProfileField::LastName => user.last_name = value.to_string(),
            ProfileField::ProfileImg => user.profile_img = Some(value.to_string()),
        }
        Ok(1)
    }

    async fn begin_registration(&self) -> StoreResult<Box<dyn RegistrationTx>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryRegistrationTx {
            guard,
            staged,
            fail_writes: Arc::clone(&self.fail_writes),
        }))
    }
}

pub struct MemoryRegistrationTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    fail_writes: Arc<AtomicBool>,
}

#[async_trait]
impl RegistrationTx for MemoryRegistrationTx {
    async fn claim_invitation(
        &mut self,
        code: &str,
        email: &str,
        now: OffsetDateTime,
    ) -> StoreResult<bool> {
        let found = self
            .staged
            .codes
            .iter_mut()
            .find(|c| c.authcode == code && c.is_redeemable(email, now));
        match found {
            Some(c) => {
                c.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn email_taken(&mut self, email: &str) -> StoreResult<bool> {
        Ok(self.staged.users.iter().any(|u| u.email == email))
    }

    async fn insert_user(&mut self, user: NewUser) -> StoreResult<UserId> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        if self.staged.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict);
        }
        self.staged.next_id += 1;
        let id = self.staged.next_id;
        self.staged.users.push(User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: None,
            profile_img: None,
            auth_code: user.auth_code,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
            last_login_ip: None,
        });
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}
