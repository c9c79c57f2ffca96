use std::{fmt, str::FromStr};

use sqlx::FromRow;
use time::OffsetDateTime;

pub type UserId = i64;

/// User record in the database.
#[derive(Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String, // Argon2 PHC string, never leaves the service layer
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub profile_img: Option<String>,
    pub auth_code: String,
    pub created_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
    pub last_login_ip: Option<String>,
}

impl User {
    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("auth_code", &self.auth_code)
            .finish_non_exhaustive()
    }
}

/// Single-use registration code bound to one email.
#[derive(Debug, Clone, FromRow)]
pub struct InvitationCode {
    pub authcode: String,
    pub email: String,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub used: bool,
}

impl InvitationCode {
    /// Unused, bound to `email` (exact match) and not past its expiry, if it has one.
    pub fn is_redeemable(&self, email: &str, now: OffsetDateTime) -> bool {
        !self.used && self.email == email && self.expires_at.map_or(true, |exp| now < exp)
    }
}

/// Values for a user row created by registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub auth_code: String,
}

/// Columns a user may change on their own profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Phone,
    FirstName,
    LastName,
    ProfileImg,
}

#[derive(Debug, thiserror::Error)]
#[error("illegal profile field")]
pub struct IllegalField;

impl FromStr for ProfileField {
    type Err = IllegalField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "phone" => Ok(Self::Phone),
            "first_name" => Ok(Self::FirstName),
            "last_name" => Ok(Self::LastName),
            "profile_img" => Ok(Self::ProfileImg),
            _ => Err(IllegalField),
        }
    }
}

impl ProfileField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::ProfileImg => "profile_img",
        }
    }

    /// One fixed statement per column; the column name is never built from input.
    pub fn update_statement(self) -> &'static str {
        match self {
            Self::Phone => "UPDATE users SET phone = $1 WHERE id = $2",
            Self::FirstName => "UPDATE users SET first_name = $1 WHERE id = $2",
            Self::LastName => "UPDATE users SET last_name = $1 WHERE id = $2",
            Self::ProfileImg => "UPDATE users SET profile_img = $1 WHERE id = $2",
        }
    }
}
