use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::services::Registration;

/// Request body for login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Response returned after login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Request body for user registration.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub authcode: String,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("authcode", &self.authcode)
            .finish()
    }
}

impl From<RegisterRequest> for Registration {
    fn from(r: RegisterRequest) -> Self {
        Self {
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            password: r.password,
            authcode: r.authcode,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: u16,
    pub message: &'static str,
}
