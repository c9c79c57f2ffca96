use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// Salted Argon2id digest in PHC string form (salt and cost are embedded).
pub fn hash_password(plain: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            HashError(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// `false` on mismatch and on a digest that does not parse.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "argon2 parse hash error");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

lazy_static! {
    static ref DUMMY_HASH: Option<String> = hash_password("shareflow-dummy-password").ok();
}

/// Computes the throwaway digest up front so the first unknown-email login
/// does not pay for it. `false` if it could not be built.
pub fn warm_up() -> bool {
    lazy_static::initialize(&DUMMY_HASH);
    DUMMY_HASH.is_some()
}

/// Spend one verification on a throwaway digest so an unknown email costs the
/// same as a wrong password.
pub fn burn_verification(plain: &str) {
    match DUMMY_HASH.as_deref() {
        Some(hash) => {
            let _ = verify_password(plain, hash);
        }
        // same Argon2 cost as a verification
        None => {
            let _ = hash_password(plain);
        }
    }
}

/// Runs hashing off the async executor.
pub async fn hash_password_blocking(plain: String) -> Result<String, HashError> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .map_err(|e| HashError(e.to_string()))?
}

pub async fn verify_password_blocking(plain: String, hash: Option<String>) -> bool {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&plain, &hash),
        None => {
            burn_verification(&plain);
            false
        }
    })
    .await
    .unwrap_or(false)
}
