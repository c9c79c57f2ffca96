use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::{auth::identity::Identity, config::JwtConfig, store::UserId};

/// Largest integer a JSON number can carry through an f64 without loss.
const MAX_SAFE_ID: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("token expiry out of range")]
    ExpiryOutOfRange,
    #[error("invalid token")]
    Invalid,
}

/// Claims as written into a session token.
#[derive(Debug, Serialize)]
struct Claims<'a> {
    id: UserId,
    firstname: &'a str,
    lastname: &'a str,
    email: &'a str,
    iat: i64,
    exp: i64,
    iss: &'a str,
}

/// Claims as read back. `id` stays an untyped JSON number until it has been
/// range-checked.
#[derive(Debug, Deserialize)]
struct RawClaims {
    id: Number,
    firstname: String,
    lastname: String,
    email: String,
}

fn narrow_id(n: &Number) -> Result<UserId, TokenError> {
    if let Some(i) = n.as_i64() {
        return if i > 0 { Ok(i) } else { Err(TokenError::Invalid) };
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && (1.0..=MAX_SAFE_ID).contains(&f) => Ok(f as UserId),
        _ => Err(TokenError::Invalid),
    }
}

impl TryFrom<RawClaims> for Identity {
    type Error = TokenError;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        Ok(Identity {
            id: narrow_id(&raw.id)?,
            first_name: raw.firstname,
            last_name: raw.lastname,
            email: raw.email,
            profile_img: None,
        })
    }
}

/// HS256 signing and verification for session tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl,
        }
    }

    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self::new(
            cfg.secret.as_bytes(),
            cfg.issuer.clone(),
            Duration::from_secs(cfg.ttl_minutes.unsigned_abs().saturating_mul(60)),
        )
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        self.issue_at(identity, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(
        &self,
        identity: &Identity,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let exp = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(TimeDuration::seconds(secs)))
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let claims = Claims {
            id: identity.id,
            firstname: &identity.first_name,
            lastname: &identity.last_name,
            email: &identity.email,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: &self.issuer,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = identity.id, "jwt signed");
        Ok(token)
    }

    /// Signature, issuer and expiry are checked before any claim is trusted.
    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iss"]);
        let data = decode::<RawClaims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            TokenError::Invalid
        })?;
        let identity = Identity::try_from(data.claims)?;
        debug!(user_id = identity.id, "jwt verified");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec(secret: &str) -> TokenCodec {
        TokenCodec::new(secret.as_bytes(), "test-issuer", Duration::from_secs(3600))
    }

    fn identity() -> Identity {
        Identity {
            id: 42,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "a@x.com".into(),
            profile_img: None,
        }
    }

    fn raw_token(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encode raw claims")
    }

    fn far_future() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp() + 3600
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let keys = codec("dev-secret");
        let token = keys.issue(&identity()).expect("sign");
        let back = keys.verify(&token).expect("verify");
        assert_eq!(back, identity());
    }

    #[test]
    fn oversized_ttl_is_an_error_not_a_panic() {
        let cfg = JwtConfig {
            secret: "dev-secret".into(),
            issuer: "test-issuer".into(),
            ttl_minutes: 10_000_000_000,
        };
        let err = TokenCodec::from_config(&cfg).issue(&identity()).unwrap_err();
        assert!(matches!(err, TokenError::ExpiryOutOfRange));

        let huge = TokenCodec::new(b"dev-secret", "test-issuer", Duration::from_secs(u64::MAX));
        assert!(matches!(
            huge.issue(&identity()),
            Err(TokenError::ExpiryOutOfRange)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = codec("dev-secret");
        let two_hours_ago = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let token = keys.issue_at(&identity(), two_hours_ago).expect("sign");
        assert!(matches!(keys.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = codec("good-secret").issue(&identity()).expect("sign");
        assert!(codec("other-secret").verify(&token).is_err());
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let other = TokenCodec::new(b"dev-secret", "someone-else", Duration::from_secs(3600));
        let token = other.issue(&identity()).expect("sign");
        assert!(codec("dev-secret").verify(&token).is_err());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let keys = codec("dev-secret");
        let token = keys.issue(&identity()).expect("sign");
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let forged = raw_token(
            "attacker",
            json!({"id": 1, "firstname": "x", "lastname": "y", "email": "z",
                   "exp": far_future(), "iss": "test-issuer"}),
        );
        parts[1] = forged.split('.').nth(1).unwrap().to_string();
        assert!(keys.verify(&parts.join(".")).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = codec("dev-secret");
        for t in ["", "abc", "a.b.c", "Bearer x.y.z"] {
            assert!(keys.verify(t).is_err());
        }
    }

    #[test]
    fn integral_float_id_is_accepted() {
        let token = raw_token(
            "dev-secret",
            json!({"id": 42.0, "firstname": "Ada", "lastname": "Lovelace",
                   "email": "a@x.com", "exp": far_future(), "iss": "test-issuer"}),
        );
        let id = codec("dev-secret").verify(&token).expect("verify");
        assert_eq!(id.id, 42);
    }

    #[test]
    fn ill_typed_or_out_of_range_id_is_rejected() {
        let keys = codec("dev-secret");
        for bad_id in [json!(42.5), json!(-1), json!(0), json!(1e300), json!("42"), json!(null)] {
            let token = raw_token(
                "dev-secret",
                json!({"id": bad_id, "firstname": "Ada", "lastname": "Lovelace",
                       "email": "a@x.com", "exp": far_future(), "iss": "test-issuer"}),
            );
            assert!(
                matches!(keys.verify(&token), Err(TokenError::Invalid)),
                "id {bad_id} should be rejected"
            );
        }
    }

    #[test]
    fn missing_claim_is_rejected() {
        let token = raw_token(
            "dev-secret",
            json!({"id": 42, "firstname": "Ada", "email": "a@x.com",
                   "exp": far_future(), "iss": "test-issuer"}),
        );
        assert!(codec("dev-secret").verify(&token).is_err());
    }

    #[test]
    fn missing_exp_is_rejected() {
        let token = raw_token(
            "dev-secret",
            json!({"id": 42, "firstname": "Ada", "lastname": "Lovelace",
                   "email": "a@x.com", "iss": "test-issuer"}),
        );
        assert!(codec("dev-secret").verify(&token).is_err());
    }
}
