//! Token decoding: signature verification plus claim validation.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Turns a bearer token into trusted claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// Shared-secret HMAC-SHA256 tokens.
///
/// Expiry lives in the `issued_at`/`expires_at` claims rather than the
/// registered `exp`, so the library's own time checks are switched off and
/// [`validate_claims`] runs instead.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign claims with the same secret (dev tooling and tests).
    pub fn issue(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use procura_core::UserId;

    use crate::Role;

    fn claims(ttl_minutes: i64) -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: UserId::new(),
            name: Some("Super Admin".to_string()),
            roles: vec![Role::SUPER_ADMIN],
            issued_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }

    #[test]
    fn issued_token_validates() {
        let validator = Hs256JwtValidator::new("test-secret");
        let claims = claims(10);
        let token = validator.issue(&claims).unwrap();

        let decoded = validator.validate(&token, Utc::now()).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let token = Hs256JwtValidator::new("one").issue(&claims(10)).unwrap();

        match Hs256JwtValidator::new("two").validate(&token, Utc::now()) {
            Err(TokenValidationError::Malformed(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn expired_claims_are_rejected_after_decoding() {
        let validator = Hs256JwtValidator::new("test-secret");
        let token = validator.issue(&claims(1)).unwrap();

        assert_eq!(
            validator.validate(&token, Utc::now() + Duration::minutes(5)),
            Err(TokenValidationError::Expired)
        );
    }
}
