use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::{debug, error};
use uuid::Uuid;

use super::claims::Claims;
use crate::{
    config::JwtConfig,
    error::{AppError, INVALID_TOKEN},
};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signing and verification keys, built once from config at startup.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    validation: Validation,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            ttl: Duration::hours(cfg.ttl_hours),
            validation,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sign(&self, user_id: Uuid) -> Result<String, AppError> {
        self.sign_at(user_id, OffsetDateTime::now_utc())
    }

    pub(crate) fn sign_at(&self, user_id: Uuid, issued_at: OffsetDateTime) -> Result<String, AppError> {
        let expires_at = issued_at.checked_add(self.ttl).ok_or_else(|| {
            error!(ttl = %self.ttl, "token expiry out of range");
            AppError::Signing("token expiry out of range".into())
        })?;
        let claims = Claims {
            sub: user_id,
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };
        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding).map_err(|e| {
            error!(error = %e, "jwt encode failed");
            AppError::Signing(e.to_string())
        })?;
        debug!(user_id = %user_id, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    /// Any failure collapses to the same `invalid token` error.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(reason = ?e.kind(), "jwt rejected");
            AppError::Auth(INVALID_TOKEN)
        })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    fn make_keys(secret: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            ttl_hours: 72,
        })
    }

    fn assert_invalid(res: Result<Claims, AppError>) {
        match res {
            Err(AppError::Auth(msg)) => assert_eq!(msg, INVALID_TOKEN),
            other => panic!("expected invalid token, got {other:?}"),
        }
    }

    #[test]
    fn sign_and_verify() {
        let keys = make_keys("dev-secret");
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, 72 * 3600);
    }

    #[test]
    fn expiry_overflow_is_a_signing_error() {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            ttl_hours: 1_000_000_000,
        });
        assert!(matches!(keys.sign(Uuid::new_v4()), Err(AppError::Signing(_))));
    }

    #[test]
    fn rejects_other_secret() {
        let token = make_keys("secret-a").sign(Uuid::new_v4()).unwrap();
        assert_invalid(make_keys("secret-b").verify(&token));
    }

    #[test]
    fn rejects_flipped_signature() {
        let keys = make_keys("dev-secret");
        let token = keys.sign(Uuid::new_v4()).unwrap();
        let sig_start = token.rfind('.').unwrap() + 1;
        let mut bytes = token.into_bytes();
        bytes[sig_start] = if bytes[sig_start] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert_invalid(keys.verify(&tampered));
    }

    #[test]
    fn rejects_expired_token() {
        let keys = make_keys("dev-secret");
        let issued = OffsetDateTime::now_utc() - keys.ttl() - Duration::seconds(5);
        let token = keys.sign_at(Uuid::new_v4(), issued).unwrap();
        assert_invalid(keys.verify(&token));
    }

    #[test]
    fn rejects_other_algorithm() {
        let keys = make_keys("dev-secret");
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: now.unix_timestamp(),
            exp: (now + Duration::hours(1)).unix_timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"dev-secret"),
        )
        .unwrap();
        assert_invalid(keys.verify(&token));
    }

    #[test]
    fn rejects_unsigned_token() {
        let keys = make_keys("dev-secret");
        let exp = (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"sub":"{}","iat":0,"exp":{}}}"#,
            Uuid::new_v4(),
            exp
        ));
        assert_invalid(keys.verify(&format!("{header}.{payload}.")));
    }

    #[test]
    fn rejects_garbage() {
        let keys = make_keys("dev-secret");
        assert_invalid(keys.verify(""));
        assert_invalid(keys.verify("not.a.jwt"));
    }
}
