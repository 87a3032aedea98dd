use anyhow::Context;
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::{
    config::JwtConfig,
    error::{AppError, AppResult},
    state::AppState,
};

/// Scheme label placed in front of tokens in `Authorization` headers and login responses.
pub const BEARER: &str = "Bearer ";

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::seconds(cfg.ttl_minutes.saturating_mul(60)),
        }
    }

    /// Signs a token for `user_uuid` that expires `ttl` from now.
    pub fn issue(&self, user_uuid: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now
            .checked_add(self.ttl)
            .context("token expiry out of range")?;
        let claims = Claims {
            sub: user_uuid,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_uuid = %user_uuid, "jwt signed");
        Ok(token)
    }

    /// Strict check of a bare token: signature, expiry, issuer and audience.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_uuid = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }

    /// Accepts a raw `Authorization` value with or without the scheme label and
    /// returns the subject. Every failure is the same `Unauthorized`.
    pub fn validate(&self, raw: &str) -> AppResult<Uuid> {
        self.verify(strip_scheme(raw))
            .map(|claims| claims.sub)
            .map_err(|e| {
                debug!(error = %e, "jwt rejected");
                AppError::Unauthorized("invalid or expired token".into())
            })
    }
}

/// Drops a leading `Bearer ` (any case). Input without the label, or shorter
/// than it, is returned trimmed and otherwise untouched.
pub fn strip_scheme(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..BEARER.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER) => raw[BEARER.len()..].trim_start(),
        _ => raw,
    }
}

/// Transport form of a token as handed back to clients.
pub fn bearer(token: &str) -> String {
    format!("{BEARER}{token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_keys(secret: &str, ttl_minutes: i64) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes,
        })
    }

    #[test]
    fn issue_then_validate_returns_subject() {
        let keys = make_keys("dev-secret", 5);
        let user_uuid = Uuid::new_v4();
        let token = keys.issue(user_uuid).expect("sign");
        assert_eq!(keys.validate(&token).expect("validate"), user_uuid);

        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn validate_accepts_scheme_prefixed_values() {
        let keys = make_keys("dev-secret", 5);
        let user_uuid = Uuid::new_v4();
        let token = keys.issue(user_uuid).expect("sign");

        for raw in [
            bearer(&token),
            format!("bearer {token}"),
            format!("  Bearer   {token}  "),
        ] {
            assert_eq!(keys.validate(&raw).expect("validate"), user_uuid);
        }
    }

    #[test]
    fn validate_handles_short_and_prefix_only_input() {
        let keys = make_keys("dev-secret", 5);
        for raw in ["", "B", "Bear", "Bearer", "Bearer ", "Bearer  ", "ü"] {
            let err = keys.validate(raw).unwrap_err();
            assert!(matches!(err, AppError::Unauthorized(_)), "input {raw:?}");
        }
    }

    #[test]
    fn strip_scheme_leaves_unprefixed_values_alone() {
        assert_eq!(strip_scheme("abc.def.ghi"), "abc.def.ghi");
        assert_eq!(strip_scheme("Bearer abc"), "abc");
        assert_eq!(strip_scheme("BEARER abc"), "abc");
        assert_eq!(strip_scheme("Basic abc"), "Basic abc");
        // multi-byte characters straddling the prefix length must not panic
        assert_eq!(strip_scheme("ééééé"), "ééééé");
    }

    #[test]
    fn expired_token_is_unauthorized() {
        // well past the default validation leeway
        let keys = make_keys("dev-secret", -5);
        let token = keys.issue(Uuid::new_v4()).expect("sign");
        let err = keys.validate(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn unrepresentable_expiry_is_an_error() {
        for ttl in [9_999_999_999, i64::MAX] {
            let err = make_keys("dev-secret", ttl).issue(Uuid::new_v4()).unwrap_err();
            assert!(err.to_string().contains("expiry"), "{ttl}: {err}");
        }
    }

    #[test]
    fn token_from_other_secret_is_unauthorized() {
        let good = make_keys("secret-a", 5);
        let other = make_keys("secret-b", 5);
        let token = other.issue(Uuid::new_v4()).expect("sign");
        let err = good.validate(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn failures_share_one_message() {
        let keys = make_keys("secret-a", 5);
        let foreign = make_keys("secret-b", 5).issue(Uuid::new_v4()).expect("sign");
        let expired = make_keys("secret-a", -5).issue(Uuid::new_v4()).expect("sign");
        let messages: Vec<String> = [foreign.as_str(), expired.as_str(), "garbage"]
            .into_iter()
            .map(|raw| keys.validate(raw).unwrap_err().to_string())
            .collect();
        assert!(messages.iter().all(|m| m == "invalid or expired token"));
    }

    #[test]
    fn malformed_or_missing_subject_is_unauthorized() {
        let keys = make_keys("dev-secret", 5);
        let encoding = EncodingKey::from_secret(b"dev-secret");
        let exp = (OffsetDateTime::now_utc() + Duration::minutes(5)).unix_timestamp();

        let bad_sub = json!({
            "sub": "not-a-uuid", "exp": exp, "iat": 0, "iss": "test-issuer", "aud": "test-aud"
        });
        let no_sub = json!({ "exp": exp, "iat": 0, "iss": "test-issuer", "aud": "test-aud" });

        for claims in [bad_sub, no_sub] {
            let token = encode(&Header::default(), &claims, &encoding).expect("sign");
            assert!(matches!(
                keys.validate(&token).unwrap_err(),
                AppError::Unauthorized(_)
            ));
        }
    }
}
