use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::JwtConfig;
use crate::error::BookingError;

/// Аутентифицированный пользователь. Идентификатор непрозрачен для ядра.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
}

/// Проверка bearer-токенов внешнего провайдера идентификации (HS256).
#[derive(Clone)]
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl JwtVerifier {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, BookingError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "bearer token rejected");
            BookingError::Unauthenticated
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(BookingError::Unauthenticated);
        }
        Ok(AuthUser { user_id: data.claims.sub })
    }

    /// Выпускает токен тем же секретом. Нужен локальным клиентам и тестам.
    pub fn issue(&self, user_id: &str, ttl_secs: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: Utc::now().timestamp() + ttl_secs,
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// Bearer auth extractor
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = BookingError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(BookingError::Unauthenticated)?;
        state.identity.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(issuer: Option<&str>) -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            issuer: issuer.map(str::to_string),
        }
    }

    #[test]
    fn issued_token_verifies_to_subject() {
        let verifier = JwtVerifier::new(&config(None));
        let token = verifier.issue("user-42", 3600).unwrap();
        assert_eq!(
            verifier.verify(&token).unwrap(),
            AuthUser { user_id: "user-42".to_string() }
        );
    }

    #[test]
    fn rejects_foreign_secret_expired_and_garbage() {
        let verifier = JwtVerifier::new(&config(None));
        let other = JwtVerifier::new(&JwtConfig {
            secret: "other".to_string(),
            issuer: None,
        });
        let foreign = other.issue("user-1", 3600).unwrap();
        assert_eq!(verifier.verify(&foreign), Err(BookingError::Unauthenticated));

        let expired = verifier.issue("user-1", -3600).unwrap();
        assert_eq!(verifier.verify(&expired), Err(BookingError::Unauthenticated));

        assert_eq!(verifier.verify("not-a-jwt"), Err(BookingError::Unauthenticated));
    }

    #[test]
    fn issuer_must_match_when_configured() {
        let strict = JwtVerifier::new(&config(Some("https://id.example")));
        let loose = JwtVerifier::new(&config(None));
        let token = loose.issue("user-1", 3600).unwrap();
        assert_eq!(strict.verify(&token), Err(BookingError::Unauthenticated));

        let token = strict.issue("user-1", 3600).unwrap();
        assert!(strict.verify(&token).is_ok());
    }
}
