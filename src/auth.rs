use std::future::{ready, Ready};
use std::time::Duration;

use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use bcrypt::{hash, verify};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{LedgerError, Result};

pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub exp: usize,
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: i64) -> Result<String> {
        let exp = (chrono::Utc::now().timestamp() as usize).saturating_add(self.ttl.as_secs() as usize);
        encode(&Header::default(), &Claims { user_id, exp }, &self.encoding)
            .map_err(|e| LedgerError::Internal(format!("failed to issue token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                warn!("JWT validation failed: {e}");
                LedgerError::Unauthorized
            })
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    hash(password, cost).map_err(|e| LedgerError::Internal(format!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    verify(password, password_hash).map_err(|e| LedgerError::Internal(format!("failed to verify password: {e}")))
}

/// Verified caller identity, taken from the `token` cookie or the
/// `Authorization` header (with or without a `Bearer ` prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
}

fn token_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value);
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = LedgerError;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(keys) = req.app_data::<web::Data<TokenKeys>>() else {
            return ready(Err(LedgerError::Internal("token keys are not configured".to_string())));
        };
        let res = match token_from_request(req) {
            Some(token) => keys.verify(&token).map(|claims| AuthenticatedUser {
                user_id: claims.user_id,
            }),
            None => Err(LedgerError::Unauthorized),
        };
        ready(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    fn keys() -> TokenKeys {
        TokenKeys::new("test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn test_issue_and_verify() {
        let keys = keys();
        let token = keys.issue(42).unwrap();
        assert_eq!(keys.verify(&token).unwrap().user_id, 42);

        let other = TokenKeys::new("other-secret", Duration::from_secs(3600));
        assert!(matches!(other.verify(&token), Err(LedgerError::Unauthorized)));
        assert!(matches!(keys.verify("garbage"), Err(LedgerError::Unauthorized)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = keys();
        let expired = encode(
            &Header::default(),
            &Claims {
                user_id: 1,
                exp: (chrono::Utc::now().timestamp() - 3600) as usize,
            },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(keys.verify(&expired), Err(LedgerError::Unauthorized)));
    }

    #[test]
    fn test_password_hashing() {
        let hashed = hash_password("s3cret", 4).unwrap();
        assert!(verify_password("s3cret", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }

    #[actix_web::test]
    async fn test_extractor_sources() {
        let keys = keys();
        let token = keys.issue(7).unwrap();

        let req = TestRequest::default()
            .app_data(web::Data::new(keys.clone()))
            .cookie(Cookie::new(TOKEN_COOKIE, token.clone()))
            .to_http_request();
        let user = AuthenticatedUser::extract(&req).await.unwrap();
        assert_eq!(user.user_id, 7);

        for value in [token.clone(), format!("Bearer {token}")] {
            let req = TestRequest::default()
                .app_data(web::Data::new(keys.clone()))
                .insert_header((header::AUTHORIZATION, value))
                .to_http_request();
            assert_eq!(AuthenticatedUser::extract(&req).await.unwrap().user_id, 7);
        }

        let req = TestRequest::default().app_data(web::Data::new(keys)).to_http_request();
        assert!(matches!(
            AuthenticatedUser::extract(&req).await,
            Err(LedgerError::Unauthorized)
        ));
    }
}
