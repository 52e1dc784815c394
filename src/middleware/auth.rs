// Bearer-token authentication
//
// Tokens are HS256 JWTs whose `sub` claim is the identity-provider username.
// Handlers pick the strictness they need through the extractor they take.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::models::{AppState, User};
use crate::types::{AppError, AppResult};

const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Sign a token for `username`, valid for `ttl`
pub fn issue_token(username: &str, secret: &str, ttl: Duration) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: username.to_string(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
}

/// `Authorization: Bearer <token>`; the scheme is case-insensitive
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn subject_from_parts(parts: &Parts, state: &AppState) -> AppResult<String> {
    let token = bearer_token(parts).ok_or_else(|| AppError::Auth(INVALID_CREDENTIALS.to_string()))?;

    let claims = decode_token(token, &state.config.auth.jwt_secret).map_err(|e| {
        warn!("JWT validation failed: {}", e);
        AppError::Auth(INVALID_CREDENTIALS.to_string())
    })?;

    if claims.sub.trim().is_empty() {
        return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
    }
    Ok(claims.sub)
}

/// Subject of a valid token; the user does not have to be registered yet
#[derive(Debug, Clone)]
pub struct TokenSubject(pub String);

impl FromRequestParts<AppState> for TokenSubject {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        subject_from_parts(parts, state).map(TokenSubject)
    }
}

/// A registered user; rejects with 401 otherwise
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let subject = subject_from_parts(parts, state)?;

        match state.repo.get_user_by_username(&subject).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(AppError::Auth(INVALID_CREDENTIALS.to_string())),
            Err(e) => {
                error!("User lookup during authentication failed: {}", e);
                Err(AppError::Auth(INVALID_CREDENTIALS.to_string()))
            }
        }
    }
}

/// The caller when a usable token is present, anonymous otherwise. Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if bearer_token(parts).is_none() {
            return Ok(MaybeUser(None));
        }

        match CurrentUser::from_request_parts(parts, state).await {
            Ok(CurrentUser(user)) => Ok(MaybeUser(Some(user))),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    const SECRET: &str = "test-secret";

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_issue_and_decode() {
        let token = issue_token("cognito-sub-1", SECRET, Duration::minutes(5)).unwrap();
        let claims = decode_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "cognito-sub-1");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_and_expired_tokens_fail() {
        let token = issue_token("alice", SECRET, Duration::minutes(5)).unwrap();
        assert!(decode_token(&token, "other-secret").is_err());

        let expired = issue_token("alice", SECRET, Duration::minutes(-10)).unwrap();
        assert!(decode_token(&expired, SECRET).is_err());
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }
}
