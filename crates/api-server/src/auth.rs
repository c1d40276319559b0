//! Bearer-token authentication
//!
//! Token verification is delegated to a [`CallerResolver`]; handlers only see
//! the resolved user id through the [`AuthenticatedUser`] extractor.

use crate::error::ApiError;
use crate::ApiState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::collections::HashMap;

/// Maps a bearer token to the id of the user it belongs to
#[async_trait]
pub trait CallerResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<String>;
}

/// Fixed token table, loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, String>,
}

impl StaticTokenResolver {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl CallerResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.get(token).filter(|user| !user.is_empty()).cloned()
    }
}

/// User id of the authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<ApiState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::unauthorized("Missing or malformed Authorization header."))?;
        state
            .auth
            .resolve(token)
            .await
            .map(AuthenticatedUser)
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token."))
    }
}
