// Session resolution: turn raw request headers into a Principal
// Decision: Resolvers never fail the pipeline; "unauthenticated" is None and the guard rejects it
// Decision: The gateway resolves from the access cookie, backends from the forwarded x-user header

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use axum_extra::extract::CookieJar;

use crate::{
    error::ApiError,
    principal::{Principal, USER_HEADER},
    token::TokenService,
};

/// Name of the access token cookie
pub const ACCESS_COOKIE: &str = "token";

/// Extracts identity from an incoming request.
/// Returns `None` when the request carries no usable identity.
#[async_trait::async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Principal>;
}

/// Resolves the principal from the self-issued access token cookie.
pub struct CookieTokenResolver {
    tokens: Arc<TokenService>,
}

impl CookieTokenResolver {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

#[async_trait::async_trait]
impl SessionResolver for CookieTokenResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Principal> {
        let jar = CookieJar::from_headers(headers);
        let Some(cookie) = jar.get(ACCESS_COOKIE) else {
            tracing::debug!("No access token cookie");
            return None;
        };

        match self.tokens.verify_access(cookie.value()) {
            Ok(principal) => Some(principal),
            Err(e) => {
                tracing::debug!(error = %e, "Access token rejected");
                None
            }
        }
    }
}

/// Resolves the principal from the gateway-injected `x-user` header.
///
/// Only valid behind the gateway: the gateway strips any client-supplied
/// `x-user` value and overwrites it, so backends can trust it implicitly.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardedPrincipalResolver;

#[async_trait::async_trait]
impl SessionResolver for ForwardedPrincipalResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Principal> {
        forwarded_principal(headers)
    }
}

fn forwarded_principal(headers: &HeaderMap) -> Option<Principal> {
    let value = headers.get(USER_HEADER)?;
    match Principal::from_header_value(value) {
        Ok(principal) => Some(principal),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse x-user header");
            None
        }
    }
}

/// Extractor for backends: the principal forwarded by the gateway.
/// Rejects with 401 if the header is missing or unparsable.
#[derive(Debug, Clone)]
pub struct ForwardedPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ForwardedPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        forwarded_principal(&parts.headers)
            .map(ForwardedPrincipal)
            .ok_or(ApiError::Unauthorized)
    }
}
