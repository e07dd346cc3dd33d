//! Authentication and authorization utilities
//!
//! Provides:
//! - Credential hashing (argon2id) and secret generation
//! - `Authorization: Bearer` parsing
//! - Tenant authentication middleware and the [`AuthContext`] it attaches
//! - Admin token guard for bootstrap routes

mod hashing;

pub use hashing::CredentialHasher;

use crate::errors::{AppError, Result};
use crate::fleet::TenantDirectory;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const MISSING_AUTH_HEADER: &str = "Missing Authorization header";
pub const MALFORMED_AUTH_HEADER: &str = "Invalid Authorization header format. Expected: Bearer <token>";

/// Prefix of tenant admin API keys
pub const API_KEY_PREFIX: &str = "ak_";
/// Prefix of relay keys
pub const RELAY_KEY_PREFIX: &str = "rk_";
/// Prefix of publisher join tokens
pub const JOIN_TOKEN_PREFIX: &str = "jt_";

/// Authenticated tenant attached to every tenant-scoped request
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Tenant ID
    pub tenant_id: Uuid,

    /// Tenant name
    pub tenant_name: String,

    /// Request ID for tracing
    pub request_id: String,
}

/// Generate a random secret with a type prefix, e.g. `rk_3f9c...`
pub fn generate_secret(prefix: &str) -> String {
    let random_bytes: [u8; 32] = rand::random();
    format!("{}{}", prefix, hex::encode(random_bytes))
}

/// Short, non-reversible tag for a presented secret so failed attempts can be
/// correlated in logs without logging the secret itself
pub fn credential_fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(&digest[..4])
}

/// Extract the token from an `Authorization` header value.
///
/// The value must be exactly two space-separated parts, the first being
/// `Bearer`.
pub fn parse_bearer(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or_else(|| AppError::unauthorized(MISSING_AUTH_HEADER))?;

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AppError::unauthorized(MALFORMED_AUTH_HEADER)),
    }
}

fn authorization_header(headers: &axum::http::HeaderMap) -> Result<Option<&str>> {
    match headers.get(AUTHORIZATION) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| AppError::unauthorized(MALFORMED_AUTH_HEADER)),
    }
}

fn request_id(headers: &axum::http::HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Middleware for tenant API key authentication.
///
/// Rejects with 401 when the header is missing, malformed, or carries a key
/// that matches no tenant; otherwise inserts an [`AuthContext`].
pub async fn require_tenant(
    State(directory): State<TenantDirectory>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let token = parse_bearer(authorization_header(request.headers())?)?.to_string();

    let Some(tenant) = directory.verify_api_key(&token).await? else {
        crate::metrics::record_auth_failure("tenant_key");
        tracing::warn!(
            path = %request.uri().path(),
            fingerprint = %credential_fingerprint(&token),
            "Rejected tenant API key"
        );
        return Err(AppError::InvalidApiKey);
    };

    let context = AuthContext {
        tenant_id: tenant.id,
        tenant_name: tenant.name,
        request_id: request_id(request.headers()),
    };
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Axum extractor for AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::Internal {
                message: "Tenant authentication middleware not installed on this route".to_string(),
            })
    }
}

/// Holds the hash of the configured admin token
#[derive(Clone)]
pub struct AdminGuard {
    hasher: CredentialHasher,
    token_hash: Option<String>,
}

impl AdminGuard {
    /// Hash the configured admin token once at startup
    pub fn new(hasher: CredentialHasher, admin_token: Option<&str>) -> Result<Self> {
        let token_hash = admin_token
            .filter(|t| !t.is_empty())
            .map(|t| hasher.hash(t))
            .transpose()?;

        Ok(Self { hasher, token_hash })
    }

    pub fn is_enabled(&self) -> bool {
        self.token_hash.is_some()
    }

    async fn verify(&self, token: &str) -> Result<bool> {
        let Some(hash) = self.token_hash.clone() else {
            return Ok(false);
        };
        let found = self
            .hasher
            .find_match_blocking(token.to_string(), vec![((), hash)])
            .await?;
        Ok(found.is_some())
    }
}

/// Middleware guarding the admin bootstrap routes
pub async fn require_admin(
    State(guard): State<AdminGuard>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    if !guard.is_enabled() {
        return Err(AppError::Forbidden {
            message: "Admin API is disabled".to_string(),
        });
    }

    let token = parse_bearer(authorization_header(request.headers())?)?;
    if !guard.verify(token).await? {
        crate::metrics::record_auth_failure("admin_token");
        tracing::warn!(path = %request.uri().path(), "Rejected admin token");
        return Err(AppError::unauthorized("Invalid admin token"));
    }

    Ok(next.run(request).await)
}
