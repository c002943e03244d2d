//! Bearer-token authentication.
//!
//! The middleware extracts `Authorization: Bearer <token>`, hands the token to the
//! configured [`IdentityVerifier`] and stores the resulting [`Identity`] in the
//! request extensions. Handlers never trust an email from the request body.

mod gate;

pub use gate::*;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::Config;
use crate::errors::AppError;

/// Verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
}

impl Identity {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.trim().to_ascii_lowercase(),
        }
    }
}

/// Validates a bearer credential and yields the caller identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AppError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
}

/// Verifies HS256-signed identity tokens carrying an `email` claim.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8], issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        match audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            config.jwt_issuer.as_deref(),
            config.jwt_audience.as_deref(),
        )
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid identity token: {}", e)))?;

        if data.claims.email_verified == Some(false) {
            return Err(AppError::Unauthorized("Email address is not verified".to_string()));
        }

        match data.claims.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => Ok(Identity::new(email)),
            _ => Err(AppError::Unauthorized(
                "Identity token carries no email".to_string(),
            )),
        }
    }
}

/// Bearer authentication layer; the verifier call is bounded by `verify_timeout`.
pub async fn bearer_auth_layer(
    verifier: Arc<dyn IdentityVerifier>,
    verify_timeout: Duration,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return AppError::Unauthorized("Unauthorized Access".to_string()).into_response();
    };

    match tokio::time::timeout(verify_timeout, verifier.verify(&token)).await {
        Ok(Ok(identity)) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Ok(Err(e)) => {
            tracing::warn!(path = %request.uri().path(), "Rejected credential: {}", e.message());
            e.into_response()
        }
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Identity verification timed out");
            AppError::Unauthorized("Identity verification timed out".to_string()).into_response()
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
