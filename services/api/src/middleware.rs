//! Authentication middleware for JWT token validation
//!
//! Protected path prefixes behave like the platform's session gate:
//! requests that carry no credentials at all are redirected to the login
//! page, requests with a bad or expired token get a 401.

use anyhow::Result;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT claims issued by the auth service
#[derive(Debug, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

/// Token type enum
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub enum TokenType {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
}

/// Verifies access tokens against the auth service's public key
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier from a public key in PEM format
    pub fn new(public_key_pem: &str) -> Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())?;
        let mut validation = Validation::new(jsonwebtoken::Algorithm::RS256);
        validation.validate_exp = true;

        Ok(TokenVerifier {
            decoding_key,
            validation,
        })
    }

    /// Create a verifier from the `JWT_PUBLIC_KEY` environment variable
    /// (PEM inline or a path to a PEM file)
    pub fn from_env() -> Result<Self> {
        let public_key = std::env::var("JWT_PUBLIC_KEY")
            .map_err(|_| anyhow::anyhow!("JWT_PUBLIC_KEY environment variable not set"))?;

        let public_key = if public_key.starts_with("-----BEGIN") {
            public_key
        } else {
            std::fs::read_to_string(&public_key)
                .or_else(|_| {
                    let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
                    path.push(&public_key);
                    std::fs::read_to_string(path)
                })
                .map_err(|e| anyhow::anyhow!("Failed to read public key file: {}", e))?
                .trim()
                .to_string()
        };

        Self::new(&public_key)
    }

    /// Validate an access token and return the authenticated user
    pub fn verify(&self, token: &str) -> Result<AuthUser> {
        let token_data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?;

        // Refresh tokens are for the auth service only
        if token_data.claims.token_type != TokenType::Access {
            return Err(anyhow::anyhow!("Not an access token"));
        }

        Ok(AuthUser {
            id: token_data.claims.sub,
        })
    }
}

/// Authentication middleware for the protected routers
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // No credentials at all: send the session-less visitor to the login
    // page, like the original routing gate did.
    if !req.headers().contains_key(axum::http::header::AUTHORIZATION) {
        return Redirect::to("/login").into_response();
    }

    let Some(bearer) = req.headers().typed_get::<Authorization<Bearer>>() else {
        return ApiError::Unauthorized.into_response();
    };

    match state.token_verifier.verify(bearer.token()) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => {
            error!("Failed to validate token: {}", e);
            ApiError::Unauthorized.into_response()
        }
    }
}
