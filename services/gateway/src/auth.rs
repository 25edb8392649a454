use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use types::ids::UserId;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id issued by the identity provider
    pub sub: String,
    pub exp: usize,
}

/// Bearer token verification
pub struct AuthKeys {
    decoding: DecodingKey,
    validation: Validation,
}

impl AuthKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::default(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<UserId, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;
        let sub = token_data.claims.sub.trim();
        if sub.is_empty() {
            return Err(AppError::Unauthorized("Token has no subject".into()));
        }
        Ok(UserId::new(sub))
    }
}

pub struct AuthenticatedUser {
    pub user_id: UserId,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing authentication credentials".into()))?;
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid header string".into()))?;
        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Expected a bearer token".into()))?;

        Ok(AuthenticatedUser {
            user_id: state.auth.verify(token)?,
        })
    }
}
