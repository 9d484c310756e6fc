use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::state::AppState;
use crate::utils::jwt;

pub const DLQ_MANAGE: &str = "dlq:manage";

/// Authenticated owner extracted from the `Authorization: Bearer <token>` header.
///
/// Tokens are issued by the login layer in front of this service; the
/// subject is the owner's id on the social platform.
pub struct AuthUser {
    pub owner_id: String,
    pub handle: String,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Returns `Ok(())` if the user has the given permission, `Err(PermissionDenied)` otherwise.
    pub fn require_permission(&self, permission: &str) -> Result<(), AppError> {
        if self.permissions.iter().any(|p| p == permission) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::TokenMissing)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenInvalid)?;

        let claims = jwt::verify(&state.config.auth.jwt_secret, token)
            .map_err(|_| AppError::TokenInvalid)?;

        if claims.sub.trim().is_empty() {
            return Err(AppError::TokenInvalid);
        }

        Ok(AuthUser {
            owner_id: claims.sub,
            handle: claims.handle,
            permissions: claims.permissions,
        })
    }
}
