use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

pub mod roles {
    pub const STUDENT: &str = "STUDENT";
    pub const STAFF: &str = "STAFF";
    pub const ADMIN: &str = "ADMIN";
}

/// Verified caller identity. Token verification happens upstream (API
/// gateway); this service only consumes the identity headers the gateway
/// injects after validating the JWT.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub role: String,
}

impl AuthContext {
    pub fn is_staff(&self) -> bool {
        self.role == roles::STAFF || self.role == roles::ADMIN
    }

    /// Owners see their own resources; staff see everyone's.
    pub fn can_access_user(&self, user_id: i64) -> bool {
        self.user_id == user_id || self.is_staff()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| {
                AppError::Unauthorized("missing or malformed identity header".to_string())
            })?;

        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|h| h.to_str().ok())
            .unwrap_or(roles::STUDENT)
            .to_string();

        Ok(AuthContext { user_id, role })
    }
}
