use crate::{errors::AppError, models::Claims, state::AppState};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use jsonwebtoken::{Algorithm, Validation, decode};
use uuid::Uuid;

/// Authenticated staff member, verified from a bearer token issued by the
/// school platform's auth service. Add `auth: AuthUser` as a parameter in any
/// handler that requires authentication.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers: &HeaderMap = &parts.headers;

        let auth_header = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format".to_string()))?;

        let token_data = decode::<Claims>(
            token,
            &state.jwt_decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AppError::InvalidToken)?;

        let user_id = Uuid::parse_str(&token_data.claims.sub).map_err(|_| AppError::InvalidToken)?;

        Ok(AuthUser {
            id: user_id,
            name: token_data.claims.name,
        })
    }
}
