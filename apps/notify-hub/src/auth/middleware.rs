//! Bearer token extraction for REST routes and the WebSocket upgrade.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth::tokens::{self, ADMIN_ROLE};
use crate::error::ApiError;
use crate::AppState;

/// Authenticated caller, from `Authorization: Bearer <jwt>` or, for browser
/// WebSocket clients that cannot set headers, the `access_token` query param.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub is_admin: bool,
}

/// Rejection returned when the bearer token is missing or invalid.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Result<String, AuthError> {
    if let Some(header) = parts.headers.get(AUTHORIZATION) {
        let header = header.to_str().map_err(|_| AuthError {
            message: "Invalid Authorization header format",
        })?;
        return header
            .strip_prefix("Bearer ")
            .map(String::from)
            .ok_or(AuthError {
                message: "Invalid Authorization header format",
            });
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.access_token)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError {
            message: "Missing access token",
        })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let claims = tokens::validate_access_token(
            &token,
            &state.config.jwt_secret,
            state.config.jwt_issuer.as_deref(),
        )
        .map_err(|_| AuthError {
            message: "Invalid or expired token",
        })?;

        Ok(AuthUser {
            is_admin: claims.has_role(ADMIN_ROLE),
            user_id: claims.sub,
        })
    }
}

/// An [`AuthUser`] holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        if !user.is_admin {
            tracing::debug!(user_id = %user.user_id, "admin role required");
            return Err(ApiError::forbidden("Admin role required").into_response());
        }
        Ok(AdminUser(user))
    }
}
