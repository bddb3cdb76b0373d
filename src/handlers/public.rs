use axum::{
    extract::State,
    http::{Method, Uri},
};
use axum_extra::extract::CookieJar;

use crate::{
    AppState,
    auth::{session_cookie, verify_session_token},
    error::{ApiError, ApiResult},
    models::AuthenticateRequest,
    response::{ApiResponse, JsonBody},
};

/// Name reported by the health probe.
pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "public",
    responses((status = 200, description = "Service is running"))
)]
pub async fn health() -> ApiResponse<String> {
    ApiResponse::ok("OK", format!("Service is running: {SERVICE_NAME}"))
}

/// authenticate
///
/// [Public Route] Exchanges a token for the `Authorization` session cookie.
///
/// Admin tokens only need a valid signature. User tokens must also be persisted
/// and unrevoked.
#[utoipa::path(
    post,
    path = "/authenticate",
    tag = "public",
    request_body = AuthenticateRequest,
    responses(
        (status = 200, description = "Token validated, cookie set"),
        (status = 400, description = "Token missing"),
        (status = 401, description = "Invalid or unknown token")
    )
)]
pub async fn authenticate(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(body): JsonBody<AuthenticateRequest>,
) -> ApiResult<(CookieJar, ApiResponse<()>)> {
    let token = body
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Invalid request body", "Token field is required"))?;

    let claims = verify_session_token(&state.tokens, &state.repo, &token)
        .await
        .map_err(|err| match err {
            ApiError::Unauthorized { detail, .. } => ApiError::unauthorized("Invalid token", detail),
            other => other,
        })?;

    tracing::info!(subject = %claims.sub, role = %claims.role, "session cookie issued");

    Ok((jar.add(session_cookie(token)), ApiResponse::message("Token validated")))
}

/// route_not_found
///
/// Router fallback for unknown paths.
pub async fn route_not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::not_found(
        format!("Route Not Found: ({method}) - '{uri}'"),
        "(404) Route not found",
    )
}

/// method_not_allowed
///
/// Fallback for known paths hit with an unsupported method.
pub async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::MethodNotAllowed {
        message: format!("Method Not Allowed: ({method}) - '{uri}'"),
        detail: "(405) Method not allowed".to_string(),
    }
}
