use axum::extract::{Path, State};
use uuid::Uuid;

use crate::{
    AppState,
    error::{ApiError, ApiResult, RepoResultExt},
    models::{AuthTokenResponse, GenerateTokenRequest},
    response::{ApiResponse, JsonBody},
    token::{Role, TokenError},
};

/// Display name and action carried by admin tokens.
const ADMIN_NAME: &str = "Admin";
const ADMIN_ACTION: &str = "ADMIN";

fn issue_error(err: TokenError) -> ApiError {
    if err.is_configuration() {
        ApiError::internal("Failed to generate token", err)
    } else {
        ApiError::bad_request("Failed to generate token", err.to_string())
    }
}

/// generate_admin_token
///
/// [Admin Route] Issues a non-expiring admin token under a fresh random subject.
#[utoipa::path(
    post,
    path = "/admin/generate-admin-token",
    tag = "admin",
    responses(
        (status = 200, description = "Token generated", body = String),
        (status = 401, description = "Missing or wrong Admin-Secret")
    )
)]
pub async fn generate_admin_token(State(state): State<AppState>) -> ApiResult<ApiResponse<String>> {
    let subject = Uuid::new_v4();
    let token = state
        .tokens
        .issue(&subject.to_string(), ADMIN_NAME, Role::Admin.as_str(), ADMIN_ACTION, false)
        .map_err(|e| ApiError::internal("Failed to generate token", e))?;

    tracing::info!(%subject, "admin token issued");
    Ok(ApiResponse::ok("Token generated successfully", token))
}

/// generate_token
///
/// [Admin Route] Issues a user token scoped to one customer and action, and persists it
/// so it can later be revoked.
#[utoipa::path(
    post,
    path = "/admin/generate-token",
    tag = "admin",
    request_body = GenerateTokenRequest,
    responses(
        (status = 200, description = "Token generated", body = AuthTokenResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 404, description = "Customer does not exist")
    )
)]
pub async fn generate_token(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<GenerateTokenRequest>,
) -> ApiResult<ApiResponse<AuthTokenResponse>> {
    let invalid = |detail: &str| ApiError::bad_request("Invalid request body", detail);

    let customer_id = body
        .customer_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| invalid("Customer ID field is required"))?;
    let customer_id = Uuid::parse_str(&customer_id).map_err(|_| invalid("Invalid Customer ID"))?;

    let action = body
        .action
        .filter(|a| !a.is_empty())
        .ok_or_else(|| invalid("Action field is required"))?;
    if !state.tokens.is_allowed_action(&action) {
        return Err(invalid("Action not allowed"));
    }

    let customer = state
        .repo
        .find_customer(customer_id)
        .await
        .or_internal("Database error")?
        .ok_or_else(|| ApiError::not_found("Customer not found", "Customer does not exist"))?;

    let token = state
        .tokens
        .issue(&customer.id.to_string(), &customer.name, Role::User.as_str(), &action, body.expires)
        .map_err(issue_error)?;

    let record = state
        .repo
        .insert_auth_token(customer.id, &action, &token)
        .await
        .or_internal("Failed to save token")?;

    tracing::info!(customer_id = %customer.id, %action, token_id = %record.id, "user token issued");
    Ok(ApiResponse::ok("Token generated successfully", AuthTokenResponse::new(&record, &customer)))
}

/// revoke_token
///
/// [Admin Route] Soft-deletes a persisted user token. Sessions holding it are rejected
/// from the next request on.
#[utoipa::path(
    delete,
    path = "/admin/tokens/{token_id}",
    tag = "admin",
    params(("token_id" = String, Path, description = "Persisted token id")),
    responses(
        (status = 200, description = "Token revoked"),
        (status = 404, description = "Unknown or already revoked token")
    )
)]
pub async fn revoke_token(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    let token_id = Uuid::parse_str(&token_id)
        .map_err(|_| ApiError::bad_request("Invalid token ID", "Invalid UUID format"))?;

    let revoked = state
        .repo
        .revoke_auth_token(token_id)
        .await
        .or_internal("Failed to revoke token")?;
    if !revoked {
        return Err(ApiError::not_found("Token not found", "No token found with the given ID"));
    }

    tracing::info!(%token_id, "token revoked");
    Ok(ApiResponse::message("Token revoked"))
}
