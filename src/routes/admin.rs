use crate::{AppState, handlers::admin};
use axum::{
    Router,
    routing::{delete, post},
};

/// Admin Router Module
///
/// Token management. Mounted under `/admin` and wrapped in `require_admin_secret`, so
/// every route here requires the `Admin-Secret` header rather than a session.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /admin/generate-admin-token
        // Issues a non-expiring admin token.
        .route("/generate-admin-token", post(admin::generate_admin_token))
        // POST /admin/generate-token
        // Issues and persists a user token scoped to a customer and action.
        .route("/generate-token", post(admin::generate_token))
        // DELETE /admin/tokens/{token_id}
        // Revokes a persisted user token.
        .route("/tokens/{token_id}", delete(admin::revoke_token))
}
