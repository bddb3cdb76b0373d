use crate::{AppState, handlers::public};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. `/authenticate` is the only way to obtain
/// the session cookie the rest of the API requires.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancers.
        .route("/health", get(public::health))
        // POST /authenticate
        // Validates a token and binds it to the `Authorization` cookie (24h, HttpOnly).
        .route("/authenticate", post(public::authenticate))
}
