use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{ApiError, RepoResultExt},
    repository::RepositoryState,
    token::{Claims, Role, TokenError, TokenService},
};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "Authorization";
/// Header that must carry the configured admin secret on `/admin/*`.
pub const ADMIN_SECRET_HEADER: &str = "Admin-Secret";
/// Session cookie lifetime: 24 hours.
const SESSION_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Session
///
/// The caller bound by `require_session`. Handlers on session-gated routes take it as
/// an argument; ownership checks live in `access`.
#[derive(Debug, Clone)]
pub struct Session {
    /// The customer id for user tokens; a throwaway id for admin tokens.
    pub subject_id: Uuid,
    pub role: Role,
    pub action: String,
}

impl From<&Claims> for Session {
    fn from(claims: &Claims) -> Self {
        Self { subject_id: claims.sub, role: claims.role, action: claims.action.clone() }
    }
}

/// Session Extractor Implementation
///
/// Reads the `Session` placed in the request extensions by `require_session`. A route
/// that forgot the middleware answers 401 rather than running unauthenticated.
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Unauthorized", "Please authenticate first"))
    }
}

/// Maps a validation failure to the response the session gate and `/authenticate` share.
pub fn token_rejection(err: TokenError) -> ApiError {
    if err.is_configuration() {
        ApiError::internal("Token service misconfigured", err)
    } else {
        ApiError::unauthorized("Unauthorized", "Invalid token")
    }
}

/// verify_session_token
///
/// Validates the signature and, for non-admin tokens, requires the exact token string
/// to be persisted and unrevoked under the same customer and action. Tokens of a
/// soft-deleted customer stop working until the customer is restored.
pub async fn verify_session_token(
    tokens: &TokenService,
    repo: &RepositoryState,
    token: &str,
) -> Result<Claims, ApiError> {
    let claims = tokens.validate(token).map_err(token_rejection)?;

    if claims.role != Role::Admin {
        let stored = repo
            .find_token_by_value(token)
            .await
            .or_internal("Failed to look up token")?;
        let live = stored
            .is_some_and(|row| row.customer_id == claims.sub && row.action == claims.action);
        if !live {
            return Err(ApiError::unauthorized("Unauthorized", "Token not found"));
        }

        let customer = repo
            .find_customer(claims.sub)
            .await
            .or_internal("Failed to look up customer")?;
        if customer.is_none() {
            return Err(ApiError::unauthorized("Unauthorized", "Customer is no longer active"));
        }
    }

    Ok(claims)
}

/// require_session
///
/// Middleware for every resource route: resolves the `Authorization` cookie into a
/// `Session` and stores it in the request extensions.
pub async fn require_session(
    State(tokens): State<TokenService>,
    State(repo): State<RepositoryState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Err(ApiError::unauthorized("Unauthorized", "Please authenticate first"));
    };

    let claims = verify_session_token(&tokens, &repo, cookie.value()).await?;
    let session = Session::from(&claims);
    tracing::debug!(subject = %session.subject_id, role = %session.role, "session bound");

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// admin_only
///
/// Route layer for mutating and listing routes reserved to administrators. Must run
/// inside `require_session`.
pub async fn admin_only(session: Session, request: Request, next: Next) -> Result<Response, ApiError> {
    if !session.is_admin() {
        return Err(ApiError::forbidden("Unauthorized", "Only admins can perform this action"));
    }
    Ok(next.run(request).await)
}

/// require_admin_secret
///
/// Guards `/admin/*`: the `Admin-Secret` header must equal the configured secret.
pub async fn require_admin_secret(
    State(config): State<AppConfig>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(ADMIN_SECRET_HEADER)
        .map(HeaderValue::as_bytes)
        .unwrap_or_default();

    if config.admin_secret.is_empty()
        || !constant_time_eq(provided, config.admin_secret.as_bytes())
    {
        return Err(ApiError::unauthorized("Unauthorized", "Invalid admin secret"));
    }
    Ok(next.run(request).await)
}

/// The cookie binding a validated token to the browser session.
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(SESSION_MAX_AGE_SECS))
        .build()
}

/// Constant-time byte comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryRepository;
    use axum::http::StatusCode;
    use std::sync::Arc;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret!"));
    }

    #[test]
    fn session_cookie_is_http_only_and_lax() {
        let cookie = session_cookie("abc".to_string());
        assert_eq!(cookie.name(), "Authorization");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(24)));
        assert_eq!(cookie.path(), Some("/"));
    }

    async fn user_fixture(action: &str) -> (TokenService, RepositoryState, Uuid, String) {
        let tokens = TokenService::from_config(&AppConfig::default());
        let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
        let customer = repo.insert_customer("Acme Co").await.unwrap();
        let token = tokens.issue(&customer.id.to_string(), "Acme Co", "user", action, false).unwrap();
        (tokens, repo, customer.id, token)
    }

    #[tokio::test]
    async fn persisted_token_with_other_action_is_rejected() {
        let (tokens, repo, customer_id, token) = user_fixture("READ").await;
        repo.insert_auth_token(customer_id, "WRITE", &token).await.unwrap();

        let err = verify_session_token(&tokens, &repo, &token).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Unauthorized: Token not found");
    }

    #[tokio::test]
    async fn persisted_token_under_other_customer_is_rejected() {
        let (tokens, repo, _, token) = user_fixture("READ").await;
        let other = repo.insert_customer("Globex").await.unwrap();
        repo.insert_auth_token(other.id, "READ", &token).await.unwrap();

        let err = verify_session_token(&tokens, &repo, &token).await.unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized: Token not found");
    }

    #[tokio::test]
    async fn token_of_deleted_customer_is_rejected() {
        let (tokens, repo, customer_id, token) = user_fixture("READ").await;
        repo.insert_auth_token(customer_id, "READ", &token).await.unwrap();
        assert!(verify_session_token(&tokens, &repo, &token).await.is_ok());

        repo.soft_delete_customer(customer_id).await.unwrap();
        let err = verify_session_token(&tokens, &repo, &token).await.unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized: Customer is no longer active");

        repo.restore_customer(customer_id).await.unwrap();
        assert!(verify_session_token(&tokens, &repo, &token).await.is_ok());
    }
}
