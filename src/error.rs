use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{access::ResourceKind, repository::RepoError, response::ApiResponse};

pub type ApiResult<T> = Result<T, ApiError>;

/// ApiError
///
/// The error taxonomy of the HTTP layer. Each variant carries a human message and a
/// detail string; `IntoResponse` renders both into the uniform envelope and logs them.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}: {detail}")]
    BadRequest { message: String, detail: String },

    #[error("{message}: {detail}")]
    Unauthorized { message: String, detail: String },

    #[error("{message}: {detail}")]
    Forbidden { message: String, detail: String },

    #[error("{message}: {detail}")]
    NotFound { message: String, detail: String },

    #[error("{message}: {detail}")]
    MethodNotAllowed { message: String, detail: String },

    #[error("{message}: {detail}")]
    Internal { message: String, detail: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into(), detail: detail.into() }
    }

    pub fn unauthorized(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into(), detail: detail.into() }
    }

    pub fn forbidden(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into(), detail: detail.into() }
    }

    pub fn not_found(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound { message: message.into(), detail: detail.into() }
    }

    pub fn internal(message: impl Into<String>, detail: impl ToString) -> Self {
        Self::Internal { message: message.into(), detail: detail.to_string() }
    }

    /// `"<Kind> not found"` with the canonical detail for that kind.
    pub fn missing(kind: ResourceKind) -> Self {
        Self::not_found(
            format!("{} not found", kind.label()),
            format!("No {} found with the given {}", kind.noun(), kind.lookup_key()),
        )
    }

    /// The conflict answer for an active row holding the same natural key.
    pub fn already_exists(kind: ResourceKind) -> Self {
        Self::bad_request(
            format!("{} already exists", kind.label()),
            format!("A {} with this {} already exists", kind.noun(), kind.natural_key()),
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn parts(&self) -> (&str, &str) {
        match self {
            Self::BadRequest { message, detail }
            | Self::Unauthorized { message, detail }
            | Self::Forbidden { message, detail }
            | Self::NotFound { message, detail }
            | Self::MethodNotAllowed { message, detail }
            | Self::Internal { message, detail } => (message, detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, detail) = self.parts();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %detail, "{}", message);
        } else {
            tracing::warn!(status = status.as_u16(), error = %detail, "{}", message);
        }

        let envelope: ApiResponse<()> = ApiResponse {
            status: status.as_u16(),
            message: Some(message.to_string()),
            data: None,
            error: Some(detail.to_string()),
        };

        (status, Json(envelope)).into_response()
    }
}

/// Attaches a human message to a repository failure.
pub trait RepoResultExt<T> {
    fn or_internal(self, message: &str) -> ApiResult<T>;
}

impl<T> RepoResultExt<T> for Result<T, RepoError> {
    fn or_internal(self, message: &str) -> ApiResult<T> {
        self.map_err(|e| ApiError::internal(message, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(ApiError::bad_request("a", "b").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("a", "b").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("a", "b").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::missing(ResourceKind::Site).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::internal("a", "b").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn already_exists_names_the_natural_key() {
        let err = ApiError::already_exists(ResourceKind::Device);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "Device already exists: A device with this serial number already exists"
        );
    }
}
