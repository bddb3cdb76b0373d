use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ApiError;

/// ApiResponse
///
/// The uniform envelope every endpoint answers with. Success responses carry
/// `message` and optional `data`; failures carry `message` and `error` (see `ApiError`).
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn with_status(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            status: status.as_u16(),
            message: Some(message.into()),
            data: Some(data),
            error: None,
        }
    }

    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, data)
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, data)
    }
}

impl ApiResponse<()> {
    /// A success envelope without a `data` member.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// JsonBody
///
/// `Json` with an enveloped rejection: malformed or missing bodies become a 400
/// `ApiError` instead of axum's plain-text rejection.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::bad_request(
                "Invalid request body",
                json_rejection_detail(&rejection),
            )),
        }
    }
}

fn json_rejection_detail(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => "Expected a JSON request body".to_string(),
        other => other.body_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_members() {
        let json = serde_json::to_value(ApiResponse::message("Customer deleted")).unwrap();
        assert_eq!(json, serde_json::json!({"status": 200, "message": "Customer deleted"}));
    }

    #[test]
    fn created_envelope_carries_data() {
        let response = ApiResponse::created("Customer created", serde_json::json!({"name": "Acme"}));
        assert_eq!(response.status, 201);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"]["name"], "Acme");
        assert!(json.get("error").is_none());
    }
}
