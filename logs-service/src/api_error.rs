use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The failure surface of the query API: bad pagination input, a store that
/// is temporarily down, or an internal fault.
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, message: Option<String> },
    Unavailable { code: &'static str },
    Internal { message: Option<String> },
}

impl ApiError {
    pub fn bad_request(code: &'static str) -> Self {
        Self::BadRequest { code, message: None }
    }

    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::Internal { message: Some(err.to_string()) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body, error_code) = match self {
            ApiError::BadRequest { code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody { code: code.into(), message },
                code,
            ),
            ApiError::Unavailable { code } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody { code: code.into(), message: None },
                code,
            ),
            ApiError::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { code: "internal_error".into(), message },
                "internal_error",
            ),
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", value);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
