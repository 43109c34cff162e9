//! Endpoint-layer errors and the `{"_meta": {"code": N}}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::{error, info};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::constants::codes;
use crate::request::RequestError;
use crate::store::StoreError;
use crate::tool::ToolError;

/// `{"_meta": {"code": code}}` as a JSON object, ready for more fields
pub fn envelope(code: i64) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("_meta".to_string(), json!({ "code": code }));
    body
}

#[derive(Debug)]
pub enum ApiError {
    Request(RequestError),
    NotLoggedIn,
    NoTransformId,
    SegmentNotFound,
    TransformNotFound,
    RateLimited,
    /// Turned away by the HTTP layer before reaching a handler's own checks
    Rejected { status: StatusCode, reason: String },
    Tool(ToolError),
    Store(StoreError),
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> i64 {
        match self {
            ApiError::Request(err) => err.code(),
            ApiError::NotLoggedIn => codes::NOT_LOGGED_IN,
            ApiError::NoTransformId => codes::NO_TRANSFORM_ID,
            ApiError::SegmentNotFound => codes::SEGMENT_NOT_FOUND,
            ApiError::TransformNotFound => codes::TRANSFORM_NOT_FOUND,
            ApiError::Tool(err) => err.tool_code().unwrap_or(codes::GENERIC),
            ApiError::RateLimited
            | ApiError::Rejected { .. }
            | ApiError::Store(_)
            | ApiError::Internal(_) => codes::GENERIC,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Request(_) | ApiError::NotLoggedIn | ApiError::NoTransformId => {
                StatusCode::BAD_REQUEST
            }
            ApiError::SegmentNotFound | ApiError::TransformNotFound => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Tool(_) | ApiError::Store(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Request(err) => write!(f, "Invalid request: {}", err),
            ApiError::NotLoggedIn => write!(f, "Not logged in"),
            ApiError::NoTransformId => write!(f, "Invalid request: no transform id"),
            ApiError::SegmentNotFound => write!(f, "Segment not found"),
            ApiError::TransformNotFound => write!(f, "Transform not found"),
            ApiError::RateLimited => write!(f, "Too many requests"),
            ApiError::Rejected { reason, .. } => write!(f, "Rejected request: {}", reason),
            ApiError::Tool(err) => write!(f, "{}", err),
            ApiError::Store(err) => write!(f, "{}", err),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Request(err) => Some(err),
            ApiError::Tool(err) => Some(err),
            ApiError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        ApiError::Request(err)
    }
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        ApiError::Tool(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("JSON error: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        if status.is_server_error() {
            error!("{} (code {})", self, code);
        } else {
            info!("{} (code {})", self, code);
        }
        (status, axum::Json(Value::Object(envelope(code)))).into_response()
    }
}
