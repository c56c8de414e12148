use crate::image_ops::processing::ProcessingError;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use log::warn;

/// Plain text error, body is the error message as is
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.detail,
        )
            .into_response()
    }
}

impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        let status = match err {
            ProcessingError::InvalidSize(_) => StatusCode::BAD_REQUEST,
            ProcessingError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("Request failed with {}: {}", status, err);
        api_error(status, err.to_string())
    }
}

pub(crate) struct ImageResponse {
    pub headers: HeaderMap,
    pub data: Vec<u8>,
}

impl IntoResponse for ImageResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::OK, self.headers, Body::from(self.data)).into_response()
    }
}

pub(crate) fn api_error(status: StatusCode, detail: String) -> ApiError {
    ApiError { status, detail }
}
