use core::fmt::{self, Display, Formatter};
use std::error::Error;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use eyre::Report;
use serde::Serialize;
use serde_json::json;

use super::handlers::addresses::get_addresses_handler;
use super::AddressSource;

#[expect(missing_debug_implementations, reason = "Holds a trait object")]
pub struct AdminState {
    pub(crate) source: Arc<dyn AddressSource>,
}

pub fn setup(source: Arc<dyn AddressSource>) -> Router {
    let state = Arc::new(AdminState { source });

    Router::new()
        .route(
            "/addresses",
            get(get_addresses_handler).fallback(method_not_allowed),
        )
        .layer(Extension(state))
}

async fn method_not_allowed() -> ApiError {
    let status_code = StatusCode::METHOD_NOT_ALLOWED;

    ApiError {
        status_code,
        message: status_code
            .canonical_reason()
            .unwrap_or_default()
            .to_owned(),
    }
}

#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub(crate) payload: T,
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self.payload)).into_response()
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub(crate) status_code: StatusCode,
    pub(crate) message: String,
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status_code, self.message)
    }
}

impl Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.status_code.as_u16(),
            "message": self.message,
        });

        (self.status_code, Json(body)).into_response()
    }
}

#[must_use]
pub fn parse_api_error(err: Report) -> ApiError {
    match err.downcast::<ApiError>() {
        Ok(api_error) => api_error,
        Err(original_error) => ApiError {
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            message: original_error.to_string(),
        },
    }
}
