//! REST API module.
//!
//! Handlers resolve the caller through the role gate, run one repository
//! operation and wrap the result in the response envelope.

mod issues;
mod search;
mod staff;
mod users;
mod workflow;

pub use issues::*;
pub use search::*;
pub use staff::*;
pub use users::*;
pub use workflow::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Reject blank values for required text fields.
pub(crate) fn require_text(fields: &[(&str, Option<&str>)]) -> Result<(), AppError> {
    for (name, value) in fields {
        if let Some(value) = value {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{} is required", name)));
            }
        }
    }
    Ok(())
}
