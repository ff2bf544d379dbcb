// src/api/envelope.rs
// The uniform `{code, message, data}` envelope used by every non-streaming
// endpoint.

use axum::{response::IntoResponse, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct ApiEnvelope<T: Serialize> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self { code: 0, message: "ok".to_string(), data }
    }
}

impl<T: Serialize> IntoResponse for ApiEnvelope<T> {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}
