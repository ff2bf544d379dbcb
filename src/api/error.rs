// src/api/error.rs
// Centralized error handling for HTTP API responses: one `ApiError` type,
// constructors per taxonomy entry, and `IntoApiError`/`IntoApiErrorOption`
// extension traits so call sites read as
// `store.get(id).await.into_api_error("...")?`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

/// The error taxonomy of the engine. Each kind maps to one HTTP status
/// class and one stable numeric envelope code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    UnknownConversation,
    UnknownMessage,
    UnknownModel,
    InvalidDag,
    AdapterError,
    StoreError,
    ClientCanceled,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::UnknownConversation | ErrorKind::UnknownMessage => StatusCode::NOT_FOUND,
            ErrorKind::UnknownModel => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidDag => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::AdapterError => StatusCode::BAD_GATEWAY,
            ErrorKind::StoreError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::ClientCanceled => StatusCode::OK,
        }
    }

    /// Stable numeric code used in the `{code, message, data}` envelope.
    /// `0` is reserved for success.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidRequest => 400,
            ErrorKind::UnknownConversation => 404,
            ErrorKind::UnknownMessage => 405,
            ErrorKind::UnknownModel => 406,
            ErrorKind::InvalidDag => 500,
            ErrorKind::AdapterError => 502,
            ErrorKind::StoreError => 503,
            ErrorKind::ClientCanceled => 499,
        }
    }
}

/// Standard API error, carrying enough to render both the JSON envelope and
/// the HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub kind: ErrorKind,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn unknown_conversation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownConversation, message)
    }

    pub fn unknown_message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownMessage, message)
    }

    pub fn unknown_model(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownModel, message)
    }

    pub fn invalid_dag(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDag, message)
    }

    pub fn adapter_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AdapterError, message)
    }

    pub fn store_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorEnvelope {
    code: i32,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        // Business errors always return 200 (HTTP status is 4xx/5xx only
        // for transport-level failures -- malformed JSON, missing routes --
        // which never construct an `ApiError` in the first place).
        let body = ErrorEnvelope { code: self.kind.code(), message: self.message };
        (StatusCode::OK, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Extension trait for converting fallible store/adapter calls to `ApiError`.
pub trait IntoApiError<T> {
    fn into_api_error(self, kind: ErrorKind, message: &str) -> Result<T, ApiError>;
    fn into_store_error(self, message: &str) -> Result<T, ApiError>;
}

impl<T, E> IntoApiError<T> for Result<T, E>
where
    E: std::fmt::Debug,
{
    fn into_api_error(self, kind: ErrorKind, message: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            error!("{}: {:?}", message, e);
            ApiError::new(kind, message)
        })
    }

    fn into_store_error(self, message: &str) -> Result<T, ApiError> {
        self.into_api_error(ErrorKind::StoreError, message)
    }
}

/// Retries a single idempotent store read once on failure before giving up
/// and surfacing a `StoreError`. Writes never go through this — a failed
/// write is surfaced as an envelope error directly so it isn't silently
/// duplicated.
pub async fn retry_once<F, Fut, T, E>(read: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    match read().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("store read failed, retrying once: {e:?}");
            read().await
        }
    }
}

/// Extension trait for `Option<T>` lookups that should 404 on `None`.
pub trait IntoApiErrorOption<T> {
    fn ok_or_unknown_conversation(self, message: &str) -> Result<T, ApiError>;
    fn ok_or_unknown_message(self, message: &str) -> Result<T, ApiError>;
}

impl<T> IntoApiErrorOption<T> for Option<T> {
    fn ok_or_unknown_conversation(self, message: &str) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::unknown_conversation(message))
    }

    fn ok_or_unknown_message(self, message: &str) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::unknown_message(message))
    }
}
