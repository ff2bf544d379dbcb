// src/api/http/health.rs
//! `GET /health`: a bare `{"status": "ok"}`, deliberately outside the
//! business envelope since it's a transport-level liveness probe.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
