// src/middleware/device.rs

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{common::error::AppError, config::AppState, models::principal::Principal};

pub const DEVICE_ID_HEADER: &str = "x-client-device-id";

// Portão de dispositivo aprovado para endpoints sensíveis. Roda por dentro
// do auth_guard: exige o Principal injetado e o cabeçalho X-Client-Device-Id
// de um dispositivo com status aprovado e confirmado.
pub async fn device_guard(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .ok_or(AppError::Unauthenticated)?
        .clone();

    let device_id = request
        .headers()
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    app_state
        .device_service
        .require_approved(&principal, device_id.as_deref())
        .await?;

    Ok(next.run(request).await)
}
