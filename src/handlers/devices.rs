// src/handlers/devices.rs

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

use crate::{
    common::{error::AppError, http::client_ip},
    config::AppState,
    middleware::auth::AuthenticatedPrincipal,
    models::device::{
        CheckDeviceStatusPayload, ConfirmDevicePayload, DeviceStatusResponse,
        RegisterLoginEventPayload,
    },
};

fn request_origin(headers: &HeaderMap) -> Option<&str> {
    headers.get("origin").and_then(|v| v.to_str().ok())
}

// POST /registerLoginEvent
#[utoipa::path(
    post,
    path = "/registerLoginEvent",
    tag = "Dispositivos",
    request_body = RegisterLoginEventPayload,
    responses(
        (status = 200, description = "Login registrado; estado do dispositivo", body = DeviceStatusResponse),
        (status = 401, description = "Token ausente ou inválido"),
    ),
    security(("api_jwt" = []))
)]
pub async fn register_login_event(
    State(app_state): State<AppState>,
    principal: AuthenticatedPrincipal,
    headers: HeaderMap,
    Json(payload): Json<RegisterLoginEventPayload>,
) -> Result<impl IntoResponse, AppError> {
    let confirm_base = app_state.settings.confirm_base(request_origin(&headers));

    let response = app_state
        .device_service
        .register_login_event(&principal.0, &payload, client_ip(&headers), &confirm_base)
        .await?;

    Ok((StatusCode::OK, Json(response)))
}

// POST /checkDeviceStatus
#[utoipa::path(
    post,
    path = "/checkDeviceStatus",
    tag = "Dispositivos",
    request_body = CheckDeviceStatusPayload,
    responses(
        (status = 200, description = "Estado atual do dispositivo", body = DeviceStatusResponse),
        (status = 401, description = "Token ausente ou inválido"),
    ),
    security(("api_jwt" = []))
)]
pub async fn check_device_status(
    State(app_state): State<AppState>,
    principal: AuthenticatedPrincipal,
    headers: HeaderMap,
    Json(payload): Json<CheckDeviceStatusPayload>,
) -> Result<impl IntoResponse, AppError> {
    let confirm_base = app_state.settings.confirm_base(request_origin(&headers));

    let response = app_state
        .device_service
        .check_status(&principal.0, &payload, &confirm_base)
        .await?;

    Ok((StatusCode::OK, Json(response)))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ConfirmDeviceQuery {
    pub token: Option<String>,
}

// GET /confirmDevice?token=...
//
// Aberto: o token é a própria capacidade. A resposta é uma página HTML
// autocontida, porque o clique vem do e-mail.
#[utoipa::path(
    get,
    path = "/confirmDevice",
    tag = "Dispositivos",
    params(ConfirmDeviceQuery),
    responses(
        (status = 200, description = "Dispositivo confirmado (HTML)"),
        (status = 404, description = "Token não encontrado ou já utilizado (HTML)"),
    )
)]
pub async fn confirm_device_get(
    State(app_state): State<AppState>,
    Query(query): Query<ConfirmDeviceQuery>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Html(error_page("Link inválido: token ausente.")),
        )
            .into_response();
    };

    match app_state.device_service.confirm(&token).await {
        Ok(record) => {
            let device_name = record
                .device_name
                .unwrap_or_else(|| "seu dispositivo".to_string());
            (StatusCode::OK, Html(success_page(&device_name))).into_response()
        }
        Err(AppError::NotFound(message)) => {
            (StatusCode::NOT_FOUND, Html(error_page(&message))).into_response()
        }
        Err(e) => {
            tracing::error!("Confirmação de dispositivo falhou: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(error_page("Não foi possível confirmar o dispositivo.")),
            )
                .into_response()
        }
    }
}

// POST /confirmDevice
#[utoipa::path(
    post,
    path = "/confirmDevice",
    tag = "Dispositivos",
    request_body = ConfirmDevicePayload,
    responses(
        (status = 200, description = "Dispositivo confirmado"),
        (status = 404, description = "Token não encontrado ou já utilizado"),
    )
)]
pub async fn confirm_device_post(
    State(app_state): State<AppState>,
    Json(payload): Json<ConfirmDevicePayload>,
) -> Result<impl IntoResponse, AppError> {
    app_state.device_service.confirm(&payload.token).await?;
    Ok((StatusCode::OK, Json(json!({ "status": "approved" }))))
}

fn page(title: &str, body: &str, accent: &str) -> String {
    format!(
        "<!DOCTYPE html>\
         <html lang=\"pt-BR\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title}</title></head>\
         <body style=\"font-family:system-ui,sans-serif;background:#f1f5f9;\
         display:flex;align-items:center;justify-content:center;height:100vh;margin:0\">\
         <div style=\"background:#fff;border-radius:12px;padding:40px;max-width:420px;\
         text-align:center;box-shadow:0 4px 12px rgba(0,0,0,.08)\">\
         <h1 style=\"color:{accent};font-size:1.4rem\">{title}</h1>\
         <p style=\"color:#475569\">{body}</p>\
         </div></body></html>"
    )
}

fn success_page(device_name: &str) -> String {
    page(
        "Dispositivo confirmado",
        &format!("{device_name} foi aprovado. Você já pode voltar para a aplicação."),
        "#16a34a",
    )
}

fn error_page(message: &str) -> String {
    page("Não foi possível confirmar", message, "#dc2626")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginas_html_sao_autocontidas() {
        let ok = success_page("Notebook");
        assert!(ok.starts_with("<!DOCTYPE html>"));
        assert!(ok.contains("Notebook"));

        let err = error_page("Token não encontrado ou já utilizado.");
        assert!(err.contains("Token não encontrado"));
    }
}
