// src/handlers/customers.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedPrincipal,
    models::batch::{TogglePausedPayload, TogglePausedResponse},
};

// POST /toggleCustomerPaused
#[utoipa::path(
    post,
    path = "/toggleCustomerPaused",
    tag = "Clientes",
    request_body = TogglePausedPayload,
    responses(
        (status = 200, description = "Estado de pausa invertido", body = TogglePausedResponse),
        (status = 403, description = "Exige dispositivo aprovado"),
        (status = 404, description = "Cliente não encontrado"),
    ),
    security(("api_jwt" = []))
)]
pub async fn toggle_customer_paused(
    State(app_state): State<AppState>,
    principal: AuthenticatedPrincipal,
    Json(payload): Json<TogglePausedPayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.customer_id <= 0 {
        return Err(AppError::BadRequest("customer_id inválido.".to_string()));
    }

    let coords = app_state
        .registry_repo
        .lookup_tenant(principal.0.id)
        .await?;
    let pool = app_state.tenant_pools.pool_for(&coords)?;

    let (customer_id, paused) = app_state
        .metadata_repo
        .toggle_customer_paused(&pool, payload.customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Cliente não encontrado.".to_string()))?;

    Ok((
        StatusCode::OK,
        Json(TogglePausedResponse {
            customer_id,
            paused,
        }),
    ))
}
