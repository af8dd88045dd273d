// src/handlers/fetch_data.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedPrincipal,
    models::batch::{BatchRequest, BatchResponse},
};

// POST /fetchUserData
#[utoipa::path(
    post,
    path = "/fetchUserData",
    tag = "Dados",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Lote executado; falhas por-slug em errors/tableErrors", body = BatchResponse),
        (status = 401, description = "Token ausente ou inválido"),
        (status = 404, description = "Tenant sem coordenadas registradas"),
    ),
    security(("api_jwt" = []))
)]
pub async fn fetch_user_data(
    State(app_state): State<AppState>,
    principal: AuthenticatedPrincipal,
    payload: Option<Json<BatchRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = payload.map(|Json(body)| body).unwrap_or_default();

    // 1. Resolve o tenant do principal no registro central
    let coords = app_state
        .registry_repo
        .lookup_tenant(principal.0.id)
        .await?;

    // 2. Pool (preguiçoso) do banco da empresa
    let pool = app_state.tenant_pools.pool_for(&coords)?;

    // 3. Lote completo; conexões voltam ao pool em qualquer caminho de saída
    let response = app_state
        .batch_service
        .run(&pool, &principal.0, &request, Some(coords.company_label()))
        .await?;

    Ok((StatusCode::OK, Json(response)))
}
