// src/handlers/admin.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedPrincipal,
    models::{
        metadata::{ManageGraphPayload, ManageResponse, ManageTablePayload},
        tenant::RegisterUserPayload,
    },
};

// POST /manageGraph
#[utoipa::path(
    post,
    path = "/manageGraph",
    tag = "Administração",
    request_body = ManageGraphPayload,
    responses(
        (status = 200, description = "Gráfico criado ou atualizado", body = ManageResponse),
        (status = 403, description = "Exige papel admin e dispositivo aprovado"),
        (status = 409, description = "Slug duplicado"),
    ),
    security(("api_jwt" = []))
)]
pub async fn manage_graph(
    State(app_state): State<AppState>,
    principal: AuthenticatedPrincipal,
    Json(payload): Json<ManageGraphPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let coords = app_state
        .registry_repo
        .lookup_tenant(principal.0.id)
        .await?;
    let pool = app_state.tenant_pools.pool_for(&coords)?;

    let response = app_state
        .admin_service
        .manage_graph(&pool, &payload, coords.company_name.clone())
        .await?;

    Ok((StatusCode::OK, Json(response)))
}

// POST /manageTable
#[utoipa::path(
    post,
    path = "/manageTable",
    tag = "Administração",
    request_body = ManageTablePayload,
    responses(
        (status = 200, description = "Tabela criada ou atualizada", body = ManageResponse),
        (status = 403, description = "Exige papel admin e dispositivo aprovado"),
        (status = 409, description = "Slug duplicado"),
    ),
    security(("api_jwt" = []))
)]
pub async fn manage_table(
    State(app_state): State<AppState>,
    principal: AuthenticatedPrincipal,
    Json(payload): Json<ManageTablePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let coords = app_state
        .registry_repo
        .lookup_tenant(principal.0.id)
        .await?;
    let pool = app_state.tenant_pools.pool_for(&coords)?;

    let response = app_state
        .admin_service
        .manage_table(&pool, &payload, coords.company_name.clone())
        .await?;

    Ok((StatusCode::OK, Json(response)))
}

// POST /registerUser
#[utoipa::path(
    post,
    path = "/registerUser",
    tag = "Administração",
    request_body = RegisterUserPayload,
    responses(
        (status = 201, description = "Usuário e tenant registrados"),
        (status = 403, description = "Exige papel admin e dispositivo aprovado"),
        (status = 409, description = "E-mail já cadastrado"),
    ),
    security(("api_jwt" = []))
)]
pub async fn register_user(
    State(app_state): State<AppState>,
    _principal: AuthenticatedPrincipal,
    Json(payload): Json<RegisterUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user_id = app_state.admin_service.register_user(&payload).await?;

    Ok((StatusCode::CREATED, Json(json!({ "userId": user_id }))))
}

// POST /listCompanies
#[utoipa::path(
    post,
    path = "/listCompanies",
    tag = "Administração",
    responses(
        (status = 200, description = "Empresas registradas no diretório central"),
        (status = 403, description = "Exige papel admin e dispositivo aprovado"),
    ),
    security(("api_jwt" = []))
)]
pub async fn list_companies(
    State(app_state): State<AppState>,
    _principal: AuthenticatedPrincipal,
) -> Result<impl IntoResponse, AppError> {
    let companies = app_state.admin_service.list_companies().await?;

    Ok((StatusCode::OK, Json(json!({ "companies": companies }))))
}
