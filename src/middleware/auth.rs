// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    extract::TypedHeader,
    headers::{authorization::Bearer, Authorization},
};

use crate::{
    common::error::AppError,
    config::AppState,
    models::principal::Principal,
    services::identity::{require_role, resolve_principal},
};

// ---
// 1. Guarda LEVE (apenas autenticação)
// ---
// Valida o bearer token junto ao provedor e injeta o Principal na requisição.
pub async fn auth_guard(
    State(app_state): State<AppState>,
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth_header) = auth_header.ok_or(AppError::Unauthenticated)?;

    let principal = resolve_principal(app_state.identity.as_ref(), auth_header.token()).await?;

    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

// ---
// 2. Guarda de ADMIN (papel obrigatório)
// ---
// Deve rodar por dentro do auth_guard: depende do Principal já injetado.
pub async fn admin_guard(request: Request, next: Next) -> Result<Response, AppError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .ok_or(AppError::Unauthenticated)?;

    require_role(principal, "admin")?;

    Ok(next.run(request).await)
}

// ---
// Extrator do Principal injetado pelos guards
// ---
pub struct AuthenticatedPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthenticatedPrincipal)
            .ok_or(AppError::Unauthenticated)
    }
}
