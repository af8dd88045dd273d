// src/common/error.rs

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Erro de domínio do gateway. As variantes Validation/Template nunca derrubam
// a requisição inteira: o executor de lote as rebaixa para entradas por-slug
// em `errors`/`tableErrors`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Token de autenticação ausente ou inválido.")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("Muitas requisições. Tente novamente em instantes.")]
    RateLimited { retry_after_seconds: u64 },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    // Erros por-slug (ver services/batch_service.rs)
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Template(String),

    #[error("Erro de validação")]
    Payload(#[from] validator::ValidationErrors),

    #[error("Erro de banco de dados")]
    Database(#[from] sqlx::Error),

    #[error("Falha ao comunicar com serviço externo")]
    Upstream(#[from] reqwest::Error),

    #[error("Erro interno do servidor")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::BadRequest(_) | AppError::Payload(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) | AppError::Template(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Upstream(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    // Mensagem exposta ao cliente. Erros de infraestrutura são logados com o
    // detalhe completo e saem genéricos na resposta.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(e) => {
                tracing::error!("Erro de banco de dados: {e}");
                "Erro interno do servidor".to_string()
            }
            AppError::Upstream(e) => {
                tracing::error!("Falha em serviço externo: {e}");
                "Erro interno do servidor".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Erro interno: {e:#}");
                "Erro interno do servidor".to_string()
            }
            AppError::Payload(errors) => errors
                .field_errors()
                .values()
                .flat_map(|v| v.iter())
                .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "Dados da requisição inválidos.".to_string()),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let AppError::RateLimited {
            retry_after_seconds,
        } = self
        {
            let body = Json(json!({
                "error": "Muitas requisições. Tente novamente em instantes.",
                "retryAfterSeconds": retry_after_seconds,
            }));
            let mut response = (status, body).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return response;
        }

        let body = Json(json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}
