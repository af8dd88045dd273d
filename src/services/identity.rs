// src/services/identity.rs

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::principal::{extract_roles, Principal},
};

// Costura com o provedor de identidade. O gateway nunca valida tokens
// localmente: quem diz quem é o usuário é o provedor.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    // JSON do usuário dono do bearer token, ou None se o token não vale.
    async fn get_user(&self, token: &str) -> Result<Option<Value>, AppError>;

    // JSON de um usuário pelo id (rota administrativa).
    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<Value>, AppError>;

    // Cria um usuário já confirmado e devolve o id.
    async fn create_user(&self, email: &str, password: &str) -> Result<Uuid, AppError>;

    // Remove um usuário (usado no rollback do registro de tenant).
    async fn delete_user(&self, user_id: Uuid) -> Result<(), AppError>;
}

// Resolve o principal da requisição a partir do bearer token.
pub async fn resolve_principal(
    provider: &dyn IdentityProvider,
    token: &str,
) -> Result<Principal, AppError> {
    let user = provider
        .get_user(token)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    let id = user
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(AppError::Unauthenticated)?;
    let email = user
        .get("email")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let roles = extract_roles(&user);

    Ok(Principal { id, email, roles })
}

pub fn require_role(principal: &Principal, role: &str) -> Result<(), AppError> {
    if principal.has_role(role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Usuário não possui o papel '{role}'."
        )))
    }
}

// Implementação GoTrue: o endpoint /auth/v1/user responde pelo token do
// usuário; as rotas /auth/v1/admin exigem a service-role key.
#[derive(Clone)]
pub struct SupabaseAuth {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl SupabaseAuth {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        anon_key: String,
        service_role_key: String,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            service_role_key,
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn get_user(&self, token: &str) -> Result<Option<Value>, AppError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json().await?)),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN
            | reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => {
                tracing::error!("Provedor de identidade respondeu {status}");
                Err(AppError::Internal(anyhow::anyhow!(
                    "resposta inesperada do provedor de identidade: {status}"
                )))
            }
        }
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<Value>, AppError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/admin/users/{user_id}", self.base_url))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json().await?)),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => {
                tracing::error!("Consulta de usuário por id respondeu {status}");
                Err(AppError::Internal(anyhow::anyhow!(
                    "resposta inesperada do provedor de identidade: {status}"
                )))
            }
        }
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<Uuid, AppError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/admin/users", self.base_url))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(&json!({
                "email": email,
                "password": password,
                "email_confirm": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
            || status == reqwest::StatusCode::CONFLICT
        {
            return Err(AppError::Conflict(
                "Já existe um usuário com este e-mail.".to_string(),
            ));
        }
        if !status.is_success() {
            tracing::error!("Criação de usuário falhou com {status}");
            return Err(AppError::Internal(anyhow::anyhow!(
                "criação de usuário falhou: {status}"
            )));
        }

        let body: Value = response.json().await?;
        body.get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("resposta de criação de usuário sem id"))
            })
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let response = self
            .client
            .delete(format!("{}/auth/v1/admin/users/{user_id}", self.base_url))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::error!("Remoção do usuário {user_id} falhou: {}", response.status());
            return Err(AppError::Internal(anyhow::anyhow!(
                "remoção de usuário falhou"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn require_role_exige_pertencimento() {
        let mut roles = HashSet::new();
        roles.insert("authenticated".to_string());
        let principal = Principal {
            id: Uuid::nil(),
            email: "a@b.c".into(),
            roles,
        };
        assert!(require_role(&principal, "admin").is_err());

        let mut principal = principal;
        principal.roles.insert("admin".to_string());
        assert!(require_role(&principal, "admin").is_ok());
    }
}
