// src/services/admin_service.rs

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{MetadataRepository, RegistryRepository},
    models::{
        metadata::{ManageGraphPayload, ManageResponse, ManageTablePayload},
        tenant::{CompanyEntry, RegisterUserPayload, TenantCoordinates},
    },
    services::identity::IdentityProvider,
};

// Operações administrativas: manutenção de metadados no banco do tenant e
// provisionamento de novas empresas (usuário no provedor + linha em db_info).
#[derive(Clone)]
pub struct AdminService {
    registry_repo: RegistryRepository,
    metadata_repo: MetadataRepository,
    identity: Arc<dyn IdentityProvider>,
}

impl AdminService {
    pub fn new(
        registry_repo: RegistryRepository,
        metadata_repo: MetadataRepository,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            registry_repo,
            metadata_repo,
            identity,
        }
    }

    pub async fn manage_graph(
        &self,
        pool: &PgPool,
        payload: &ManageGraphPayload,
        company_name: Option<String>,
    ) -> Result<ManageResponse, AppError> {
        let id = self.metadata_repo.upsert_chart(pool, payload).await?;
        let message = if payload.id.is_some() {
            "Gráfico atualizado com sucesso."
        } else {
            "Gráfico criado com sucesso."
        };
        Ok(ManageResponse {
            message: message.to_string(),
            id,
            slug: payload.slug.clone(),
            company_name,
        })
    }

    pub async fn manage_table(
        &self,
        pool: &PgPool,
        payload: &ManageTablePayload,
        company_name: Option<String>,
    ) -> Result<ManageResponse, AppError> {
        let id = self.metadata_repo.upsert_table(pool, payload).await?;
        let message = if payload.id.is_some() {
            "Tabela atualizada com sucesso."
        } else {
            "Tabela criada com sucesso."
        };
        Ok(ManageResponse {
            message: message.to_string(),
            id,
            slug: payload.slug.clone(),
            company_name,
        })
    }

    // Cria o usuário no provedor e registra as coordenadas do tenant. Se a
    // segunda parte falha, o usuário recém-criado é removido para não deixar
    // uma conta órfã; falha da limpeza vira log.
    pub async fn register_user(&self, payload: &RegisterUserPayload) -> Result<Uuid, AppError> {
        let user_id = self
            .identity
            .create_user(&payload.email, &payload.password)
            .await?;

        let coords = TenantCoordinates {
            db_host: payload.db_host.clone(),
            db_name: payload.db_name.clone(),
            db_user: payload.db_user.clone(),
            db_password: payload.db_password.clone(),
            company_name: payload.company_name.clone(),
        };

        if let Err(e) = self.registry_repo.insert_tenant(user_id, &coords).await {
            tracing::error!("Falha ao registrar tenant do usuário {user_id}: {e}");
            if let Err(cleanup) = self.identity.delete_user(user_id).await {
                tracing::error!("Falha ao desfazer criação do usuário {user_id}: {cleanup}");
            }
            return Err(e);
        }

        Ok(user_id)
    }

    pub async fn list_companies(&self) -> Result<Vec<CompanyEntry>, AppError> {
        self.registry_repo.list_companies().await
    }
}
