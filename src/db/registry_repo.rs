// src/db/registry_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::tenant::{CompanyEntry, TenantCoordinates},
};

// Acesso ao registro central `db_info`: uma linha por usuário dono de
// tenant, com as coordenadas do banco da empresa.
#[derive(Clone)]
pub struct RegistryRepository {
    pool: PgPool,
}

impl RegistryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Lê exatamente uma linha pelo id do principal. Linha ausente é NotFound,
    // nunca erro de infraestrutura.
    pub async fn lookup_tenant(&self, principal_id: Uuid) -> Result<TenantCoordinates, AppError> {
        let coords = sqlx::query_as::<_, TenantCoordinates>(
            "SELECT db_host, db_name, db_user, db_password, company_name
             FROM db_info WHERE id_user = $1",
        )
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await?;

        coords.ok_or_else(|| {
            AppError::NotFound("Dados de conexão não encontrados para este usuário.".to_string())
        })
    }

    pub async fn insert_tenant(
        &self,
        principal_id: Uuid,
        coords: &TenantCoordinates,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "INSERT INTO db_info (id_user, db_host, db_name, db_user, db_password, company_name)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(principal_id)
        .bind(&coords.db_host)
        .bind(&coords.db_name)
        .bind(&coords.db_user)
        .bind(&coords.db_password)
        .bind(&coords.company_name)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict("Já existe um registro de tenant para este usuário.".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_companies(&self) -> Result<Vec<CompanyEntry>, AppError> {
        let companies = sqlx::query_as::<_, CompanyEntry>(
            "SELECT id_user, company_name, db_host, db_name
             FROM db_info ORDER BY company_name NULLS LAST",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(companies)
    }
}
