// src/db/metadata_repo.rs

use sqlx::PgPool;

use crate::{
    common::error::AppError,
    models::metadata::{ChartRow, ManageGraphPayload, ManageTablePayload, TableRow},
};

// Leituras e escritas das tabelas de metadados, sempre no banco do tenant.
// Os métodos recebem o pool por parâmetro porque cada requisição resolve o
// seu tenant; este repositório não guarda estado.
#[derive(Clone, Default)]
pub struct MetadataRepository;

impl MetadataRepository {
    pub fn new() -> Self {
        Self
    }

    // Gráficos ativos, opcionalmente filtrados por slug, sempre em ordem de
    // id para saída determinística.
    pub async fn fetch_active_charts(
        &self,
        pool: &PgPool,
        slugs: Option<&[String]>,
    ) -> Result<Vec<ChartRow>, AppError> {
        let rows = sqlx::query_as::<_, ChartRow>(
            "SELECT id, slug, title, description, query_template, param_schema,
                    default_params, result_shape, allowed_roles, is_active
             FROM graficos_dashboard
             WHERE is_active AND ($1::text[] IS NULL OR slug = ANY($1))
             ORDER BY id ASC",
        )
        .bind(slugs)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn fetch_active_tables(
        &self,
        pool: &PgPool,
        slugs: Option<&[String]>,
    ) -> Result<Vec<TableRow>, AppError> {
        let rows = sqlx::query_as::<_, TableRow>(
            "SELECT id, slug, title, description, query_template, column_config,
                    param_schema, default_params, result_shape, allowed_roles,
                    primary_key, is_active
             FROM dashboard_tables
             WHERE is_active AND ($1::text[] IS NULL OR slug = ANY($1))
             ORDER BY id ASC",
        )
        .bind(slugs)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn upsert_chart(
        &self,
        pool: &PgPool,
        payload: &ManageGraphPayload,
    ) -> Result<i64, AppError> {
        let result = match payload.id {
            Some(id) => {
                sqlx::query_scalar::<_, i64>(
                    "UPDATE graficos_dashboard SET
                        slug = $2, title = $3, description = $4, query_template = $5,
                        param_schema = $6, default_params = $7, result_shape = $8,
                        allowed_roles = COALESCE($9, allowed_roles),
                        is_active = COALESCE($10, is_active)
                     WHERE id = $1
                     RETURNING id",
                )
                .bind(id)
                .bind(&payload.slug)
                .bind(&payload.title)
                .bind(&payload.description)
                .bind(&payload.query_template)
                .bind(&payload.param_schema)
                .bind(&payload.default_params)
                .bind(&payload.result_shape)
                .bind(&payload.allowed_roles)
                .bind(payload.is_active)
                .fetch_optional(pool)
                .await
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO graficos_dashboard
                        (slug, title, description, query_template, param_schema,
                         default_params, result_shape, allowed_roles, is_active)
                     VALUES ($1, $2, $3, $4, $5, $6, $7,
                             COALESCE($8, ARRAY['user']), COALESCE($9, TRUE))
                     RETURNING id",
                )
                .bind(&payload.slug)
                .bind(&payload.title)
                .bind(&payload.description)
                .bind(&payload.query_template)
                .bind(&payload.param_schema)
                .bind(&payload.default_params)
                .bind(&payload.result_shape)
                .bind(&payload.allowed_roles)
                .bind(payload.is_active)
                .fetch_optional(pool)
                .await
            }
        };

        match result {
            Ok(Some(id)) => Ok(id),
            Ok(None) => Err(AppError::NotFound(
                "Gráfico não encontrado para atualização.".to_string(),
            )),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict(format!("Slug '{}' já existe.", payload.slug)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn upsert_table(
        &self,
        pool: &PgPool,
        payload: &ManageTablePayload,
    ) -> Result<i64, AppError> {
        let result = match payload.id {
            Some(id) => {
                sqlx::query_scalar::<_, i64>(
                    "UPDATE dashboard_tables SET
                        slug = $2, title = $3, description = $4, query_template = $5,
                        column_config = $6, param_schema = $7, default_params = $8,
                        result_shape = $9,
                        allowed_roles = COALESCE($10, allowed_roles),
                        primary_key = COALESCE($11, primary_key),
                        is_active = COALESCE($12, is_active)
                     WHERE id = $1
                     RETURNING id",
                )
                .bind(id)
                .bind(&payload.slug)
                .bind(&payload.title)
                .bind(&payload.description)
                .bind(&payload.query_template)
                .bind(&payload.column_config)
                .bind(&payload.param_schema)
                .bind(&payload.default_params)
                .bind(&payload.result_shape)
                .bind(&payload.allowed_roles)
                .bind(&payload.primary_key)
                .bind(payload.is_active)
                .fetch_optional(pool)
                .await
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO dashboard_tables
                        (slug, title, description, query_template, column_config,
                         param_schema, default_params, result_shape, allowed_roles,
                         primary_key, is_active)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                             COALESCE($9, ARRAY['user']), $10, COALESCE($11, TRUE))
                     RETURNING id",
                )
                .bind(&payload.slug)
                .bind(&payload.title)
                .bind(&payload.description)
                .bind(&payload.query_template)
                .bind(&payload.column_config)
                .bind(&payload.param_schema)
                .bind(&payload.default_params)
                .bind(&payload.result_shape)
                .bind(&payload.allowed_roles)
                .bind(&payload.primary_key)
                .bind(payload.is_active)
                .fetch_optional(pool)
                .await
            }
        };

        match result {
            Ok(Some(id)) => Ok(id),
            Ok(None) => Err(AppError::NotFound(
                "Tabela não encontrada para atualização.".to_string(),
            )),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict(format!("Slug '{}' já existe.", payload.slug)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    // Sonda a tabela `clientes` do tenant: devolve a coluna de timestamp a
    // usar na tabela sintetizada (`ultimo_acesso`, senão `created_at`) ou
    // None quando a tabela não existe.
    pub async fn clientes_timestamp_column(
        &self,
        pool: &PgPool,
    ) -> Result<Option<String>, AppError> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT column_name FROM information_schema.columns
             WHERE table_name = 'clientes'
               AND column_name IN ('ultimo_acesso', 'created_at')",
        )
        .fetch_all(pool)
        .await?;

        if columns.iter().any(|c| c == "ultimo_acesso") {
            Ok(Some("ultimo_acesso".to_string()))
        } else if columns.iter().any(|c| c == "created_at") {
            Ok(Some("created_at".to_string()))
        } else {
            Ok(None)
        }
    }

    pub async fn toggle_customer_paused(
        &self,
        pool: &PgPool,
        customer_id: i64,
    ) -> Result<Option<(i64, bool)>, AppError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "UPDATE clientes
             SET paused = NOT COALESCE(paused, FALSE), updated_at = now()
             WHERE id = $1
             RETURNING id, paused",
        )
        .bind(customer_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }
}
