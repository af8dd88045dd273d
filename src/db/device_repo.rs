// src/db/device_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::device::{DeviceRecord, NewLoginEvent, RegisterLoginEventPayload},
};

const DEVICE_COLUMNS: &str = "id, user_id, device_id, device_name, user_agent, ip_address, \
     locale, timezone, screen, status, approval_token, created_at, updated_at, \
     confirmed_at, last_seen_at";

// Persistência dos dispositivos conhecidos e da auditoria de logins, no
// banco central. Conflitos em (user_id, device_id) resolvem no upsert;
// mutações subsequentes usam o id substituto.
#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_user_device(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<DeviceRecord>, AppError> {
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM security_user_devices
             WHERE user_id = $1 AND device_id = $2"
        ))
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_token(&self, token: &str) -> Result<Option<DeviceRecord>, AppError> {
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM security_user_devices WHERE approval_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    // Cria o registro pendente de um dispositivo novo. Em corrida com outra
    // requisição do mesmo dispositivo, o conflito atualiza só os atributos
    // mutáveis e preserva status e token existentes.
    pub async fn insert_pending(
        &self,
        user_id: Uuid,
        payload: &RegisterLoginEventPayload,
        ip_address: Option<&str>,
        approval_token: &str,
    ) -> Result<DeviceRecord, AppError> {
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            "INSERT INTO security_user_devices
                (user_id, device_id, device_name, user_agent, ip_address, locale,
                 timezone, screen, status, approval_token)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
             ON CONFLICT (user_id, device_id) DO UPDATE SET
                device_name = EXCLUDED.device_name,
                user_agent  = EXCLUDED.user_agent,
                ip_address  = EXCLUDED.ip_address,
                locale      = EXCLUDED.locale,
                timezone    = EXCLUDED.timezone,
                screen      = EXCLUDED.screen,
                updated_at  = now()
             RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&payload.device_id)
        .bind(&payload.device_name)
        .bind(&payload.user_agent)
        .bind(ip_address)
        .bind(&payload.locale)
        .bind(&payload.timezone)
        .bind(&payload.screen)
        .bind(approval_token)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    // Troca o token de aprovação (reenvio de confirmação).
    pub async fn set_token(&self, id: Uuid, token: &str) -> Result<DeviceRecord, AppError> {
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            "UPDATE security_user_devices
             SET approval_token = $2, updated_at = now()
             WHERE id = $1
             RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(id)
        .bind(token)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    // Login em dispositivo já conhecido: atualiza atributos mutáveis e o
    // last_seen_at.
    pub async fn touch_attributes(
        &self,
        id: Uuid,
        payload: &RegisterLoginEventPayload,
        ip_address: Option<&str>,
    ) -> Result<DeviceRecord, AppError> {
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            "UPDATE security_user_devices SET
                device_name  = COALESCE($2, device_name),
                user_agent   = COALESCE($3, user_agent),
                ip_address   = COALESCE($4, ip_address),
                locale       = COALESCE($5, locale),
                timezone     = COALESCE($6, timezone),
                screen       = COALESCE($7, screen),
                last_seen_at = now(),
                updated_at   = now()
             WHERE id = $1
             RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(id)
        .bind(&payload.device_name)
        .bind(&payload.user_agent)
        .bind(ip_address)
        .bind(&payload.locale)
        .bind(&payload.timezone)
        .bind(&payload.screen)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    // Consome o token: aprova o dispositivo e limpa o approval_token, que é
    // de uso único.
    pub async fn approve(&self, id: Uuid) -> Result<DeviceRecord, AppError> {
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            "UPDATE security_user_devices SET
                status         = 'approved',
                confirmed_at   = now(),
                approval_token = NULL,
                last_seen_at   = now(),
                updated_at     = now()
             WHERE id = $1
             RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn record_login_event(&self, event: &NewLoginEvent) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO security_login_events
                (user_id, device_id, device_name, ip_address, user_agent, locale,
                 timezone, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.user_id)
        .bind(&event.device_id)
        .bind(&event.device_name)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.locale)
        .bind(&event.timezone)
        .bind(&event.metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
