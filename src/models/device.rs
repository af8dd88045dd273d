// src/models/device.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";

// Dispositivo conhecido de um usuário, único por (user_id, device_id).
// Invariante: status = approved implica confirmed_at preenchido; o token de
// aprovação é de uso único e é substituído a cada reenvio ou confirmação.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub screen: Option<String>,
    pub status: String,
    #[serde(skip_serializing)] // nunca vaza na resposta
    pub approval_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    pub fn is_approved(&self) -> bool {
        self.status == STATUS_APPROVED && self.confirmed_at.is_some()
    }
}

// Atributos mutáveis enviados pelo cliente a cada login.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterLoginEventPayload {
    pub device_id: String,
    pub device_name: Option<String>,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub screen: Option<String>,
    #[serde(default)]
    pub resend: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckDeviceStatusPayload {
    pub device_id: String,
    #[serde(default)]
    pub resend: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConfirmDevicePayload {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusResponse {
    pub status: String,
    pub requires_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceRecord>,
}

// Linha de auditoria append-only gravada a cada login ou confirmação.
#[derive(Debug, Clone)]
pub struct NewLoginEvent {
    pub user_id: Uuid,
    pub device_id: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub metadata: Value,
}
