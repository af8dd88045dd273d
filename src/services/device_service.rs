// src/services/device_service.rs

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use serde_json::json;

use crate::{
    common::error::AppError,
    db::DeviceRepository,
    models::{
        device::{
            CheckDeviceStatusPayload, DeviceRecord, DeviceStatusResponse, NewLoginEvent,
            RegisterLoginEventPayload, STATUS_PENDING,
        },
        principal::Principal,
    },
    services::{
        email::{compose_confirmation, compose_login_notification, DeviceEmailContext, Mailer},
        identity::IdentityProvider,
    },
};

// Máquina de estados de aprovação de dispositivos:
// ausente -> pending -> approved. O token de confirmação é de uso único;
// uma vez consumido, só um reenvio emite outro.
#[derive(Clone)]
pub struct DeviceService {
    repo: DeviceRepository,
    mailer: Arc<dyn Mailer>,
    identity: Arc<dyn IdentityProvider>,
}

// Decisão pura do reenvio: token novo apenas quando o cliente pediu reenvio
// ou quando o registro pendente ficou sem token.
fn should_mint_token(existing_token: Option<&str>, resend_requested: bool) -> bool {
    resend_requested || existing_token.is_none()
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn confirm_link(base: &str, token: &str) -> String {
    format!("{}?token={}", base.trim_end_matches('?'), token)
}

impl DeviceService {
    pub fn new(
        repo: DeviceRepository,
        mailer: Arc<dyn Mailer>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            repo,
            mailer,
            identity,
        }
    }

    fn email_context(principal_email: &str, record: &DeviceRecord) -> DeviceEmailContext {
        DeviceEmailContext {
            recipient_name: principal_email.to_string(),
            device_name: record
                .device_name
                .clone()
                .unwrap_or_else(|| "Dispositivo sem nome".to_string()),
            ip_address: record
                .ip_address
                .clone()
                .unwrap_or_else(|| "desconhecido".to_string()),
            locale: record.locale.clone().unwrap_or_else(|| "-".to_string()),
            timezone: record.timezone.clone().unwrap_or_else(|| "-".to_string()),
            occurred_at: Utc::now(),
        }
    }

    async fn audit(&self, record: &DeviceRecord, event: &str) {
        let login_event = NewLoginEvent {
            user_id: record.user_id,
            device_id: record.device_id.clone(),
            device_name: record.device_name.clone(),
            ip_address: record.ip_address.clone(),
            user_agent: record.user_agent.clone(),
            locale: record.locale.clone(),
            timezone: record.timezone.clone(),
            metadata: json!({ "event": event, "screen": record.screen }),
        };
        // auditoria é melhor esforço: falha vira log, nunca erro do caller
        if let Err(e) = self.repo.record_login_event(&login_event).await {
            tracing::warn!("Falha ao gravar evento de login: {e}");
        }
    }

    // POST /registerLoginEvent: registra o login e aplica a transição do
    // dispositivo, devolvendo o estado resultante ao cliente.
    pub async fn register_login_event(
        &self,
        principal: &Principal,
        payload: &RegisterLoginEventPayload,
        ip_address: Option<String>,
        confirm_base: &str,
    ) -> Result<DeviceStatusResponse, AppError> {
        if payload.device_id.trim().is_empty() {
            return Err(AppError::BadRequest("deviceId é obrigatório.".to_string()));
        }

        let existing = self
            .repo
            .get_by_user_device(principal.id, &payload.device_id)
            .await?;

        match existing {
            // ausente -> pending
            None => {
                let token = generate_token();
                let record = self
                    .repo
                    .insert_pending(principal.id, payload, ip_address.as_deref(), &token)
                    .await?;
                self.audit(&record, "device_registered").await;

                // em corrida o upsert pode ter preservado um token anterior
                let effective = record.approval_token.clone().unwrap_or(token);
                let ctx = Self::email_context(&principal.email, &record);
                self.mailer
                    .send(
                        &principal.email,
                        &compose_confirmation(&ctx, &confirm_link(confirm_base, &effective)),
                    )
                    .await;

                Ok(DeviceStatusResponse {
                    status: record.status.clone(),
                    requires_confirmation: !record.is_approved(),
                    device: Some(record),
                })
            }
            // approved -> approved: atualiza atributos mutáveis e notifica
            Some(record) if record.is_approved() => {
                let record = self
                    .repo
                    .touch_attributes(record.id, payload, ip_address.as_deref())
                    .await?;
                self.audit(&record, "login").await;

                let ctx = Self::email_context(&principal.email, &record);
                self.mailer
                    .send(&principal.email, &compose_login_notification(&ctx))
                    .await;

                Ok(DeviceStatusResponse {
                    status: record.status.clone(),
                    requires_confirmation: false,
                    device: Some(record),
                })
            }
            // pending -> pending (reenvio)
            Some(record) => {
                let record = if should_mint_token(record.approval_token.as_deref(), payload.resend)
                {
                    self.repo.set_token(record.id, &generate_token()).await?
                } else {
                    record
                };
                self.audit(&record, "login_pending").await;

                if let Some(token) = record.approval_token.as_deref() {
                    let ctx = Self::email_context(&principal.email, &record);
                    self.mailer
                        .send(
                            &principal.email,
                            &compose_confirmation(&ctx, &confirm_link(confirm_base, token)),
                        )
                        .await;
                }

                Ok(DeviceStatusResponse {
                    status: STATUS_PENDING.to_string(),
                    requires_confirmation: true,
                    device: Some(record),
                })
            }
        }
    }

    // POST /checkDeviceStatus: consulta sem efeito colateral, exceto o
    // reenvio explícito da confirmação.
    pub async fn check_status(
        &self,
        principal: &Principal,
        payload: &CheckDeviceStatusPayload,
        confirm_base: &str,
    ) -> Result<DeviceStatusResponse, AppError> {
        if payload.device_id.trim().is_empty() {
            return Err(AppError::BadRequest("deviceId é obrigatório.".to_string()));
        }

        let record = self
            .repo
            .get_by_user_device(principal.id, &payload.device_id)
            .await?;

        match record {
            None => Ok(DeviceStatusResponse {
                status: "not_found".to_string(),
                requires_confirmation: true,
                device: None,
            }),
            Some(record) if record.is_approved() => Ok(DeviceStatusResponse {
                status: record.status.clone(),
                requires_confirmation: false,
                device: Some(record),
            }),
            Some(record) => {
                let record = if payload.resend {
                    let record = self.repo.set_token(record.id, &generate_token()).await?;
                    if let Some(token) = record.approval_token.as_deref() {
                        let ctx = Self::email_context(&principal.email, &record);
                        self.mailer
                            .send(
                                &principal.email,
                                &compose_confirmation(&ctx, &confirm_link(confirm_base, token)),
                            )
                            .await;
                    }
                    record
                } else {
                    record
                };

                Ok(DeviceStatusResponse {
                    status: STATUS_PENDING.to_string(),
                    requires_confirmation: true,
                    device: Some(record),
                })
            }
        }
    }

    // Consome o token de confirmação: pending -> approved. O token some do
    // registro, portanto a segunda chamada com o mesmo token é NotFound.
    pub async fn confirm(&self, token: &str) -> Result<DeviceRecord, AppError> {
        if token.trim().is_empty() {
            return Err(AppError::BadRequest("token é obrigatório.".to_string()));
        }

        let record = self.repo.get_by_token(token).await?.ok_or_else(|| {
            AppError::NotFound("Token não encontrado ou já utilizado.".to_string())
        })?;

        let record = self.repo.approve(record.id).await?;
        self.audit(&record, "device_confirmed").await;

        // notifica o dono; sem e-mail resolvível vira warning
        match self.identity.get_user_by_id(record.user_id).await {
            Ok(Some(user)) => {
                if let Some(email) = user.get("email").and_then(serde_json::Value::as_str) {
                    let ctx = Self::email_context(email, &record);
                    self.mailer
                        .send(email, &compose_login_notification(&ctx))
                        .await;
                }
            }
            Ok(None) => tracing::warn!("Usuário {} não encontrado para notificação", record.user_id),
            Err(e) => tracing::warn!("Falha ao resolver e-mail para notificação: {e}"),
        }

        Ok(record)
    }

    // Portão dos endpoints sensíveis: exige X-Client-Device-Id de um
    // dispositivo aprovado. Uma vez aprovado, segue aprovado até o registro
    // ser removido externamente.
    pub async fn require_approved(
        &self,
        principal: &Principal,
        device_id: Option<&str>,
    ) -> Result<(), AppError> {
        let device_id = device_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::Forbidden(
                    "Cabeçalho X-Client-Device-Id é obrigatório para esta operação.".to_string(),
                )
            })?;

        let record = self
            .repo
            .get_by_user_device(principal.id, device_id)
            .await?;

        match record {
            Some(record) if record.is_approved() => Ok(()),
            _ => Err(AppError::Forbidden(
                "Dispositivo não aprovado. Confirme o dispositivo para continuar.".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reenvio_explicito_sempre_gera_token_novo() {
        assert!(should_mint_token(Some("antigo"), true));
        assert!(should_mint_token(None, true));
    }

    #[test]
    fn sem_reenvio_preserva_token_existente() {
        assert!(!should_mint_token(Some("antigo"), false));
        // registro pendente que perdeu o token volta a ganhar um
        assert!(should_mint_token(None, false));
    }

    #[test]
    fn token_gerado_e_hex_de_32_bytes() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn link_de_confirmacao_anexa_o_token() {
        assert_eq!(
            confirm_link("https://app.exemplo.com/confirmDevice", "abc"),
            "https://app.exemplo.com/confirmDevice?token=abc"
        );
    }
}
