// src/services/email.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

// Conteúdo pronto de um e-mail transacional.
#[derive(Debug, Clone)]
pub struct EmailPayload {
    pub subject: String,
    pub html: String,
    pub text: String,
}

// Contexto comum das mensagens de segurança.
#[derive(Debug, Clone)]
pub struct DeviceEmailContext {
    pub recipient_name: String,
    pub device_name: String,
    pub ip_address: String,
    pub locale: String,
    pub timezone: String,
    pub occurred_at: DateTime<Utc>,
}

fn details_block(ctx: &DeviceEmailContext) -> String {
    format!(
        "Dispositivo: {}\nIP: {}\nIdioma: {}\nFuso horário: {}\nQuando: {}",
        ctx.device_name,
        ctx.ip_address,
        ctx.locale,
        ctx.timezone,
        ctx.occurred_at.format("%d/%m/%Y %H:%M UTC")
    )
}

fn details_html(ctx: &DeviceEmailContext) -> String {
    format!(
        "<ul>\
         <li><strong>Dispositivo:</strong> {}</li>\
         <li><strong>IP:</strong> {}</li>\
         <li><strong>Idioma:</strong> {}</li>\
         <li><strong>Fuso horário:</strong> {}</li>\
         <li><strong>Quando:</strong> {}</li>\
         </ul>",
        ctx.device_name,
        ctx.ip_address,
        ctx.locale,
        ctx.timezone,
        ctx.occurred_at.format("%d/%m/%Y %H:%M UTC")
    )
}

// E-mail de confirmação de dispositivo novo, com o link de uso único.
pub fn compose_confirmation(ctx: &DeviceEmailContext, confirm_link: &str) -> EmailPayload {
    let subject = "Confirme o novo dispositivo de acesso".to_string();
    let text = format!(
        "Olá, {}!\n\nDetectamos um login de um dispositivo ainda não confirmado.\n\n{}\n\nSe foi você, confirme o acesso pelo link:\n{}\n\nSe não reconhece este acesso, ignore este e-mail.",
        ctx.recipient_name,
        details_block(ctx),
        confirm_link
    );
    let html = format!(
        "<h2>Olá, {}!</h2>\
         <p>Detectamos um login de um dispositivo ainda não confirmado.</p>{}\
         <p><a href=\"{}\" style=\"background:#2563eb;color:#fff;padding:10px 18px;border-radius:6px;text-decoration:none\">Confirmar dispositivo</a></p>\
         <p>Se não reconhece este acesso, ignore este e-mail.</p>",
        ctx.recipient_name,
        details_html(ctx),
        confirm_link
    );
    EmailPayload {
        subject,
        html,
        text,
    }
}

// Notificação de login em dispositivo já aprovado.
pub fn compose_login_notification(ctx: &DeviceEmailContext) -> EmailPayload {
    let subject = "Novo login na sua conta".to_string();
    let text = format!(
        "Olá, {}!\n\nRegistramos um novo login na sua conta.\n\n{}\n\nSe não foi você, troque sua senha imediatamente.",
        ctx.recipient_name,
        details_block(ctx)
    );
    let html = format!(
        "<h2>Olá, {}!</h2>\
         <p>Registramos um novo login na sua conta.</p>{}\
         <p>Se não foi você, troque sua senha imediatamente.</p>",
        ctx.recipient_name,
        details_html(ctx)
    );
    EmailPayload {
        subject,
        html,
        text,
    }
}

// Transporte. Falha de envio nunca derruba o chamador: devolve false.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, payload: &EmailPayload) -> bool;
}

// Provedor transacional HTTP. Sem credenciais configuradas o envio vira
// warning e retorna false.
#[derive(Clone)]
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: Option<String>,
    from: Option<String>,
}

impl ResendMailer {
    pub fn new(client: reqwest::Client, api_key: Option<String>, from: Option<String>) -> Self {
        Self {
            client,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, payload: &EmailPayload) -> bool {
        let (Some(api_key), Some(from)) = (&self.api_key, &self.from) else {
            tracing::warn!("RESEND_API_KEY/SECURITY_EMAIL_FROM ausentes; e-mail não enviado");
            return false;
        };

        let result = self
            .client
            .post("https://api.resend.com/emails")
            .bearer_auth(api_key)
            .json(&json!({
                "from": from,
                "to": [to],
                "subject": payload.subject,
                "html": payload.html,
                "text": payload.text,
            }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!("Envio de e-mail falhou: {}", response.status());
                false
            }
            Err(e) => {
                tracing::warn!("Envio de e-mail falhou: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DeviceEmailContext {
        DeviceEmailContext {
            recipient_name: "Ana".into(),
            device_name: "Notebook da Ana".into(),
            ip_address: "203.0.113.7".into(),
            locale: "pt-BR".into(),
            timezone: "America/Sao_Paulo".into(),
            occurred_at: DateTime::parse_from_rfc3339("2025-01-15T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn confirmacao_carrega_o_link_nas_duas_versoes() {
        let link = "https://app.exemplo.com/confirmDevice?token=abc123";
        let email = compose_confirmation(&ctx(), link);
        assert!(email.html.contains(link));
        assert!(email.text.contains(link));
        assert!(email.subject.contains("Confirme"));
    }

    #[test]
    fn notificacao_descreve_o_dispositivo() {
        let email = compose_login_notification(&ctx());
        assert!(email.text.contains("Notebook da Ana"));
        assert!(email.html.contains("203.0.113.7"));
        assert!(email.text.contains("15/01/2025"));
    }
}
