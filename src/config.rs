// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    db::{DeviceRepository, MetadataRepository, RegistryRepository, TenantPoolRegistry},
    middleware::rate_limit::{RateLimiter, DEFAULT_WINDOW},
    services::{
        admin_service::AdminService,
        batch_service::BatchService,
        device_service::DeviceService,
        email::{Mailer, ResendMailer},
        identity::{IdentityProvider, SupabaseAuth},
    },
};

// Configuração lida uma única vez do ambiente.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_url: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub client_db_default_port: u16,
    pub allowed_origin: String,
    pub resend_api_key: Option<String>,
    pub security_email_from: Option<String>,
    pub device_confirm_url: Option<String>,
    pub app_base_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?,
            supabase_url: env::var("SUPABASE_URL").context("SUPABASE_URL deve ser definida")?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .context("SUPABASE_ANON_KEY deve ser definida")?,
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .context("SUPABASE_SERVICE_ROLE_KEY deve ser definida")?,
            client_db_default_port: env::var("CLIENT_DB_DEFAULT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5432),
            allowed_origin: env::var("FUNCTIONS_ALLOWED_ORIGIN").unwrap_or_else(|_| "*".into()),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            security_email_from: env::var("SECURITY_EMAIL_FROM").ok(),
            device_confirm_url: env::var("SECURITY_DEVICE_CONFIRM_URL").ok(),
            app_base_url: env::var("APP_BASE_URL").ok(),
        })
    }

    // Base do link de confirmação de dispositivo, nesta ordem: URL fixa de
    // configuração, base da aplicação, origem da requisição, localhost.
    pub fn confirm_base(&self, request_origin: Option<&str>) -> String {
        if let Some(url) = &self.device_confirm_url {
            return url.clone();
        }
        if let Some(base) = &self.app_base_url {
            return format!("{}/confirmDevice", base.trim_end_matches('/'));
        }
        if let Some(origin) = request_origin.filter(|o| !o.is_empty()) {
            return format!("{}/confirmDevice", origin.trim_end_matches('/'));
        }
        "http://localhost:5173/confirmDevice".to_string()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub central_pool: sqlx::PgPool,
    pub identity: Arc<dyn IdentityProvider>,
    pub tenant_pools: TenantPoolRegistry,
    pub registry_repo: RegistryRepository,
    pub metadata_repo: MetadataRepository,
    pub device_service: DeviceService,
    pub batch_service: BatchService,
    pub admin_service: AdminService,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Arc::new(Settings::from_env()?);

        // Banco central: registro de tenants, dispositivos e auditoria.
        let central_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await
            .context("Falha ao conectar no banco central")?;

        tracing::info!("Conexão com o banco central estabelecida");

        // Toda chamada externa carrega deadline finito.
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Falha ao montar o cliente HTTP")?;

        let identity: Arc<dyn IdentityProvider> = Arc::new(SupabaseAuth::new(
            http_client.clone(),
            settings.supabase_url.clone(),
            settings.supabase_anon_key.clone(),
            settings.supabase_service_role_key.clone(),
        ));

        let mailer: Arc<dyn Mailer> = Arc::new(ResendMailer::new(
            http_client,
            settings.resend_api_key.clone(),
            settings.security_email_from.clone(),
        ));

        // --- Monta o gráfico de dependências ---
        let registry_repo = RegistryRepository::new(central_pool.clone());
        let device_repo = DeviceRepository::new(central_pool.clone());
        let metadata_repo = MetadataRepository::new();

        let device_service = DeviceService::new(device_repo, mailer, identity.clone());
        let batch_service = BatchService::new(metadata_repo.clone());
        let admin_service = AdminService::new(
            registry_repo.clone(),
            metadata_repo.clone(),
            identity.clone(),
        );

        Ok(Self {
            tenant_pools: TenantPoolRegistry::new(settings.client_db_default_port),
            settings,
            central_pool,
            identity,
            registry_repo,
            metadata_repo,
            device_service,
            batch_service,
            admin_service,
            rate_limiter: RateLimiter::new(DEFAULT_WINDOW),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            port: 3000,
            database_url: "postgres://localhost/central".into(),
            supabase_url: "https://proj.supabase.co".into(),
            supabase_anon_key: "anon".into(),
            supabase_service_role_key: "service".into(),
            client_db_default_port: 5432,
            allowed_origin: "*".into(),
            resend_api_key: None,
            security_email_from: None,
            device_confirm_url: None,
            app_base_url: None,
        }
    }

    #[test]
    fn base_de_confirmacao_segue_a_ordem_de_precedencia() {
        let mut s = settings();
        assert_eq!(
            s.confirm_base(None),
            "http://localhost:5173/confirmDevice"
        );
        assert_eq!(
            s.confirm_base(Some("https://painel.exemplo.com")),
            "https://painel.exemplo.com/confirmDevice"
        );

        s.app_base_url = Some("https://app.exemplo.com/".into());
        assert_eq!(
            s.confirm_base(Some("https://painel.exemplo.com")),
            "https://app.exemplo.com/confirmDevice"
        );

        s.device_confirm_url = Some("https://seguro.exemplo.com/device".into());
        assert_eq!(s.confirm_base(None), "https://seguro.exemplo.com/device");
    }
}
