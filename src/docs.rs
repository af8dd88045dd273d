// src/docs.rs

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Dados ---
        handlers::fetch_data::fetch_user_data,

        // --- Dispositivos ---
        handlers::devices::register_login_event,
        handlers::devices::check_device_status,
        handlers::devices::confirm_device_get,
        handlers::devices::confirm_device_post,

        // --- Administração ---
        handlers::admin::manage_graph,
        handlers::admin::manage_table,
        handlers::admin::register_user,
        handlers::admin::list_companies,

        // --- Clientes ---
        handlers::customers::toggle_customer_paused,
    ),
    components(
        schemas(
            models::batch::BatchRequest,
            models::batch::SlugRequest,
            models::batch::BatchResponse,
            models::batch::GraphEntry,
            models::batch::TableEntry,
            models::batch::DebugEntry,
            models::batch::TogglePausedPayload,
            models::batch::TogglePausedResponse,
            models::device::DeviceRecord,
            models::device::DeviceStatusResponse,
            models::device::RegisterLoginEventPayload,
            models::device::CheckDeviceStatusPayload,
            models::device::ConfirmDevicePayload,
            models::metadata::ManageGraphPayload,
            models::metadata::ManageTablePayload,
            models::metadata::ManageResponse,
            models::metadata::ParamSchemaEntry,
            models::metadata::ItemsSchema,
            models::metadata::ParamType,
            models::tenant::RegisterUserPayload,
            models::tenant::CompanyEntry,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Dados", description = "Execução do lote de gráficos e tabelas"),
        (name = "Dispositivos", description = "Ciclo de vida de aprovação de dispositivos"),
        (name = "Administração", description = "Metadados e provisionamento de empresas"),
        (name = "Clientes", description = "Ações pontuais sobre a tabela de clientes"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_jwt",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
