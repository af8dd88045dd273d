// src/main.rs

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;

mod common;
mod config;
mod db;
mod docs;
mod engine;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::AppState;
use crate::middleware::{
    auth::{admin_guard, auth_guard},
    device::device_guard,
    rate_limit::{enforce, RateLimitPolicy},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // Se a configuração falhar, a aplicação não deve subir.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Migrações do banco central (db_info + tabelas de segurança)
    sqlx::migrate!()
        .run(&app_state.central_pool)
        .await
        .expect("Falha ao rodar as migrações do banco central.");

    tracing::info!("Migrações do banco central executadas com sucesso");

    let port = app_state.settings.port;
    let app = build_router(app_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.expect("Erro no servidor Axum");
}

fn build_router(app_state: AppState) -> Router {
    // Guardas montadas uma única vez e clonadas por rota, para não repetir
    // o preâmbulo de auth/cota em cada handler.
    let rl = {
        let limiter = app_state.rate_limiter.clone();
        move |scope: &'static str, max: u32| {
            let limiter = limiter.clone();
            let policy = RateLimitPolicy::new(scope, max);
            axum_middleware::from_fn(
                move |req: axum::extract::Request, next: axum_middleware::Next| {
                    enforce(limiter.clone(), policy, req, next)
                },
            )
        }
    };
    let guard_auth = axum_middleware::from_fn_with_state(app_state.clone(), auth_guard);
    let guard_admin = axum_middleware::from_fn(admin_guard);
    let guard_device = axum_middleware::from_fn_with_state(app_state.clone(), device_guard);

    // Camadas por rota, de dentro para fora: handler <- device <- admin <-
    // auth <- rate limit. A última camada adicionada roda primeiro.
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(serve_openapi))
        // token é a capacidade; sem bearer e sem cota
        .route(
            "/confirmDevice",
            get(handlers::devices::confirm_device_get)
                .post(handlers::devices::confirm_device_post),
        )
        .route(
            "/fetchUserData",
            post(handlers::fetch_data::fetch_user_data)
                .layer(guard_auth.clone())
                .layer(rl("fetchUserData", 60)),
        )
        .route(
            "/registerLoginEvent",
            post(handlers::devices::register_login_event)
                .layer(guard_auth.clone())
                .layer(rl("registerLoginEvent", 20)),
        )
        .route(
            "/checkDeviceStatus",
            post(handlers::devices::check_device_status)
                .layer(guard_auth.clone())
                .layer(rl("checkDeviceStatus", 30)),
        )
        .route(
            "/manageGraph",
            post(handlers::admin::manage_graph)
                .layer(guard_device.clone())
                .layer(guard_admin.clone())
                .layer(guard_auth.clone())
                .layer(rl("manageGraph", 60)),
        )
        .route(
            "/manageTable",
            post(handlers::admin::manage_table)
                .layer(guard_device.clone())
                .layer(guard_admin.clone())
                .layer(guard_auth.clone())
                .layer(rl("manageTable", 60)),
        )
        .route(
            "/registerUser",
            post(handlers::admin::register_user)
                .layer(guard_device.clone())
                .layer(guard_admin.clone())
                .layer(guard_auth.clone())
                .layer(rl("registerUser", 10)),
        )
        .route(
            "/listCompanies",
            post(handlers::admin::list_companies)
                .layer(guard_device.clone())
                .layer(guard_admin.clone())
                .layer(guard_auth.clone())
                .layer(rl("listCompanies", 30)),
        )
        .route(
            "/toggleCustomerPaused",
            post(handlers::customers::toggle_customer_paused)
                .layer(guard_device.clone())
                .layer(guard_auth.clone())
                .layer(rl("toggleCustomerPaused", 10)),
        )
        .method_not_allowed_fallback(|| async {
            (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        })
        .layer(cors_layer(&app_state.settings.allowed_origin))
        .with_state(app_state)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let origin = if allowed_origin == "*" {
        AllowOrigin::any()
    } else {
        match allowed_origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!("FUNCTIONS_ALLOWED_ORIGIN inválida; usando '*'");
                AllowOrigin::any()
            }
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("apikey"),
            header::HeaderName::from_static("x-client-info"),
            header::HeaderName::from_static("x-client-version"),
            header::HeaderName::from_static("x-client-device-id"),
        ])
}

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(docs::ApiDoc::openapi())
}
