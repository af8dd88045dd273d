// src/db/tenant_pools.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{common::error::AppError, models::tenant::TenantCoordinates};

// Registro processo-local de pools por tenant. A chave é a própria string de
// conexão; o mapa só cresce e os pools vivem até o shutdown do processo.
// Cada pool é limitado e preguiçoso: a primeira consulta abre a conexão.
#[derive(Clone)]
pub struct TenantPoolRegistry {
    pools: Arc<Mutex<HashMap<String, PgPool>>>,
    default_port: u16,
}

impl TenantPoolRegistry {
    pub fn new(default_port: u16) -> Self {
        Self {
            pools: Arc::new(Mutex::new(HashMap::new())),
            default_port,
        }
    }

    // Devolve o pool do tenant, criando-o na primeira vez. Conexões
    // emprestadas são devolvidas no drop do `PoolConnection`, em qualquer
    // caminho de saída.
    pub fn pool_for(&self, coords: &TenantCoordinates) -> Result<PgPool, AppError> {
        let url = coords.connection_url(self.default_port);

        let mut pools = self
            .pools
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(pool) = pools.get(&url) {
            return Ok(pool.clone());
        }

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(&url)
            .map_err(AppError::Database)?;

        tracing::info!(
            "Pool criado para o tenant '{}' em {}",
            coords.db_name,
            coords.db_host
        );
        pools.insert(url, pool.clone());
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords() -> TenantCoordinates {
        TenantCoordinates {
            db_host: "localhost".into(),
            db_name: "tenant_a".into(),
            db_user: "app".into(),
            db_password: "secret".into(),
            company_name: Some("Empresa A".into()),
        }
    }

    #[tokio::test]
    async fn reutiliza_o_pool_do_mesmo_tenant() {
        let registry = TenantPoolRegistry::new(5432);
        // connect_lazy não abre conexão, então funciona sem banco de pé
        registry.pool_for(&coords()).unwrap();
        registry.pool_for(&coords()).unwrap();
        assert_eq!(registry.pools.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tenants_diferentes_ganham_pools_diferentes() {
        let registry = TenantPoolRegistry::new(5432);
        registry.pool_for(&coords()).unwrap();
        let mut other = coords();
        other.db_name = "tenant_b".into();
        registry.pool_for(&other).unwrap();
        assert_eq!(registry.pools.lock().unwrap().len(), 2);
    }
}
