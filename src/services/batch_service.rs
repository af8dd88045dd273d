// src/services/batch_service.rs

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    common::error::AppError,
    db::MetadataRepository,
    engine::{params::resolve_params, sanitize::sanitize_row, template::compile},
    models::{
        batch::{BatchRequest, BatchResponse, DebugEntry, GraphEntry, SlugRequest, TableEntry},
        metadata::{parse_default_params, parse_param_schema},
        principal::Principal,
    },
};

const ERR_EMPTY_TEMPLATE: &str = "Query template vazio.";
const ERR_ROLE: &str = "Usuário não possui permissão para visualizar este recurso.";
const ERR_CHART_NOT_FOUND: &str = "Gráfico não encontrado ou inativo.";
const ERR_TABLE_NOT_FOUND: &str = "Tabela não encontrada ou inativa.";

const CLIENTES_SLUG: &str = "clientes";
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

// Executor de lote: percorre os metadados em ordem de id e rebaixa toda
// falha para uma entrada por-slug. Só falhas de infraestrutura (token,
// tenant, conexão) derrubam a requisição — e elas acontecem antes daqui.
#[derive(Clone)]
pub struct BatchService {
    metadata_repo: MetadataRepository,
}

struct QueryOutcome {
    rows: Vec<Map<String, Value>>,
    debug: DebugEntry,
}

impl BatchService {
    pub fn new(metadata_repo: MetadataRepository) -> Self {
        Self { metadata_repo }
    }

    pub async fn run(
        &self,
        pool: &PgPool,
        principal: &Principal,
        request: &BatchRequest,
        company_name: Option<String>,
    ) -> Result<BatchResponse, AppError> {
        // discrepância herdada do produto: o caminho de dados soma "user"
        // ao conjunto de papéis antes do portão de allowed_roles
        let mut effective_roles = principal.roles.clone();
        effective_roles.insert("user".to_string());

        let mut response = BatchResponse {
            company_name,
            graphics: Vec::new(),
            datasets: HashMap::new(),
            debug: HashMap::new(),
            errors: HashMap::new(),
            tables: Vec::new(),
            table_rows: HashMap::new(),
            table_debug: HashMap::new(),
            table_errors: HashMap::new(),
        };

        self.run_charts(pool, &effective_roles, request, &mut response)
            .await?;
        self.run_tables(pool, &effective_roles, request, &mut response)
            .await?;

        Ok(response)
    }

    async fn run_charts(
        &self,
        pool: &PgPool,
        roles: &HashSet<String>,
        request: &BatchRequest,
        response: &mut BatchResponse,
    ) -> Result<(), AppError> {
        let requested = request.graphs.as_deref();
        let slug_filter = slug_filter(requested);
        let params_by_slug = params_by_slug(requested);

        let rows = self
            .metadata_repo
            .fetch_active_charts(pool, slug_filter.as_deref())
            .await?;

        let mut found: HashSet<String> = HashSet::new();
        for row in rows {
            found.insert(row.slug.clone());
            let outcome = execute_metadata_query(
                pool,
                roles,
                &row.slug,
                row.query_template.as_deref(),
                row.allowed_roles.as_deref(),
                row.param_schema.as_ref(),
                row.default_params.as_ref(),
                params_by_slug.get(row.slug.as_str()).copied(),
            )
            .await;

            match outcome {
                Ok(outcome) => {
                    response.graphics.push(GraphEntry {
                        id: row.id,
                        slug: row.slug.clone(),
                        title: row.title.clone(),
                        description: row.description.clone(),
                        result_shape: row.result_shape.clone(),
                    });
                    response.datasets.insert(row.id, outcome.rows);
                    response.debug.insert(row.id, outcome.debug);
                }
                Err(message) => {
                    response.errors.insert(row.slug.clone(), message);
                }
            }
        }

        for slug in missing_slugs(requested, &found) {
            response.errors.insert(slug, ERR_CHART_NOT_FOUND.to_string());
        }
        Ok(())
    }

    async fn run_tables(
        &self,
        pool: &PgPool,
        roles: &HashSet<String>,
        request: &BatchRequest,
        response: &mut BatchResponse,
    ) -> Result<(), AppError> {
        let requested = request.tables.as_deref();
        let slug_filter = slug_filter(requested);
        let params_by_slug = params_by_slug(requested);

        let rows = self
            .metadata_repo
            .fetch_active_tables(pool, slug_filter.as_deref())
            .await?;

        let mut found: HashSet<String> = HashSet::new();
        for row in rows {
            found.insert(row.slug.clone());
            let outcome = execute_metadata_query(
                pool,
                roles,
                &row.slug,
                row.query_template.as_deref(),
                row.allowed_roles.as_deref(),
                row.param_schema.as_ref(),
                row.default_params.as_ref(),
                params_by_slug.get(row.slug.as_str()).copied(),
            )
            .await;

            match outcome {
                Ok(outcome) => {
                    response.tables.push(TableEntry {
                        id: row.id,
                        slug: row.slug.clone(),
                        title: row.title.clone(),
                        description: row.description.clone(),
                        column_config: row.column_config.clone(),
                        primary_key: row.primary_key.clone(),
                    });
                    response.table_rows.insert(row.id, outcome.rows);
                    response.table_debug.insert(row.id, outcome.debug);
                }
                Err(message) => {
                    response.table_errors.insert(row.slug.clone(), message);
                }
            }
        }

        // tabela de base `clientes`, sintetizada quando pedida ou quando o
        // cliente não restringiu slugs, e apenas se o tenant tem a tabela
        let wants_clientes = match slug_filter.as_deref() {
            None => true,
            Some(slugs) => slugs.iter().any(|s| s == CLIENTES_SLUG),
        };
        if wants_clientes && !found.contains(CLIENTES_SLUG) {
            if let Some(ts_column) = self.metadata_repo.clientes_timestamp_column(pool).await? {
                found.insert(CLIENTES_SLUG.to_string());
                self.run_clientes_baseline(pool, &ts_column, response).await;
            }
        }

        for slug in missing_slugs(requested, &found) {
            response
                .table_errors
                .insert(slug, ERR_TABLE_NOT_FOUND.to_string());
        }
        Ok(())
    }

    // A tabela de clientes não é uma linha de metadados: a consulta é fixa e
    // a configuração de colunas é sintetizada. Usa o id 0, que o BIGSERIAL
    // das tabelas reais nunca emite.
    async fn run_clientes_baseline(
        &self,
        pool: &PgPool,
        ts_column: &str,
        response: &mut BatchResponse,
    ) {
        let query = format!(
            "SELECT id, uuid, nome, nome_recebido, whatsapp, paused, {ts_column} \
             FROM clientes ORDER BY {ts_column} DESC NULLS LAST"
        );

        let result = tokio::time::timeout(QUERY_TIMEOUT, sqlx::query(&query).fetch_all(pool)).await;
        match result {
            Ok(Ok(rows)) => {
                let rows: Vec<Map<String, Value>> = rows.iter().map(sanitize_row).collect();
                let sample = rows.first().cloned().map(Value::Object);
                response.tables.push(TableEntry {
                    id: 0,
                    slug: CLIENTES_SLUG.to_string(),
                    title: Some("Clientes".to_string()),
                    description: None,
                    column_config: Some(clientes_column_config(ts_column)),
                    primary_key: Some("id".to_string()),
                });
                response.table_debug.insert(
                    0,
                    DebugEntry {
                        slug: CLIENTES_SLUG.to_string(),
                        params: Map::new(),
                        query,
                        args: Vec::new(),
                        row_count: rows.len(),
                        sample,
                    },
                );
                response.table_rows.insert(0, rows);
            }
            Ok(Err(e)) => {
                response
                    .table_errors
                    .insert(CLIENTES_SLUG.to_string(), format!("Falha ao executar consulta: {e}"));
            }
            Err(_) => {
                response.table_errors.insert(
                    CLIENTES_SLUG.to_string(),
                    "Tempo limite excedido na consulta.".to_string(),
                );
            }
        }
    }
}

fn clientes_column_config(ts_column: &str) -> Value {
    let ts_label = if ts_column == "ultimo_acesso" {
        "Último acesso"
    } else {
        "Criado em"
    };
    json!([
        { "key": "nome", "label": "Nome", "type": "string" },
        { "key": "nome_recebido", "label": "Nome recebido", "type": "string", "hidden": true },
        { "key": "whatsapp", "label": "WhatsApp", "type": "string" },
        { "key": "paused", "label": "Pausado", "type": "boolean", "is_toggle": true },
        { "key": ts_column, "label": ts_label, "type": "date" },
    ])
}

// Pipeline por-slug: template vazio -> papel -> parâmetros -> compilação ->
// execução -> sanitização. Qualquer falha devolve a mensagem que vai para o
// mapa de erros; `debug` só existe para quem executou.
#[allow(clippy::too_many_arguments)]
async fn execute_metadata_query(
    pool: &PgPool,
    roles: &HashSet<String>,
    slug: &str,
    query_template: Option<&str>,
    allowed_roles: Option<&[String]>,
    param_schema_raw: Option<&Value>,
    default_params_raw: Option<&Value>,
    provided: Option<&Map<String, Value>>,
) -> Result<QueryOutcome, String> {
    let template = query_template.map(str::trim).unwrap_or_default();
    if template.is_empty() {
        return Err(ERR_EMPTY_TEMPLATE.to_string());
    }

    if !role_allows(allowed_roles, roles) {
        return Err(ERR_ROLE.to_string());
    }

    let schema = parse_param_schema(param_schema_raw)?;
    let defaults = parse_default_params(default_params_raw);
    let empty = Map::new();
    let provided = provided.unwrap_or(&empty);

    let params = resolve_params(&schema, &defaults, provided, Utc::now().date_naive())
        .map_err(|e| e.to_string())?;

    let prepared = compile(template, &params, &schema).map_err(|e| e.to_string())?;

    let mut query = sqlx::query(&prepared.text);
    for arg in &prepared.args {
        query = arg.bind_to(query);
    }

    let rows = match tokio::time::timeout(QUERY_TIMEOUT, query.fetch_all(pool)).await {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            tracing::warn!("Consulta do slug '{slug}' falhou: {e}");
            return Err(format!("Falha ao executar consulta: {e}"));
        }
        Err(_) => return Err("Tempo limite excedido na consulta.".to_string()),
    };

    let rows: Vec<Map<String, Value>> = rows.iter().map(sanitize_row).collect();
    let sample = rows.first().cloned().map(Value::Object);

    let mut params_json = Map::new();
    for (name, value) in &params {
        params_json.insert(name.clone(), value.to_json());
    }

    Ok(QueryOutcome {
        debug: DebugEntry {
            slug: slug.to_string(),
            params: params_json,
            query: prepared.text.clone(),
            args: prepared.args.iter().map(|a| a.to_json()).collect(),
            row_count: rows.len(),
            sample,
        },
        rows,
    })
}

// allowed_roles vazio ou ausente libera; senão basta uma interseção.
fn role_allows(allowed: Option<&[String]>, roles: &HashSet<String>) -> bool {
    match allowed {
        None => true,
        Some(list) if list.is_empty() => true,
        Some(list) => list.iter().any(|role| roles.contains(role)),
    }
}

// Filtro de slugs: lista vazia equivale a "todos".
fn slug_filter(requested: Option<&[SlugRequest]>) -> Option<Vec<String>> {
    requested
        .filter(|list| !list.is_empty())
        .map(|list| list.iter().map(|r| r.slug.clone()).collect())
}

fn params_by_slug(requested: Option<&[SlugRequest]>) -> HashMap<&str, &Map<String, Value>> {
    let mut map = HashMap::new();
    if let Some(list) = requested {
        for entry in list {
            if let Some(params) = entry.params.as_ref() {
                map.insert(entry.slug.as_str(), params);
            }
        }
    }
    map
}

// Slugs pedidos que nenhuma linha de metadados cobriu.
fn missing_slugs(requested: Option<&[SlugRequest]>, found: &HashSet<String>) -> Vec<String> {
    requested
        .map(|list| {
            list.iter()
                .map(|r| r.slug.clone())
                .filter(|slug| !found.contains(slug))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn allowed_roles_vazio_libera_todo_mundo() {
        assert!(role_allows(None, &roles(&["authenticated"])));
        assert!(role_allows(Some(&[]), &roles(&["authenticated"])));
    }

    #[test]
    fn allowed_roles_exige_intersecao() {
        let allowed = vec!["admin".to_string(), "gestor".to_string()];
        assert!(role_allows(Some(&allowed), &roles(&["user", "gestor"])));
        assert!(!role_allows(Some(&allowed), &roles(&["user", "authenticated"])));
    }

    #[test]
    fn slugs_pedidos_e_nao_encontrados_sao_listados() {
        let requested = vec![
            SlugRequest {
                slug: "vendas".into(),
                params: None,
            },
            SlugRequest {
                slug: "inexistente".into(),
                params: None,
            },
        ];
        let mut found = HashSet::new();
        found.insert("vendas".to_string());
        assert_eq!(
            missing_slugs(Some(&requested), &found),
            vec!["inexistente".to_string()]
        );
        assert!(missing_slugs(None, &found).is_empty());
    }

    #[test]
    fn lista_vazia_de_slugs_vira_sem_filtro() {
        assert_eq!(slug_filter(Some(&[])), None);
        let requested = vec![SlugRequest {
            slug: "vendas".into(),
            params: None,
        }];
        assert_eq!(slug_filter(Some(&requested)), Some(vec!["vendas".into()]));
    }
}
