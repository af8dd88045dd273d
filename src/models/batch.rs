// src/models/batch.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

// Corpo do POST /fetchUserData. Sem filtros, o lote cobre todos os
// gráficos/tabelas ativos do tenant.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct BatchRequest {
    pub graphs: Option<Vec<SlugRequest>>,
    pub tables: Option<Vec<SlugRequest>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SlugRequest {
    pub slug: String,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GraphEntry {
    pub id: i64,
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub result_shape: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TableEntry {
    pub id: i64,
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub column_config: Option<Value>,
    pub primary_key: Option<String>,
}

// Rastro de execução por consulta, devolvido em `debug`/`tableDebug`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DebugEntry {
    pub slug: String,
    #[schema(value_type = Object)]
    pub params: Map<String, Value>,
    pub query: String,
    pub args: Vec<Value>,
    pub row_count: usize,
    pub sample: Option<Value>,
}

// Documento de resposta do lote. Falhas por-slug moram em `errors`/
// `tableErrors`; as chaves de `datasets`/`tableRows` são os ids numéricos
// dos metadados e a ordem de inserção não é contratual.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub company_name: Option<String>,
    pub graphics: Vec<GraphEntry>,
    #[schema(value_type = Object)]
    pub datasets: HashMap<i64, Vec<Map<String, Value>>>,
    #[schema(value_type = Object)]
    pub debug: HashMap<i64, DebugEntry>,
    pub errors: HashMap<String, String>,
    pub tables: Vec<TableEntry>,
    #[serde(rename = "tableRows")]
    #[schema(value_type = Object)]
    pub table_rows: HashMap<i64, Vec<Map<String, Value>>>,
    #[serde(rename = "tableDebug")]
    #[schema(value_type = Object)]
    pub table_debug: HashMap<i64, DebugEntry>,
    #[serde(rename = "tableErrors")]
    pub table_errors: HashMap<String, String>,
}

// Payloads do POST /toggleCustomerPaused.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TogglePausedPayload {
    pub customer_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TogglePausedResponse {
    pub customer_id: i64,
    pub paused: bool,
}
