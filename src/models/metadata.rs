// src/models/metadata.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

// Tipos declaráveis em `param_schema`. A tipagem do engine começa e termina
// aqui: o corpo do template é texto opaco.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Date,
    Boolean,
    Array,
}

// Subesquema dos elementos de um parâmetro `array`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemsSchema {
    #[serde(rename = "type", default)]
    pub item_type: Option<ParamType>,
    #[serde(rename = "enum", default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

// Uma entrada de `param_schema`: como validar, coagir e padronizar um
// parâmetro nomeado do template.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ParamSchemaEntry {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub items: Option<ItemsSchema>,
    #[serde(default)]
    pub default: Option<Value>,
}

pub type ParamSchema = HashMap<String, ParamSchemaEntry>;

// Decodifica a coluna JSON `param_schema` de uma linha de metadados. Um
// esquema malformado é erro por-slug, nunca falha da requisição.
pub fn parse_param_schema(raw: Option<&Value>) -> Result<ParamSchema, String> {
    match raw {
        None | Some(Value::Null) => Ok(ParamSchema::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| format!("Esquema de parâmetros inválido: {e}")),
    }
}

pub fn parse_default_params(raw: Option<&Value>) -> Map<String, Value> {
    match raw {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

// Linha de `graficos_dashboard`, somente leitura para o engine.
#[derive(Debug, Clone, FromRow)]
pub struct ChartRow {
    pub id: i64,
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub query_template: Option<String>,
    pub param_schema: Option<Value>,
    pub default_params: Option<Value>,
    pub result_shape: Option<Value>,
    pub allowed_roles: Option<Vec<String>>,
    pub is_active: bool,
}

// Linha de `dashboard_tables`: mesmo formato, mais a configuração de colunas
// e a chave primária exibidas pelo cliente.
#[derive(Debug, Clone, FromRow)]
pub struct TableRow {
    pub id: i64,
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub query_template: Option<String>,
    pub column_config: Option<Value>,
    pub param_schema: Option<Value>,
    pub default_params: Option<Value>,
    pub result_shape: Option<Value>,
    pub allowed_roles: Option<Vec<String>>,
    pub primary_key: Option<String>,
    pub is_active: bool,
}

// Payload do POST /manageGraph. Com `id` atualiza, sem `id` insere.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ManageGraphPayload {
    pub id: Option<i64>,
    #[validate(length(min = 1, message = "slug é obrigatório."))]
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "query_template é obrigatório."))]
    pub query_template: String,
    pub param_schema: Option<Value>,
    pub default_params: Option<Value>,
    pub result_shape: Option<Value>,
    pub allowed_roles: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ManageTablePayload {
    pub id: Option<i64>,
    #[validate(length(min = 1, message = "slug é obrigatório."))]
    pub slug: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "query_template é obrigatório."))]
    pub query_template: String,
    pub column_config: Option<Value>,
    pub param_schema: Option<Value>,
    pub default_params: Option<Value>,
    pub result_shape: Option<Value>,
    pub allowed_roles: Option<Vec<String>>,
    pub primary_key: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManageResponse {
    pub message: String,
    pub id: i64,
    pub slug: String,
    pub company_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn esquema_de_parametros_decodifica_campos_opcionais() {
        let raw = json!({
            "inicio": { "type": "date", "required": true },
            "status": { "type": "array", "items": { "type": "string", "enum": ["a", "b"] } },
            "limite": { "type": "number", "minimum": 1, "maximum": 500, "default": 50 }
        });
        let schema = parse_param_schema(Some(&raw)).unwrap();
        assert_eq!(schema.len(), 3);
        assert!(schema["inicio"].required);
        assert_eq!(schema["limite"].param_type, ParamType::Number);
        let items = schema["status"].items.as_ref().unwrap();
        assert_eq!(items.allowed.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn esquema_malformado_vira_erro_de_texto() {
        let raw = json!({ "x": { "type": "matrix" } });
        let err = parse_param_schema(Some(&raw)).unwrap_err();
        assert!(err.starts_with("Esquema de parâmetros inválido"));
    }

    #[test]
    fn esquema_ausente_vira_mapa_vazio() {
        assert!(parse_param_schema(None).unwrap().is_empty());
        assert!(parse_param_schema(Some(&Value::Null)).unwrap().is_empty());
    }
}
