// src/engine/params.rs

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};

use crate::{
    common::error::AppError,
    models::metadata::{ItemsSchema, ParamSchema, ParamSchemaEntry, ParamType},
};

// Valor de parâmetro já validado, pronto para ser vinculado posicionalmente
// ao prepared statement. Variante etiquetada em vez de JSON dinâmico: o
// executor precisa saber o tipo SQL de cada argumento.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    TextArray(Vec<String>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    BoolArray(Vec<bool>),
}

impl ParamValue {
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ParamValue::TextArray(_)
                | ParamValue::IntArray(_)
                | ParamValue::FloatArray(_)
                | ParamValue::BoolArray(_)
        )
    }

    // Representação JSON para `debug.args` e comparações de enum.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Text(v) => Value::String(v.clone()),
            ParamValue::Int(v) => Value::Number((*v).into()),
            ParamValue::Float(v) => Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ParamValue::Bool(v) => Value::Bool(*v),
            ParamValue::Date(v) => Value::String(v.format("%Y-%m-%d").to_string()),
            ParamValue::TextArray(v) => {
                Value::Array(v.iter().map(|s| Value::String(s.clone())).collect())
            }
            ParamValue::IntArray(v) => {
                Value::Array(v.iter().map(|n| Value::Number((*n).into())).collect())
            }
            ParamValue::FloatArray(v) => Value::Array(
                v.iter()
                    .map(|n| {
                        Number::from_f64(*n)
                            .map(Value::Number)
                            .unwrap_or(Value::Null)
                    })
                    .collect(),
            ),
            ParamValue::BoolArray(v) => Value::Array(v.iter().map(|b| Value::Bool(*b)).collect()),
        }
    }
}

impl ParamValue {
    // Vincula o valor ao prepared statement preservando o tipo SQL.
    pub fn bind_to<'q>(
        &self,
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        match self {
            ParamValue::Text(v) => query.bind(v.clone()),
            ParamValue::Int(v) => query.bind(*v),
            ParamValue::Float(v) => query.bind(*v),
            ParamValue::Bool(v) => query.bind(*v),
            ParamValue::Date(v) => query.bind(*v),
            ParamValue::TextArray(v) => query.bind(v.clone()),
            ParamValue::IntArray(v) => query.bind(v.clone()),
            ParamValue::FloatArray(v) => query.bind(v.clone()),
            ParamValue::BoolArray(v) => query.bind(v.clone()),
        }
    }
}

pub type ResolvedParams = HashMap<String, ParamValue>;

// Resolve o bundle efetivo de parâmetros de uma consulta.
//
// Para cada nome declarado no esquema a precedência é: valor enviado pelo
// cliente > default da linha de metadados > default literal da entrada >
// auto-default por tipo. Parâmetros enviados fora do esquema passam direto,
// com warning. `today` é injetado para manter os defaults de data
// determinísticos em teste.
pub fn resolve_params(
    schema: &ParamSchema,
    defaults: &Map<String, Value>,
    provided: &Map<String, Value>,
    today: NaiveDate,
) -> Result<ResolvedParams, AppError> {
    let mut resolved = ResolvedParams::new();

    for (name, entry) in schema {
        let chosen = pick_non_null(provided.get(name))
            .or_else(|| pick_non_null(defaults.get(name)))
            .or_else(|| pick_non_null(entry.default.as_ref()));

        let value = match chosen {
            Some(raw) => Some(coerce_value(name, entry, raw)?),
            None => auto_default(name, entry, today),
        };

        match value {
            Some(v) => {
                resolved.insert(name.clone(), v);
            }
            None if entry.required => {
                return Err(AppError::Validation(format!(
                    "Parâmetro obrigatório ausente: {name}"
                )));
            }
            None => {}
        }
    }

    for (name, value) in provided {
        if schema.contains_key(name) || value.is_null() {
            continue;
        }
        tracing::warn!("Parâmetro extra '{name}' repassado sem validação");
        resolved.insert(name.clone(), json_to_param(value));
    }

    Ok(resolved)
}

fn pick_non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

// Auto-default por tipo. Datas acopladas ao nome do parâmetro são um
// comportamento herdado do produto: janelas "início/fim" ganham 30 dias.
fn auto_default(name: &str, entry: &ParamSchemaEntry, today: NaiveDate) -> Option<ParamValue> {
    match entry.param_type {
        ParamType::Date => {
            let lower = name.to_lowercase();
            let date = if ["inicio", "início", "start", "begin"]
                .iter()
                .any(|hint| lower.contains(hint))
            {
                today - Duration::days(30)
            } else {
                // cobre também os nomes "fim|final|end"
                today
            };
            Some(ParamValue::Date(date))
        }
        ParamType::Number => {
            if let Some(min) = entry.minimum {
                Some(number_value(min))
            } else if let Some(max) = entry.maximum.filter(|m| *m < 1000.0) {
                Some(number_value(max))
            } else {
                Some(ParamValue::Int(0))
            }
        }
        ParamType::Array => {
            let items = entry.items.as_ref()?;
            let allowed = items.allowed.as_ref().filter(|e| !e.is_empty())?;
            build_array(name, items, allowed.clone()).ok()
        }
        ParamType::String | ParamType::Boolean => None,
    }
}

fn number_value(n: f64) -> ParamValue {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        ParamValue::Int(n as i64)
    } else {
        ParamValue::Float(n)
    }
}

fn coerce_value(name: &str, entry: &ParamSchemaEntry, raw: &Value) -> Result<ParamValue, AppError> {
    match entry.param_type {
        ParamType::Number => {
            let value = coerce_number(name, raw)?;
            check_range(name, value_as_f64(&value), entry.minimum, entry.maximum)?;
            check_enum(name, &value.to_json(), entry.allowed.as_deref())?;
            Ok(value)
        }
        ParamType::Date => coerce_date(name, raw),
        ParamType::Boolean => coerce_bool(name, raw),
        ParamType::String => {
            let value = stringify(raw);
            check_enum(name, &Value::String(value.clone()), entry.allowed.as_deref())?;
            Ok(ParamValue::Text(value))
        }
        ParamType::Array => {
            let elements = match raw {
                Value::Array(items) => items.clone(),
                Value::String(s) if !s.trim().is_empty() => s
                    .split(',')
                    .map(|part| Value::String(part.trim().to_string()))
                    .collect(),
                _ => {
                    return Err(AppError::Validation(format!(
                        "Parâmetro '{name}' deve ser uma lista."
                    )))
                }
            };
            let items = entry.items.clone().unwrap_or(ItemsSchema {
                item_type: None,
                allowed: None,
                minimum: None,
                maximum: None,
            });
            build_array(name, &items, elements)
        }
    }
}

fn coerce_number(name: &str, raw: &Value) -> Result<ParamValue, AppError> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ParamValue::Int(i))
            } else {
                Ok(ParamValue::Float(n.as_f64().unwrap_or_default()))
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(ParamValue::Int(i))
            } else if let Ok(f) = trimmed.parse::<f64>() {
                Ok(ParamValue::Float(f))
            } else {
                Err(AppError::Validation(format!(
                    "Parâmetro '{name}' deve ser numérico."
                )))
            }
        }
        _ => Err(AppError::Validation(format!(
            "Parâmetro '{name}' deve ser numérico."
        ))),
    }
}

fn coerce_date(name: &str, raw: &Value) -> Result<ParamValue, AppError> {
    let invalid = || AppError::Validation(format!("Parâmetro '{name}' não é uma data válida."));

    match raw {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                return Ok(ParamValue::Date(date));
            }
            if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
                return Ok(ParamValue::Date(ts.date_naive()));
            }
            if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
                return Ok(ParamValue::Date(ts.date()));
            }
            Err(invalid())
        }
        // epoch em milissegundos
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|ts| ParamValue::Date(ts.date_naive()))
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn coerce_bool(name: &str, raw: &Value) -> Result<ParamValue, AppError> {
    match raw {
        Value::Bool(b) => Ok(ParamValue::Bool(*b)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(ParamValue::Bool(true)),
            "false" | "0" => Ok(ParamValue::Bool(false)),
            _ => Err(AppError::Validation(format!(
                "Parâmetro '{name}' não é um booleano válido."
            ))),
        },
        Value::Number(n) => Ok(ParamValue::Bool(n.as_f64().unwrap_or(0.0) != 0.0)),
        _ => Err(AppError::Validation(format!(
            "Parâmetro '{name}' não é um booleano válido."
        ))),
    }
}

fn stringify(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn check_range(
    name: &str,
    value: f64,
    minimum: Option<f64>,
    maximum: Option<f64>,
) -> Result<(), AppError> {
    if let Some(min) = minimum {
        if value < min {
            return Err(AppError::Validation(format!(
                "Parâmetro '{name}' abaixo do mínimo permitido ({min})."
            )));
        }
    }
    if let Some(max) = maximum {
        if value > max {
            return Err(AppError::Validation(format!(
                "Parâmetro '{name}' acima do máximo permitido ({max})."
            )));
        }
    }
    Ok(())
}

fn check_enum(name: &str, value: &Value, allowed: Option<&[Value]>) -> Result<(), AppError> {
    let Some(allowed) = allowed.filter(|list| !list.is_empty()) else {
        return Ok(());
    };
    let matches = allowed.iter().any(|candidate| match (candidate, value) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    });
    if matches {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Valor inválido para o parâmetro '{name}'."
        )))
    }
}

fn value_as_f64(value: &ParamValue) -> f64 {
    match value {
        ParamValue::Int(i) => *i as f64,
        ParamValue::Float(f) => *f,
        _ => 0.0,
    }
}

// Valida cada elemento contra o subesquema `items` e monta o array tipado
// que o driver vincula como um único parâmetro posicional.
fn build_array(
    name: &str,
    items: &ItemsSchema,
    elements: Vec<Value>,
) -> Result<ParamValue, AppError> {
    match items.item_type {
        Some(ParamType::Number) => {
            let mut parsed = Vec::with_capacity(elements.len());
            for element in &elements {
                let value = coerce_number(name, element)?;
                check_range(name, value_as_f64(&value), items.minimum, items.maximum)?;
                check_enum(name, &value.to_json(), items.allowed.as_deref())?;
                parsed.push(value);
            }
            if parsed.iter().all(|v| matches!(v, ParamValue::Int(_))) {
                Ok(ParamValue::IntArray(
                    parsed
                        .into_iter()
                        .map(|v| match v {
                            ParamValue::Int(i) => i,
                            _ => unreachable!(),
                        })
                        .collect(),
                ))
            } else {
                Ok(ParamValue::FloatArray(
                    parsed.into_iter().map(|v| value_as_f64(&v)).collect(),
                ))
            }
        }
        Some(ParamType::Boolean) => {
            let mut parsed = Vec::with_capacity(elements.len());
            for element in &elements {
                match coerce_bool(name, element)? {
                    ParamValue::Bool(b) => parsed.push(b),
                    _ => unreachable!(),
                }
            }
            Ok(ParamValue::BoolArray(parsed))
        }
        // string, date ou ausente: elementos viajam como texto
        _ => {
            let mut parsed = Vec::with_capacity(elements.len());
            for element in &elements {
                let text = stringify(element);
                check_enum(name, &Value::String(text.clone()), items.allowed.as_deref())?;
                parsed.push(text);
            }
            Ok(ParamValue::TextArray(parsed))
        }
    }
}

// Conversão de melhor esforço para parâmetros fora do esquema.
fn json_to_param(value: &Value) -> ParamValue {
    match value {
        Value::String(s) => ParamValue::Text(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ParamValue::Int(i)
            } else {
                ParamValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        Value::Bool(b) => ParamValue::Bool(*b),
        Value::Array(items) => {
            if items.iter().all(|v| v.is_i64()) {
                ParamValue::IntArray(items.iter().filter_map(Value::as_i64).collect())
            } else if items.iter().all(Value::is_number) {
                ParamValue::FloatArray(items.iter().filter_map(Value::as_f64).collect())
            } else {
                ParamValue::TextArray(items.iter().map(stringify).collect())
            }
        }
        other => ParamValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_from(value: Value) -> ParamSchema {
        serde_json::from_value(value).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn datas_sem_valor_ganham_janela_de_30_dias() {
        let schema = schema_from(json!({
            "start": { "type": "date" },
            "end": { "type": "date" }
        }));
        let resolved =
            resolve_params(&schema, &Map::new(), &Map::new(), today()).unwrap();
        assert_eq!(
            resolved["start"],
            ParamValue::Date(NaiveDate::from_ymd_opt(2024, 12, 16).unwrap())
        );
        assert_eq!(
            resolved["end"],
            ParamValue::Date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
        );
    }

    #[test]
    fn nomes_em_portugues_tambem_ativam_a_janela() {
        let schema = schema_from(json!({
            "data_inicio": { "type": "date" },
            "data_fim": { "type": "date" },
            "referencia": { "type": "date" }
        }));
        let resolved =
            resolve_params(&schema, &Map::new(), &Map::new(), today()).unwrap();
        assert_eq!(
            resolved["data_inicio"],
            ParamValue::Date(NaiveDate::from_ymd_opt(2024, 12, 16).unwrap())
        );
        assert_eq!(resolved["data_fim"], ParamValue::Date(today()));
        assert_eq!(resolved["referencia"], ParamValue::Date(today()));
    }

    #[test]
    fn obrigatorio_sem_valor_e_sem_default_falha() {
        let schema = schema_from(json!({
            "company": { "type": "string", "required": true }
        }));
        let err = resolve_params(&schema, &Map::new(), &Map::new(), today()).unwrap_err();
        assert_eq!(err.to_string(), "Parâmetro obrigatório ausente: company");
    }

    #[test]
    fn precedencia_cliente_sobre_defaults() {
        let schema = schema_from(json!({
            "limite": { "type": "number", "default": 10 }
        }));
        let mut defaults = Map::new();
        defaults.insert("limite".into(), json!(25));
        let mut provided = Map::new();
        provided.insert("limite".into(), json!("50"));

        let resolved = resolve_params(&schema, &defaults, &provided, today()).unwrap();
        assert_eq!(resolved["limite"], ParamValue::Int(50));

        let resolved = resolve_params(&schema, &defaults, &Map::new(), today()).unwrap();
        assert_eq!(resolved["limite"], ParamValue::Int(25));

        let resolved = resolve_params(&schema, &Map::new(), &Map::new(), today()).unwrap();
        assert_eq!(resolved["limite"], ParamValue::Int(10));
    }

    #[test]
    fn numero_auto_default_segue_minimo_maximo_e_zero() {
        let schema = schema_from(json!({
            "a": { "type": "number", "minimum": 5 },
            "b": { "type": "number", "maximum": 100 },
            "c": { "type": "number", "maximum": 5000 },
            "d": { "type": "number" }
        }));
        let resolved =
            resolve_params(&schema, &Map::new(), &Map::new(), today()).unwrap();
        assert_eq!(resolved["a"], ParamValue::Int(5));
        assert_eq!(resolved["b"], ParamValue::Int(100));
        assert_eq!(resolved["c"], ParamValue::Int(0));
        assert_eq!(resolved["d"], ParamValue::Int(0));
    }

    #[test]
    fn numero_fora_do_intervalo_falha() {
        let schema = schema_from(json!({
            "limite": { "type": "number", "minimum": 1, "maximum": 100 }
        }));
        let mut provided = Map::new();
        provided.insert("limite".into(), json!(500));
        let err = resolve_params(&schema, &Map::new(), &provided, today()).unwrap_err();
        assert!(err.to_string().contains("acima do máximo"));
    }

    #[test]
    fn string_numerica_e_aceita_como_numero() {
        let schema = schema_from(json!({ "limite": { "type": "number" } }));
        let mut provided = Map::new();
        provided.insert("limite".into(), json!("3.5"));
        let resolved = resolve_params(&schema, &Map::new(), &provided, today()).unwrap();
        assert_eq!(resolved["limite"], ParamValue::Float(3.5));
    }

    #[test]
    fn booleanos_aceitam_as_formas_do_contrato() {
        let schema = schema_from(json!({ "ativo": { "type": "boolean" } }));
        for (raw, expected) in [
            (json!(true), true),
            (json!("TRUE"), true),
            (json!("1"), true),
            (json!(2), true),
            (json!("false"), false),
            (json!(0), false),
        ] {
            let mut provided = Map::new();
            provided.insert("ativo".into(), raw);
            let resolved = resolve_params(&schema, &Map::new(), &provided, today()).unwrap();
            assert_eq!(resolved["ativo"], ParamValue::Bool(expected));
        }
    }

    #[test]
    fn array_aceita_string_separada_por_virgula() {
        let schema = schema_from(json!({
            "status": { "type": "array", "items": { "type": "string" } }
        }));
        let mut provided = Map::new();
        provided.insert("status".into(), json!("aberto, fechado ,pendente"));
        let resolved = resolve_params(&schema, &Map::new(), &provided, today()).unwrap();
        assert_eq!(
            resolved["status"],
            ParamValue::TextArray(vec![
                "aberto".into(),
                "fechado".into(),
                "pendente".into()
            ])
        );
    }

    #[test]
    fn array_de_numeros_valida_elementos() {
        let schema = schema_from(json!({
            "ids": { "type": "array", "items": { "type": "number", "minimum": 1 } }
        }));
        let mut provided = Map::new();
        provided.insert("ids".into(), json!([1, 2, 3]));
        let resolved = resolve_params(&schema, &Map::new(), &provided, today()).unwrap();
        assert_eq!(resolved["ids"], ParamValue::IntArray(vec![1, 2, 3]));

        provided.insert("ids".into(), json!([1, 0]));
        let err = resolve_params(&schema, &Map::new(), &provided, today()).unwrap_err();
        assert!(err.to_string().contains("abaixo do mínimo"));
    }

    #[test]
    fn array_auto_default_vem_do_enum_dos_items() {
        let schema = schema_from(json!({
            "status": {
                "type": "array",
                "items": { "type": "string", "enum": ["aberto", "fechado"] }
            }
        }));
        let resolved =
            resolve_params(&schema, &Map::new(), &Map::new(), today()).unwrap();
        assert_eq!(
            resolved["status"],
            ParamValue::TextArray(vec!["aberto".into(), "fechado".into()])
        );
    }

    #[test]
    fn enum_de_string_rejeita_valor_desconhecido() {
        let schema = schema_from(json!({
            "ordem": { "type": "string", "enum": ["asc", "desc"] }
        }));
        let mut provided = Map::new();
        provided.insert("ordem".into(), json!("random"));
        let err = resolve_params(&schema, &Map::new(), &provided, today()).unwrap_err();
        assert!(err.to_string().contains("Valor inválido"));
    }

    #[test]
    fn data_aceita_iso_e_timestamp() {
        let schema = schema_from(json!({ "corte": { "type": "date" } }));
        for raw in [
            json!("2024-06-01"),
            json!("2024-06-01T10:30:00Z"),
            json!("2024-06-01 10:30:00"),
        ] {
            let mut provided = Map::new();
            provided.insert("corte".into(), raw);
            let resolved = resolve_params(&schema, &Map::new(), &provided, today()).unwrap();
            assert_eq!(
                resolved["corte"],
                ParamValue::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
            );
        }
    }

    #[test]
    fn parametros_extras_passam_direto() {
        let schema = schema_from(json!({ "limite": { "type": "number" } }));
        let mut provided = Map::new();
        provided.insert("livre".into(), json!("qualquer coisa"));
        let resolved = resolve_params(&schema, &Map::new(), &provided, today()).unwrap();
        assert_eq!(
            resolved["livre"],
            ParamValue::Text("qualquer coisa".into())
        );
        // o declarado continua recebendo auto-default
        assert_eq!(resolved["limite"], ParamValue::Int(0));
    }
}
