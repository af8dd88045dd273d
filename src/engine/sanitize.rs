// src/engine/sanitize.rs

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};
use uuid::Uuid;

// Maior inteiro representável sem perda em um double de JSON (2^53 - 1).
const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

// Normaliza uma linha de resultado para formas seguras em JSON: inteiros de
// 64 bits fora da faixa segura viram string decimal, datas e timestamps
// viram ISO-8601, arrays e json aninhado são percorridos estruturalmente.
// Uma coluna que não consegue ser decodificada vira null, nunca erro.
pub fn sanitize_row(row: &PgRow) -> Map<String, Value> {
    let mut out = Map::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.type_info().name()).unwrap_or_else(|e| {
            tracing::warn!(
                "Coluna '{}' ({}) não decodificada: {e}",
                column.name(),
                column.type_info().name()
            );
            Value::Null
        });
        out.insert(column.name().to_string(), value);
    }
    out
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    if let Some(base) = type_name.strip_suffix("[]") {
        return decode_array(row, index, base);
    }

    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| Value::Number(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| Value::Number(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(safe_int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| float_value(v as f64)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(float_value),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)?
            .map(decimal_value),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "CITEXT" => row
            .try_get::<Option<String>, _>(index)?
            .map(Value::String),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|ts| Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|t| Value::String(t.to_string())),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)?
            .map(|u| Value::String(u.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(index)?
            .map(sanitize_json),
        // tipos fora do mapa tentam a via textual
        _ => row.try_get::<Option<String>, _>(index)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode_array(row: &PgRow, index: usize, base: &str) -> Result<Value, sqlx::Error> {
    let value = match base {
        "BOOL" => row
            .try_get::<Option<Vec<bool>>, _>(index)?
            .map(|v| Value::Array(v.into_iter().map(Value::Bool).collect())),
        "INT2" => row
            .try_get::<Option<Vec<i16>>, _>(index)?
            .map(|v| Value::Array(v.into_iter().map(|n| Value::Number(n.into())).collect())),
        "INT4" => row
            .try_get::<Option<Vec<i32>>, _>(index)?
            .map(|v| Value::Array(v.into_iter().map(|n| Value::Number(n.into())).collect())),
        "INT8" => row
            .try_get::<Option<Vec<i64>>, _>(index)?
            .map(|v| Value::Array(v.into_iter().map(safe_int).collect())),
        "FLOAT8" => row
            .try_get::<Option<Vec<f64>>, _>(index)?
            .map(|v| Value::Array(v.into_iter().map(float_value).collect())),
        "NUMERIC" => row
            .try_get::<Option<Vec<Decimal>>, _>(index)?
            .map(|v| Value::Array(v.into_iter().map(decimal_value).collect())),
        "UUID" => row
            .try_get::<Option<Vec<Uuid>>, _>(index)?
            .map(|v| {
                Value::Array(v.into_iter().map(|u| Value::String(u.to_string())).collect())
            }),
        "DATE" => row
            .try_get::<Option<Vec<NaiveDate>>, _>(index)?
            .map(|v| {
                Value::Array(
                    v.into_iter()
                        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                        .collect(),
                )
            }),
        _ => row
            .try_get::<Option<Vec<String>>, _>(index)?
            .map(|v| Value::Array(v.into_iter().map(Value::String).collect())),
    };
    Ok(value.unwrap_or(Value::Null))
}

// Inteiro de 64 bits: dentro da faixa segura de JSON sai número, fora sai
// string decimal para não perder dígitos no cliente.
pub(crate) fn safe_int(value: i64) -> Value {
    if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
        Value::Number(value.into())
    } else {
        Value::String(value.to_string())
    }
}

pub(crate) fn float_value(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// NUMERIC inteiro e seguro sai como número; o resto preserva os dígitos em
// string, o mesmo contrato que os drivers JSON dão para a coluna.
pub(crate) fn decimal_value(value: Decimal) -> Value {
    if value.is_integer() {
        if let Some(int) = value.to_i64() {
            return safe_int(int);
        }
    }
    Value::String(value.normalize().to_string())
}

// JSON vindo do banco já é JSON; só garante que números aninhados absurdos
// não passem adiante como null silencioso.
pub(crate) fn sanitize_json(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_json(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inteiros_na_faixa_segura_sao_numeros() {
        assert_eq!(safe_int(42), Value::Number(42.into()));
        assert_eq!(safe_int(MAX_SAFE_INTEGER), Value::Number(MAX_SAFE_INTEGER.into()));
        assert_eq!(safe_int(-MAX_SAFE_INTEGER), Value::Number((-MAX_SAFE_INTEGER).into()));
    }

    #[test]
    fn inteiros_fora_da_faixa_viram_string() {
        assert_eq!(
            safe_int(MAX_SAFE_INTEGER + 1),
            Value::String("9007199254740992".to_string())
        );
        assert_eq!(safe_int(i64::MIN), Value::String(i64::MIN.to_string()));
    }

    #[test]
    fn numeric_inteiro_vira_numero_e_fracionario_vira_string() {
        assert_eq!(decimal_value(Decimal::new(1500, 0)), Value::Number(1500.into()));
        assert_eq!(
            decimal_value(Decimal::new(12345, 2)),
            Value::String("123.45".to_string())
        );
        // zeros à direita normalizados
        assert_eq!(
            decimal_value(Decimal::new(12300, 2)),
            Value::Number(123.into())
        );
    }

    #[test]
    fn json_aninhado_e_percorrido_estruturalmente() {
        let input = serde_json::json!({
            "a": [1, {"b": "x"}],
            "c": {"d": null}
        });
        assert_eq!(sanitize_json(input.clone()), input);
    }
}
