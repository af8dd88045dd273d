// src/engine/template.rs

use std::collections::{HashMap, HashSet};

use crate::{
    common::error::AppError,
    engine::params::{ParamValue, ResolvedParams},
    models::metadata::{ParamSchema, ParamType},
};

// Saída do compilador: corpo com placeholders posicionais `$k` e a lista de
// argumentos na mesma ordem. Valores de usuário jamais entram no texto.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub text: String,
    pub args: Vec<ParamValue>,
}

// Compila um template `{{nome}}` em prepared statement.
//
// Marcadores repetidos do mesmo nome reutilizam o mesmo índice posicional.
// Depois da substituição, placeholders de parâmetros array reescrevem
// `IN (...)` para `= ANY(...)` e `NOT IN (...)` para `<> ALL(...)`, o que
// permite ao autor escrever SQL natural enquanto o driver vincula o array
// como um único argumento.
pub fn compile(
    template: &str,
    params: &ResolvedParams,
    schema: &ParamSchema,
) -> Result<PreparedQuery, AppError> {
    let mut text = String::with_capacity(template.len());
    let mut args: Vec<ParamValue> = Vec::new();
    let mut indices: HashMap<String, usize> = HashMap::new();
    let mut array_indices: HashSet<usize> = HashSet::new();

    let mut remaining = template;
    loop {
        match remaining.find("{{") {
            None => {
                text.push_str(remaining);
                break;
            }
            Some(start) => {
                text.push_str(&remaining[..start]);
                let after = &remaining[start + 2..];
                match after.find("}}") {
                    None => {
                        // marcador sem fechamento: segue como texto literal
                        text.push_str(&remaining[start..]);
                        break;
                    }
                    Some(end) => {
                        let name = after[..end].trim();
                        let index = match indices.get(name) {
                            Some(k) => *k,
                            None => {
                                let value = params.get(name).ok_or_else(|| {
                                    AppError::Template(format!(
                                        "Parâmetro '{name}' não foi informado"
                                    ))
                                })?;
                                args.push(value.clone());
                                let k = args.len();
                                let is_array = schema
                                    .get(name)
                                    .map(|e| e.param_type == ParamType::Array)
                                    .unwrap_or(false)
                                    || value.is_array();
                                if is_array {
                                    array_indices.insert(k);
                                }
                                indices.insert(name.to_string(), k);
                                k
                            }
                        };
                        text.push('$');
                        text.push_str(&index.to_string());
                        remaining = &after[end + 2..];
                    }
                }
            }
        }
    }

    for name in params.keys() {
        if !indices.contains_key(name.as_str()) {
            tracing::debug!("Parâmetro '{name}' não referenciado pelo template");
        }
    }

    Ok(PreparedQuery {
        text: rewrite_array_operators(&text, &array_indices),
        args,
    })
}

// Reescreve `[NOT] IN ( $k [::cast] )` quando `$k` é um array. A busca é
// insensível a caixa, tolera espaços e preserva o sufixo de cast verbatim.
// Aplicada duas vezes produz o mesmo texto: `ANY`/`ALL` não casam com `IN`.
pub(crate) fn rewrite_array_operators(text: &str, array_indices: &HashSet<usize>) -> String {
    let bytes = text.as_bytes();
    let mut replacements: Vec<(std::ops::Range<usize>, String)> = Vec::new();

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        let digits_start = i + 1;
        let mut digits_end = digits_start;
        while digits_end < bytes.len() && bytes[digits_end].is_ascii_digit() {
            digits_end += 1;
        }
        if digits_end == digits_start {
            i += 1;
            continue;
        }
        let index: usize = match text[digits_start..digits_end].parse() {
            Ok(k) => k,
            Err(_) => {
                i = digits_end;
                continue;
            }
        };
        if !array_indices.contains(&index) {
            i = digits_end;
            continue;
        }

        // sufixo de cast colado ao placeholder (ex.: `::int[]`)
        let mut cast_end = digits_end;
        if bytes[cast_end..].starts_with(b"::") {
            let mut k = cast_end + 2;
            while k < bytes.len()
                && (bytes[k].is_ascii_alphanumeric() || matches!(bytes[k], b'_' | b'[' | b']'))
            {
                k += 1;
            }
            if k > cast_end + 2 {
                cast_end = k;
            }
        }

        // ')' à frente
        let mut close = cast_end;
        while close < bytes.len() && bytes[close].is_ascii_whitespace() {
            close += 1;
        }
        if close >= bytes.len() || bytes[close] != b')' {
            i = digits_end;
            continue;
        }

        // '(' atrás
        let mut p = i;
        while p > 0 && bytes[p - 1].is_ascii_whitespace() {
            p -= 1;
        }
        if p == 0 || bytes[p - 1] != b'(' {
            i = digits_end;
            continue;
        }
        let open = p - 1;

        // palavra `IN` antes do '('
        let mut q = open;
        while q > 0 && bytes[q - 1].is_ascii_whitespace() {
            q -= 1;
        }
        let in_end = q;
        let mut in_start = q;
        while in_start > 0
            && (bytes[in_start - 1].is_ascii_alphanumeric() || bytes[in_start - 1] == b'_')
        {
            in_start -= 1;
        }
        if !text[in_start..in_end].eq_ignore_ascii_case("in") {
            i = digits_end;
            continue;
        }

        // `NOT` opcional antes do `IN`
        let mut r = in_start;
        while r > 0 && bytes[r - 1].is_ascii_whitespace() {
            r -= 1;
        }
        let prev_end = r;
        let mut prev_start = r;
        while prev_start > 0
            && (bytes[prev_start - 1].is_ascii_alphanumeric() || bytes[prev_start - 1] == b'_')
        {
            prev_start -= 1;
        }
        let negated = text[prev_start..prev_end].eq_ignore_ascii_case("not");

        let placeholder = &text[i..digits_end];
        let cast = &text[digits_end..cast_end];
        let (start, replacement) = if negated {
            (prev_start, format!("<> ALL({placeholder}{cast})"))
        } else {
            (in_start, format!("= ANY({placeholder}{cast})"))
        };
        replacements.push((start..close + 1, replacement));
        i = close + 1;
    }

    let mut out = text.to_string();
    for (range, replacement) in replacements.into_iter().rev() {
        out.replace_range(range, &replacement);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_from(value: serde_json::Value) -> ParamSchema {
        serde_json::from_value(value).unwrap()
    }

    fn params_from(pairs: Vec<(&str, ParamValue)>) -> ResolvedParams {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn substitui_marcadores_por_placeholders_posicionais() {
        let params = params_from(vec![
            ("inicio", ParamValue::Text("2024-01-01".into())),
            ("fim", ParamValue::Text("2024-02-01".into())),
        ]);
        let prepared = compile(
            "SELECT * FROM vendas WHERE data BETWEEN {{inicio}} AND {{ fim }}",
            &params,
            &ParamSchema::new(),
        )
        .unwrap();
        assert_eq!(
            prepared.text,
            "SELECT * FROM vendas WHERE data BETWEEN $1 AND $2"
        );
        assert_eq!(prepared.args.len(), 2);
        assert!(!prepared.text.contains("{{"));
    }

    #[test]
    fn marcador_repetido_reutiliza_o_mesmo_indice() {
        let params = params_from(vec![("d", ParamValue::Text("x".into()))]);
        let prepared = compile("SELECT {{d}}, {{d}}, {{d}}", &params, &ParamSchema::new()).unwrap();
        assert_eq!(prepared.text, "SELECT $1, $1, $1");
        assert_eq!(prepared.args.len(), 1);
    }

    #[test]
    fn parametro_ausente_tem_mensagem_exata() {
        let err = compile("SELECT {{x}}", &ResolvedParams::new(), &ParamSchema::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "Parâmetro 'x' não foi informado");
    }

    #[test]
    fn valor_de_usuario_nunca_entra_no_texto() {
        let hostile = "'; DROP TABLE x;--";
        let params = params_from(vec![("nome", ParamValue::Text(hostile.into()))]);
        let prepared = compile(
            "SELECT * FROM clientes WHERE nome = {{nome}}",
            &params,
            &ParamSchema::new(),
        )
        .unwrap();
        assert!(!prepared.text.contains("DROP"));
        assert!(!prepared.text.contains(';'));
        assert_eq!(prepared.args[0], ParamValue::Text(hostile.into()));
    }

    #[test]
    fn array_em_in_vira_any() {
        let schema = schema_from(json!({
            "statuses": { "type": "array", "items": { "type": "string" } }
        }));
        let params = params_from(vec![(
            "statuses",
            ParamValue::TextArray(vec!["a".into(), "b".into()]),
        )]);
        let prepared = compile(
            "SELECT * FROM r WHERE status IN ({{statuses}})",
            &params,
            &schema,
        )
        .unwrap();
        assert_eq!(prepared.text, "SELECT * FROM r WHERE status = ANY($1)");
        assert_eq!(
            prepared.args,
            vec![ParamValue::TextArray(vec!["a".into(), "b".into()])]
        );
    }

    #[test]
    fn array_em_not_in_com_cast_vira_all() {
        let schema = schema_from(json!({
            "ids": { "type": "array", "items": { "type": "number" } }
        }));
        let params = params_from(vec![("ids", ParamValue::IntArray(vec![1, 2]))]);
        let prepared = compile(
            "SELECT * FROM reservas WHERE quarto_id NOT IN ({{ids}}::int[])",
            &params,
            &schema,
        )
        .unwrap();
        assert_eq!(
            prepared.text,
            "SELECT * FROM reservas WHERE quarto_id <> ALL($1::int[])"
        );
    }

    #[test]
    fn reescrita_tolera_caixa_e_espacos() {
        let mut arrays = HashSet::new();
        arrays.insert(1);
        let out = rewrite_array_operators("WHERE x not   In  ( $1 )", &arrays);
        assert_eq!(out, "WHERE x <> ALL($1)");
    }

    #[test]
    fn reescrita_e_idempotente() {
        let mut arrays = HashSet::new();
        arrays.insert(1);
        arrays.insert(2);
        let original = "a IN ($1) AND b NOT IN ($2::text[]) AND c IN ($3)";
        let once = rewrite_array_operators(original, &arrays);
        let twice = rewrite_array_operators(&once, &arrays);
        assert_eq!(once, "a = ANY($1) AND b <> ALL($2::text[]) AND c IN ($3)");
        assert_eq!(once, twice);
    }

    #[test]
    fn placeholder_escalar_em_in_nao_e_reescrito() {
        let params = params_from(vec![("s", ParamValue::Text("aberto".into()))]);
        let prepared = compile(
            "SELECT * FROM r WHERE status IN ({{s}})",
            &params,
            &ParamSchema::new(),
        )
        .unwrap();
        assert_eq!(prepared.text, "SELECT * FROM r WHERE status IN ($1)");
    }

    #[test]
    fn valor_lista_sem_esquema_tambem_reescreve() {
        let params = params_from(vec![(
            "ids",
            ParamValue::IntArray(vec![7, 9]),
        )]);
        let prepared = compile(
            "DELETE FROM fila WHERE id IN ({{ids}})",
            &params,
            &ParamSchema::new(),
        )
        .unwrap();
        assert_eq!(prepared.text, "DELETE FROM fila WHERE id = ANY($1)");
    }

    #[test]
    fn indice_nao_confunde_prefixos() {
        // $1 é array, $12 não é: o scanner não pode tratar "$12" como "$1"
        let mut arrays = HashSet::new();
        arrays.insert(1);
        let out = rewrite_array_operators("a IN ($12) AND b IN ($1)", &arrays);
        assert_eq!(out, "a IN ($12) AND b = ANY($1)");
    }

    #[test]
    fn parametro_nao_referenciado_e_aceito() {
        let params = params_from(vec![
            ("usado", ParamValue::Int(1)),
            ("sobrando", ParamValue::Int(2)),
        ]);
        let prepared = compile("SELECT {{usado}}", &params, &ParamSchema::new()).unwrap();
        assert_eq!(prepared.args.len(), 1);
    }

    #[test]
    fn marcador_sem_fechamento_fica_literal() {
        let params = params_from(vec![("a", ParamValue::Int(1))]);
        let prepared = compile("SELECT {{a}} FROM t WHERE '{{aberto'", &params, &ParamSchema::new())
            .unwrap();
        assert_eq!(prepared.text, "SELECT $1 FROM t WHERE '{{aberto'");
    }
}
