// src/models/principal.rs

use std::collections::HashSet;

use serde_json::Value;
use uuid::Uuid;

// Usuário autenticado junto ao provedor de identidade, materializado apenas
// durante a requisição. O conjunto de papéis sempre contém "authenticated".
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub roles: HashSet<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

// Extrai o conjunto de papéis do JSON do usuário retornado pelo provedor.
// Percorre, nesta ordem: app_metadata.role, user_metadata.role,
// app_metadata.roles, user_metadata.roles. Uma string contribui com ela
// mesma, uma lista de strings contribui com seus elementos, qualquer outro
// tipo é ignorado.
pub fn extract_roles(user: &Value) -> HashSet<String> {
    let mut roles = HashSet::new();
    roles.insert("authenticated".to_string());

    let sources = [
        user.pointer("/app_metadata/role"),
        user.pointer("/user_metadata/role"),
        user.pointer("/app_metadata/roles"),
        user.pointer("/user_metadata/roles"),
    ];

    for source in sources.into_iter().flatten() {
        match source {
            Value::String(role) => {
                roles.insert(role.clone());
            }
            Value::Array(list) => {
                for entry in list {
                    if let Value::String(role) = entry {
                        roles.insert(role.clone());
                    }
                }
            }
            _ => {}
        }
    }

    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_sempre_incluem_authenticated() {
        let roles = extract_roles(&json!({}));
        assert_eq!(roles.len(), 1);
        assert!(roles.contains("authenticated"));
    }

    #[test]
    fn une_as_quatro_origens_de_papeis() {
        let user = json!({
            "app_metadata": { "role": "admin", "roles": ["editor"] },
            "user_metadata": { "role": "user", "roles": ["viewer", "user"] }
        });
        let roles = extract_roles(&user);
        for expected in ["authenticated", "admin", "editor", "user", "viewer"] {
            assert!(roles.contains(expected), "faltou {expected}");
        }
        assert_eq!(roles.len(), 5);
    }

    #[test]
    fn ignora_tipos_que_nao_sao_string_ou_lista_de_strings() {
        let user = json!({
            "app_metadata": { "role": 42, "roles": [1, "ok", {"x": 1}] },
            "user_metadata": { "roles": {"nested": "map"} }
        });
        let roles = extract_roles(&user);
        assert!(roles.contains("ok"));
        assert!(roles.contains("authenticated"));
        assert_eq!(roles.len(), 2);
    }
}
