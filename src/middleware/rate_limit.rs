// src/middleware/rate_limit.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};

use crate::common::{
    error::AppError,
    http::{bearer_token, client_ip},
};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX: u32 = 60;
const MAX_KEYS: usize = 10_000;

// Política por endpoint: o escopo separa os buckets e o máximo sobrepõe o
// default de 60 requisições por janela.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub scope: &'static str,
    pub max: u32,
}

impl RateLimitPolicy {
    pub const fn new(scope: &'static str, max: u32) -> Self {
        Self { scope, max }
    }
}

struct Bucket {
    count: u32,
    window_start: Instant,
}

#[derive(Debug, PartialEq)]
pub enum Decision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

// Janela fixa por chave, processo-local. Em múltiplos workers cada processo
// carrega sua própria cota, o que o produto tolera.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    pub fn check(&self, key: &str, max: u32) -> Decision {
        let now = Instant::now();
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if buckets.len() > MAX_KEYS {
            let window = self.window;
            buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= max {
            let reset_at = bucket.window_start + self.window;
            let remaining_ms = reset_at.saturating_duration_since(now).as_millis() as u64;
            return Decision::Limited {
                retry_after_seconds: remaining_ms.div_ceil(1000).max(1),
            };
        }

        bucket.count += 1;
        Decision::Allowed
    }
}

// Chave do bucket: IP do cliente e, quando a rota autentica, os últimos 16
// caracteres do bearer token, para a cota resistir à rotação de IP atrás de
// proxy sem misturar usuários.
pub fn derive_key(scope: &str, headers: &HeaderMap) -> String {
    let ip = client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    match bearer_token(headers) {
        Some(token) => {
            let suffix: String = token
                .chars()
                .rev()
                .take(16)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("{scope}:{ip}:{suffix}")
        }
        None => format!("{scope}:{ip}"),
    }
}

pub async fn enforce(
    limiter: RateLimiter,
    policy: RateLimitPolicy,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = derive_key(policy.scope, request.headers());
    match limiter.check(&key, policy.max) {
        Decision::Allowed => Ok(next.run(request).await),
        Decision::Limited {
            retry_after_seconds,
        } => Err(AppError::RateLimited {
            retry_after_seconds,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn rejeita_a_chamada_seguinte_ao_limite() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert_eq!(limiter.check("k", 2), Decision::Allowed);
        assert_eq!(limiter.check("k", 2), Decision::Allowed);
        match limiter.check("k", 2) {
            Decision::Limited {
                retry_after_seconds,
            } => assert!((1..=60).contains(&retry_after_seconds)),
            Decision::Allowed => panic!("deveria ter limitado"),
        }
    }

    #[test]
    fn janela_expirada_zera_o_contador() {
        let limiter = RateLimiter::new(Duration::from_millis(5));
        assert_eq!(limiter.check("k", 1), Decision::Allowed);
        assert!(matches!(limiter.check("k", 1), Decision::Limited { .. }));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(limiter.check("k", 1), Decision::Allowed);
    }

    #[test]
    fn chaves_distintas_nao_compartilham_cota() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert_eq!(limiter.check("a", 1), Decision::Allowed);
        assert_eq!(limiter.check("b", 1), Decision::Allowed);
    }

    #[test]
    fn chave_autenticada_usa_sufixo_do_token() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer abcdefghijklmnopqrstuvwxyz"),
        );
        let key = derive_key("fetch", &headers);
        assert_eq!(key, "fetch:203.0.113.7:klmnopqrstuvwxyz");

        headers.remove("authorization");
        assert_eq!(derive_key("fetch", &headers), "fetch:203.0.113.7");
    }

    #[test]
    fn sem_cabecalhos_cai_no_unknown() {
        assert_eq!(derive_key("fetch", &HeaderMap::new()), "fetch:unknown");
    }
}
