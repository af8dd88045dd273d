// src/engine.rs
//
// Núcleo de execução de consultas por metadados: validação de parâmetros,
// compilação de templates e normalização das linhas de resultado.

pub mod params;
pub mod sanitize;
pub mod template;
