// config.rs
use firma_domain::DomainError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PENDING_MAX_LIMIT: u32 = 100;
pub const DEFAULT_PENDING_PAGE_SIZE: u32 = 20;

/// Parámetros del motor de firmas que no dependen de la base ni del
/// proveedor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
  /// Máximo `limit` aceptado por la consulta de pendientes.
  pub pending_max_limit: u32,
  /// Tamaño de página usado cuando el llamador no indica uno.
  pub pending_default_limit: u32,
}

impl Default for WorkflowConfig {
  fn default() -> Self {
    WorkflowConfig { pending_max_limit: DEFAULT_PENDING_MAX_LIMIT, pending_default_limit: DEFAULT_PENDING_PAGE_SIZE }
  }
}

impl WorkflowConfig {
  /// Lee `FIRMA_PENDING_MAX_LIMIT` y `FIRMA_PENDING_DEFAULT_LIMIT`.
  pub fn from_env() -> Result<Self, DomainError> {
    dotenvy::dotenv().ok();
    let mut cfg = Self::default();
    if let Ok(raw) = std::env::var("FIRMA_PENDING_MAX_LIMIT") {
      cfg.pending_max_limit = parse_limit("FIRMA_PENDING_MAX_LIMIT", &raw)?;
    }
    if let Ok(raw) = std::env::var("FIRMA_PENDING_DEFAULT_LIMIT") {
      cfg.pending_default_limit = parse_limit("FIRMA_PENDING_DEFAULT_LIMIT", &raw)?;
    }
    if cfg.pending_default_limit > cfg.pending_max_limit {
      return Err(DomainError::ValidationError(format!("FIRMA_PENDING_DEFAULT_LIMIT ({}) supera FIRMA_PENDING_MAX_LIMIT \
                                                       ({})",
                                                      cfg.pending_default_limit, cfg.pending_max_limit)));
    }
    Ok(cfg)
  }
}

fn parse_limit(key: &str, raw: &str) -> Result<u32, DomainError> {
  match raw.trim().parse::<u32>() {
    Ok(n) if n >= 1 => Ok(n),
    _ => Err(DomainError::ValidationError(format!("{} inválido: {:?}", key, raw))),
  }
}
