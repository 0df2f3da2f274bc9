// errors.rs
use firma_providers::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Motivo concreto de un conflicto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
  /// El slot (o el actor) ya firmó.
  AlreadySigned,
  /// Quedan firmas previas pendientes según el orden.
  NotYourTurn,
  /// El actor es dueño de un slot y a la vez delegado de otro dueño con
  /// slot pendiente en el mismo documento.
  DelegateConflict,
  /// Ya existe un delegado vigente para el dueño.
  DelegateAlreadyAppointed,
  /// Transición de estado inválida del delegado (activar lo activo, etc.).
  DelegateState,
}

impl fmt::Display for ConflictKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ConflictKind::AlreadySigned => "ALREADY_SIGNED",
      ConflictKind::NotYourTurn => "NOT_YOUR_TURN",
      ConflictKind::DelegateConflict => "DELEGATE_CONFLICT",
      ConflictKind::DelegateAlreadyAppointed => "DELEGATE_ALREADY_APPOINTED",
      ConflictKind::DelegateState => "DELEGATE_STATE",
    };
    write!(f, "{}", s)
  }
}

/// Categoría expuesta hacia la capa HTTP; nunca filtra detalles internos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
  Validation,
  NotFound,
  Conflict,
  ExternalProvider,
  StorageInconsistency,
  Internal,
}

#[derive(Debug, Error, Clone)]
pub enum DomainError {
  #[error("Error de validación: {0}")]
  ValidationError(String),
  #[error("No encontrado: {0}")]
  NotFound(String),
  #[error("Conflicto ({0}): {1}")]
  Conflict(ConflictKind, String),
  #[error("Error del proveedor de firma: {0}")]
  ExternalProvider(String),
  #[error("Inconsistencia de almacenamiento: {0}")]
  StorageInconsistency(String),
  #[error("Error externo: {0}")]
  ExternalError(String),
  #[error("Error de serialización: {0}")]
  SerializationError(String),
}

impl DomainError {
  pub fn conflict(kind: ConflictKind, msg: impl Into<String>) -> Self {
    Self::Conflict(kind, msg.into())
  }

  pub fn category(&self) -> ErrorCategory {
    match self {
      DomainError::ValidationError(_) => ErrorCategory::Validation,
      DomainError::NotFound(_) => ErrorCategory::NotFound,
      DomainError::Conflict(..) => ErrorCategory::Conflict,
      DomainError::ExternalProvider(_) => ErrorCategory::ExternalProvider,
      DomainError::StorageInconsistency(_) => ErrorCategory::StorageInconsistency,
      DomainError::ExternalError(_) | DomainError::SerializationError(_) => ErrorCategory::Internal,
    }
  }

  /// Devuelve el tipo de conflicto si el error es un `Conflict`.
  pub fn conflict_kind(&self) -> Option<ConflictKind> {
    match self {
      DomainError::Conflict(kind, _) => Some(*kind),
      _ => None,
    }
  }

  /// Mensaje apto para exponer al llamador: los errores internos se
  /// reemplazan por un texto genérico.
  pub fn public_message(&self) -> String {
    match self.category() {
      ErrorCategory::Internal => "Error interno".to_string(),
      _ => self.to_string(),
    }
  }
}

impl From<ProviderError> for DomainError {
  fn from(e: ProviderError) -> Self {
    match e {
      ProviderError::Config(_) => Self::ExternalError(e.to_string()),
      e if e.is_signing_failure() => Self::ExternalProvider(e.to_string()),
      e => Self::StorageInconsistency(e.to_string()),
    }
  }
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn provider_errors_map_to_categories() {
    let e: DomainError = ProviderError::Timeout("t".into()).into();
    assert_eq!(e.category(), ErrorCategory::ExternalProvider);
    let e: DomainError = ProviderError::Store("disk".into()).into();
    assert_eq!(e.category(), ErrorCategory::StorageInconsistency);
    let e: DomainError = ProviderError::Config("x".into()).into();
    assert_eq!(e.category(), ErrorCategory::Internal);
    assert_eq!(e.public_message(), "Error interno");
  }
}
