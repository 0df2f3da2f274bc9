// signature.rs
use crate::{ConflictKind, DomainError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Rol del responsable de un slot. Cada rol es una fase: todos los
/// visadores (fase 0) deben firmar antes que cualquier firmador (fase 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignerType {
  Visador,
  Firmador,
}

impl SignerType {
  pub fn phase(self) -> usize {
    match self {
      SignerType::Visador => 0,
      SignerType::Firmador => 1,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      SignerType::Visador => "VISADOR",
      SignerType::Firmador => "FIRMADOR",
    }
  }
}

impl fmt::Display for SignerType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for SignerType {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "VISADOR" | "REVIEWER" => Ok(SignerType::Visador),
      "FIRMADOR" | "SIGNER" => Ok(SignerType::Firmador),
      other => Err(DomainError::ValidationError(format!("Tipo de firmante desconocido: {}", other))),
    }
  }
}

/// Slot de aprobación dentro del documento.
///
/// `owner_rut` es el responsable original; `signer_rut` quien efectivamente
/// firmó (distinto del dueño cuando firma un delegado). Una vez firmado,
/// `signer_rut` y `signed_at` no cambian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
  id: Uuid,
  document_id: Uuid,
  owner_rut: String,
  signer_rut: Option<String>,
  signer_order: i32,
  signer_type: SignerType,
  signed_at: Option<DateTime<Utc>>,
}

impl Signature {
  pub fn new_pending(document_id: Uuid, owner_rut: &str, signer_order: i32, signer_type: SignerType) -> Self {
    Self { id: Uuid::new_v4(),
           document_id,
           owner_rut: owner_rut.trim().to_string(),
           signer_rut: None,
           signer_order,
           signer_type,
           signed_at: None }
  }

  /// Reconstruye un slot persistido validando que el estado de firma sea
  /// coherente (`is_signed` con firmante y fecha, o ninguno de los dos).
  #[allow(clippy::too_many_arguments)]
  pub fn from_parts(id: Uuid,
                    document_id: Uuid,
                    owner_rut: &str,
                    signer_rut: Option<String>,
                    signer_order: i32,
                    signer_type: SignerType,
                    is_signed: bool,
                    signed_at: Option<DateTime<Utc>>)
                    -> Result<Self, DomainError> {
    match (is_signed, &signer_rut, &signed_at) {
      (true, Some(_), Some(_)) | (false, None, None) => {}
      _ => {
        return Err(DomainError::ValidationError(format!("Slot {} con estado de firma inconsistente", id)));
      }
    }
    Ok(Self { id, document_id, owner_rut: owner_rut.to_string(), signer_rut, signer_order, signer_type, signed_at })
  }

  /// Marca el slot como firmado por `actor`.
  pub fn sign(&mut self, actor: &str, at: DateTime<Utc>) -> Result<(), DomainError> {
    if self.is_signed() {
      return Err(DomainError::conflict(ConflictKind::AlreadySigned, format!("El slot {} ya fue firmado", self.id)));
    }
    self.signer_rut = Some(actor.to_string());
    self.signed_at = Some(at);
    Ok(())
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn document_id(&self) -> Uuid {
    self.document_id
  }

  pub fn owner_rut(&self) -> &str {
    &self.owner_rut
  }

  pub fn signer_rut(&self) -> Option<&str> {
    self.signer_rut.as_deref()
  }

  pub fn signer_order(&self) -> i32 {
    self.signer_order
  }

  pub fn signer_type(&self) -> SignerType {
    self.signer_type
  }

  pub fn signed_at(&self) -> Option<DateTime<Utc>> {
    self.signed_at
  }

  pub fn is_signed(&self) -> bool {
    self.signed_at.is_some()
  }

  /// `true` si el slot lo firmó alguien distinto del dueño.
  pub fn signed_by_delegate(&self) -> bool {
    matches!(self.signer_rut(), Some(rut) if rut != self.owner_rut)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn signer_type_parsing_and_phases() {
    assert_eq!("visador".parse::<SignerType>().unwrap(), SignerType::Visador);
    assert_eq!("SIGNER".parse::<SignerType>().unwrap(), SignerType::Firmador);
    assert!("otro".parse::<SignerType>().is_err());
    assert!(SignerType::Visador.phase() < SignerType::Firmador.phase());
    assert_eq!(serde_json::to_string(&SignerType::Firmador).unwrap(), "\"FIRMADOR\"");
  }

  #[test]
  fn slot_is_signed_once() {
    let mut slot = Signature::new_pending(Uuid::new_v4(), "11111111-1", 1, SignerType::Visador);
    let at = Utc::now();
    slot.sign("22222222-2", at).unwrap();
    assert!(slot.is_signed());
    assert!(slot.signed_by_delegate());
    let err = slot.sign("11111111-1", Utc::now()).unwrap_err();
    assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadySigned));
    assert_eq!(slot.signer_rut(), Some("22222222-2"));
    assert_eq!(slot.signed_at(), Some(at));
  }

  #[test]
  fn from_parts_rejects_inconsistent_state() {
    let res = Signature::from_parts(Uuid::new_v4(), Uuid::new_v4(), "1", None, 1, SignerType::Firmador, true, None);
    assert!(matches!(res, Err(DomainError::ValidationError(_))));
  }
}
