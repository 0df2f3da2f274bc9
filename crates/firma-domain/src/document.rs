// document.rs
use crate::{DomainError, Signature, SignerType};
use chrono::{DateTime, Datelike, Utc};
use firma_providers::artifact_path;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Firmante solicitado al crear un documento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSpec {
  pub rut: String,
  pub order: i32,
  pub signer_type: SignerType,
}

impl SignerSpec {
  pub fn new(rut: impl Into<String>, order: i32, signer_type: SignerType) -> Self {
    Self { rut: rut.into(), order, signer_type }
  }
}

/// Valida la lista de firmantes antes de cualquier persistencia:
/// - al menos un firmante, ruts no vacíos y únicos, órdenes >= 1;
/// - si hay visadores y firmadores, el mayor orden de los visadores debe ser
///   estrictamente menor que el menor orden de los firmadores.
pub fn validate_signers(signers: &[SignerSpec]) -> Result<(), DomainError> {
  if signers.is_empty() {
    return Err(DomainError::ValidationError("El documento debe tener al menos un firmante".to_string()));
  }
  let mut seen = HashSet::new();
  for s in signers {
    let rut = s.rut.trim();
    if rut.is_empty() {
      return Err(DomainError::ValidationError("El rut del firmante no puede estar vacío".to_string()));
    }
    if s.order < 1 {
      return Err(DomainError::ValidationError(format!("Orden inválido {} para el rut {}", s.order, rut)));
    }
    if !seen.insert(rut.to_string()) {
      return Err(DomainError::ValidationError(format!("El rut {} está repetido en la lista de firmantes", rut)));
    }
  }
  let max_visador = signers.iter().filter(|s| s.signer_type == SignerType::Visador).map(|s| s.order).max();
  let min_firmador = signers.iter().filter(|s| s.signer_type == SignerType::Firmador).map(|s| s.order).min();
  if let (Some(max_v), Some(min_f)) = (max_visador, min_firmador) {
    if max_v >= min_f {
      return Err(DomainError::ValidationError(format!("Todos los visadores deben preceder a los firmadores (visador \
                                                       orden {} >= firmador orden {})",
                                                      max_v, min_f)));
    }
  }
  Ok(())
}

/// Agregado documento: dueño exclusivo de sus slots de firma.
///
/// `fully_signed` es una proyección cacheada: se recalcula desde los slots
/// cada vez que uno cambia y `verify_integrity` permite auditarla.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  id: Uuid,
  name: String,
  artifact_name: String,
  artifact_path: String,
  created_at: DateTime<Utc>,
  owner_rut: String,
  fully_signed: bool,
  deleted_at: Option<DateTime<Utc>>,
  signatures: Vec<Signature>,
}

impl Document {
  /// Crea un documento nuevo con un slot pendiente por firmante. La ruta del
  /// artefacto queda fijada por el año de creación.
  pub fn new(owner_rut: &str,
             name: &str,
             artifact_name: &str,
             created_at: DateTime<Utc>,
             signers: &[SignerSpec])
             -> Result<Self, DomainError> {
    if owner_rut.trim().is_empty() {
      return Err(DomainError::ValidationError("El rut del creador no puede estar vacío".to_string()));
    }
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre del documento no puede estar vacío".to_string()));
    }
    if artifact_name.trim().is_empty() || artifact_name.contains('/') {
      return Err(DomainError::ValidationError(format!("Nombre de artefacto inválido: {:?}", artifact_name)));
    }
    validate_signers(signers)?;
    let id = Uuid::new_v4();
    let signatures = signers.iter()
                            .map(|s| Signature::new_pending(id, &s.rut, s.order, s.signer_type))
                            .collect();
    Ok(Self { id,
              name: name.trim().to_string(),
              artifact_name: artifact_name.to_string(),
              artifact_path: artifact_path(created_at.year(), artifact_name),
              created_at,
              owner_rut: owner_rut.trim().to_string(),
              fully_signed: false,
              deleted_at: None,
              signatures })
  }

  /// Reconstruye un documento persistido. Los slots deben pertenecer al
  /// documento y tener dueños únicos.
  #[allow(clippy::too_many_arguments)]
  pub fn from_parts(id: Uuid,
                    name: String,
                    artifact_name: String,
                    artifact_path: String,
                    created_at: DateTime<Utc>,
                    owner_rut: String,
                    fully_signed: bool,
                    deleted_at: Option<DateTime<Utc>>,
                    mut signatures: Vec<Signature>)
                    -> Result<Self, DomainError> {
    let mut owners = HashSet::new();
    for s in &signatures {
      if s.document_id() != id {
        return Err(DomainError::ValidationError(format!("El slot {} no pertenece al documento {}", s.id(), id)));
      }
      if !owners.insert(s.owner_rut().to_string()) {
        return Err(DomainError::ValidationError(format!("Rut {} duplicado en el documento {}", s.owner_rut(), id)));
      }
    }
    signatures.sort_by(|a, b| {
                (a.signer_type().phase(), a.signer_order(), a.owner_rut()).cmp(&(b.signer_type().phase(),
                                                                                 b.signer_order(),
                                                                                 b.owner_rut()))
              });
    Ok(Self { id, name, artifact_name, artifact_path, created_at, owner_rut, fully_signed, deleted_at, signatures })
  }

  /// Firma el slot `slot_id` en nombre de `actor` y recalcula
  /// `fully_signed`. No valida el orden: eso es responsabilidad de
  /// `sign_order`.
  pub fn sign_slot(&mut self, slot_id: Uuid, actor: &str, at: DateTime<Utc>) -> Result<&Signature, DomainError> {
    let idx = self.signatures
                  .iter()
                  .position(|s| s.id() == slot_id)
                  .ok_or_else(|| DomainError::NotFound(format!("slot {} en documento {}", slot_id, self.id)))?;
    self.signatures[idx].sign(actor, at)?;
    self.recompute_fully_signed();
    Ok(&self.signatures[idx])
  }

  /// Recalcula la proyección desde los slots y la devuelve.
  pub fn recompute_fully_signed(&mut self) -> bool {
    self.fully_signed = self.all_slots_signed();
    self.fully_signed
  }

  pub fn all_slots_signed(&self) -> bool {
    self.pending_signatures().next().is_none()
  }

  /// `true` si el flag almacenado coincide con lo derivable de los slots.
  pub fn verify_integrity(&self) -> bool {
    self.fully_signed == self.all_slots_signed()
  }

  pub fn mark_deleted(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
    if self.deleted_at.is_some() {
      return Err(DomainError::NotFound(format!("documento {}", self.id)));
    }
    self.deleted_at = Some(at);
    Ok(())
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn artifact_name(&self) -> &str {
    &self.artifact_name
  }

  pub fn artifact_path(&self) -> &str {
    &self.artifact_path
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn owner_rut(&self) -> &str {
    &self.owner_rut
  }

  pub fn is_fully_signed(&self) -> bool {
    self.fully_signed
  }

  pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
    self.deleted_at
  }

  pub fn is_deleted(&self) -> bool {
    self.deleted_at.is_some()
  }

  pub fn signatures(&self) -> &[Signature] {
    &self.signatures
  }

  pub fn signature(&self, slot_id: Uuid) -> Option<&Signature> {
    self.signatures.iter().find(|s| s.id() == slot_id)
  }

  pub fn pending_signatures(&self) -> impl Iterator<Item = &Signature> {
    self.signatures.iter().filter(|s| !s.is_signed())
  }
}

impl fmt::Display for Document {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let signed = self.signatures.iter().filter(|s| s.is_signed()).count();
    write!(f,
           "Document({}, {:?}, firmas {}/{}, creador {})",
           self.id,
           self.name,
           signed,
           self.signatures.len(),
           self.owner_rut)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ConflictKind;
  use chrono::TimeZone;

  fn v(rut: &str, order: i32) -> SignerSpec {
    SignerSpec::new(rut, order, SignerType::Visador)
  }

  fn f(rut: &str, order: i32) -> SignerSpec {
    SignerSpec::new(rut, order, SignerType::Firmador)
  }

  #[test]
  fn phase_order_rule() {
    assert!(validate_signers(&[v("1", 1), v("2", 2), f("3", 3)]).is_ok());
    assert!(validate_signers(&[v("1", 1), f("2", 1)]).is_err());
    assert!(validate_signers(&[v("1", 3), f("2", 2)]).is_err());
    // una sola fase: sin restricción cruzada
    assert!(validate_signers(&[f("1", 5), f("2", 1)]).is_ok());
    assert!(validate_signers(&[v("1", 2), v("2", 2)]).is_ok());
  }

  #[test]
  fn phase_order_rule_holds_for_many_lists() {
    for max_v in 1..6 {
      for min_f in 1..6 {
        let res = validate_signers(&[v("a", 1), v("b", max_v), f("c", min_f), f("d", min_f + 1)]);
        assert_eq!(res.is_err(), max_v >= min_f, "max_v={} min_f={}", max_v, min_f);
      }
    }
  }

  #[test]
  fn rejects_duplicates_empty_and_bad_orders() {
    assert!(validate_signers(&[]).is_err());
    assert!(validate_signers(&[v("1", 1), f(" 1 ", 2)]).is_err());
    assert!(validate_signers(&[v("  ", 1)]).is_err());
    assert!(validate_signers(&[f("1", 0)]).is_err());
  }

  #[test]
  fn new_document_builds_pending_slots_and_path() {
    let created = Utc.with_ymd_and_hms(2023, 5, 17, 10, 0, 0).unwrap();
    let doc = Document::new("9", "Contrato", "abc.pdf", created, &[v("1", 1), f("2", 2)]).unwrap();
    assert_eq!(doc.artifact_path(), "/uploads/2023/abc.pdf");
    assert_eq!(doc.signatures().len(), 2);
    assert!(doc.signatures().iter().all(|s| !s.is_signed() && s.document_id() == doc.id()));
    assert!(!doc.is_fully_signed());
    assert!(doc.verify_integrity());
  }

  #[test]
  fn fully_signed_flag_tracks_slots() {
    let mut doc = Document::new("9", "Contrato", "abc.pdf", Utc::now(), &[v("1", 1), f("2", 2)]).unwrap();
    let ids: Vec<Uuid> = doc.signatures().iter().map(|s| s.id()).collect();
    doc.sign_slot(ids[0], "1", Utc::now()).unwrap();
    assert!(!doc.is_fully_signed());
    assert!(doc.verify_integrity());
    doc.sign_slot(ids[1], "2", Utc::now()).unwrap();
    assert!(doc.is_fully_signed());
    assert!(doc.verify_integrity());
    let err = doc.sign_slot(ids[1], "2", Utc::now()).unwrap_err();
    assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadySigned));
  }

  #[test]
  fn from_parts_detects_foreign_slots() {
    let doc = Document::new("9", "Contrato", "abc.pdf", Utc::now(), &[v("1", 1)]).unwrap();
    let foreign = Signature::new_pending(Uuid::new_v4(), "2", 1, SignerType::Firmador);
    let res = Document::from_parts(doc.id(),
                                   doc.name().into(),
                                   doc.artifact_name().into(),
                                   doc.artifact_path().into(),
                                   doc.created_at(),
                                   doc.owner_rut().into(),
                                   false,
                                   None,
                                   vec![foreign]);
    assert!(res.is_err());
  }
}
