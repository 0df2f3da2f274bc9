// sign_order.rs
// Evaluador de orden de firma. Es el único camino de decisión: lo usan tanto
// la firma como la consulta de pendientes, así que nunca divergen.
use crate::{Document, Signature};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignStatus {
  CanSign,
  NotYourTurn,
  AlreadySigned,
  DelegateConflict,
}

impl SignStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      SignStatus::CanSign => "CAN_SIGN",
      SignStatus::NotYourTurn => "NOT_YOUR_TURN",
      SignStatus::AlreadySigned => "ALREADY_SIGNED",
      SignStatus::DelegateConflict => "DELEGATE_CONFLICT",
    }
  }
}

impl fmt::Display for SignStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for SignStatus {
  type Err = crate::DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().replace('-', "_").as_str() {
      "CAN_SIGN" | "CANSIGN" => Ok(SignStatus::CanSign),
      "NOT_YOUR_TURN" | "NOTYOURTURN" => Ok(SignStatus::NotYourTurn),
      "ALREADY_SIGNED" | "ALREADYSIGNED" => Ok(SignStatus::AlreadySigned),
      "DELEGATE_CONFLICT" | "DELEGATECONFLICT" => Ok(SignStatus::DelegateConflict),
      other => Err(crate::DomainError::ValidationError(format!("Estado de firma desconocido: {}", other))),
    }
  }
}

/// Verifica el orden de un slot dentro del documento.
///
/// Un slot es firmable si todos los slots de fases anteriores están firmados
/// y todos los de su misma fase con orden estrictamente menor también. Los
/// órdenes iguales son concurrentes.
pub fn check_order(document: &Document, slot: &Signature) -> SignStatus {
  if slot.is_signed() {
    return SignStatus::AlreadySigned;
  }
  let phase = slot.signer_type().phase();
  let blocked = document.signatures().iter().any(|other| {
                                              !other.is_signed()
                                              && (other.signer_type().phase() < phase
                                                  || (other.signer_type().phase() == phase
                                                      && other.signer_order() < slot.signer_order()))
                                            });
  if blocked {
    SignStatus::NotYourTurn
  } else {
    SignStatus::CanSign
  }
}

/// Resultado de evaluar a un actor frente a un documento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorDecision {
  pub status: SignStatus,
  /// Slot relevante para la decisión (el que firmaría o el que ya firmó).
  pub slot_id: Uuid,
  /// Dueño original del slot cuando el actor actúa como delegado.
  pub on_behalf_of: Option<String>,
}

impl ActorDecision {
  fn for_slot(status: SignStatus, slot: &Signature, actor: &str) -> Self {
    let on_behalf_of = if slot.owner_rut() == actor { None } else { Some(slot.owner_rut().to_string()) };
    Self { status, slot_id: slot.id(), on_behalf_of }
  }
}

/// Decide qué puede hacer `actor` sobre `document`.
///
/// `principals` son los dueños de las delegaciones activas del actor. La
/// precedencia es:
/// 1. el actor figura como firmante de un slot firmado, o es dueño de un slot
///    que ya firmó su delegado: `AlreadySigned`;
/// 2. el actor es dueño de un slot pendiente: `DelegateConflict` si algún
///    principal también tiene un slot pendiente, si no se evalúa el orden;
/// 3. el primer slot pendiente de un principal (por fase, orden y rut);
/// 4. nada alcanzable: `None`.
pub fn evaluate_actor(document: &Document, actor: &str, principals: &[String]) -> Option<ActorDecision> {
  let slots = document.signatures();
  if let Some(signed) = slots.iter().find(|s| s.is_signed() && s.signer_rut() == Some(actor)) {
    return Some(ActorDecision::for_slot(SignStatus::AlreadySigned, signed, actor));
  }
  if let Some(signed) = slots.iter().find(|s| s.is_signed() && s.owner_rut() == actor) {
    return Some(ActorDecision::for_slot(SignStatus::AlreadySigned, signed, actor));
  }

  let mut delegated: Vec<&Signature> =
    slots.iter()
         .filter(|s| !s.is_signed() && s.owner_rut() != actor && principals.iter().any(|p| p == s.owner_rut()))
         .collect();
  delegated.sort_by(|a, b| {
             (a.signer_type().phase(), a.signer_order(), a.owner_rut()).cmp(&(b.signer_type().phase(),
                                                                              b.signer_order(),
                                                                              b.owner_rut()))
           });

  if let Some(own) = slots.iter().find(|s| !s.is_signed() && s.owner_rut() == actor) {
    if !delegated.is_empty() {
      return Some(ActorDecision::for_slot(SignStatus::DelegateConflict, own, actor));
    }
    return Some(ActorDecision::for_slot(check_order(document, own), own, actor));
  }

  delegated.first()
           .map(|slot| ActorDecision::for_slot(check_order(document, slot), slot, actor))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{SignerSpec, SignerType};
  use chrono::Utc;

  fn doc(signers: &[(&str, i32, SignerType)]) -> Document {
    let specs: Vec<SignerSpec> = signers.iter().map(|(r, o, t)| SignerSpec::new(*r, *o, *t)).collect();
    Document::new("creador", "doc", "a.pdf", Utc::now(), &specs).unwrap()
  }

  fn slot_of(d: &Document, rut: &str) -> Uuid {
    d.signatures().iter().find(|s| s.owner_rut() == rut).unwrap().id()
  }

  fn status(d: &Document, actor: &str) -> Option<SignStatus> {
    evaluate_actor(d, actor, &[]).map(|x| x.status)
  }

  #[test]
  fn two_phase_order_with_two_slots_each() {
    use SignerType::*;
    let mut d = doc(&[("v1", 1, Visador), ("v2", 2, Visador), ("f1", 3, Firmador), ("f2", 4, Firmador)]);
    assert_eq!(status(&d, "v1"), Some(SignStatus::CanSign));
    assert_eq!(status(&d, "v2"), Some(SignStatus::NotYourTurn));
    assert_eq!(status(&d, "f1"), Some(SignStatus::NotYourTurn));

    d.sign_slot(slot_of(&d, "v1"), "v1", Utc::now()).unwrap();
    assert_eq!(status(&d, "f1"), Some(SignStatus::NotYourTurn));
    d.sign_slot(slot_of(&d, "v2"), "v2", Utc::now()).unwrap();
    assert_eq!(status(&d, "f1"), Some(SignStatus::CanSign));
    assert_eq!(status(&d, "f2"), Some(SignStatus::NotYourTurn));
    d.sign_slot(slot_of(&d, "f1"), "f1", Utc::now()).unwrap();
    assert_eq!(status(&d, "f2"), Some(SignStatus::CanSign));
    assert_eq!(status(&d, "v1"), Some(SignStatus::AlreadySigned));
  }

  #[test]
  fn equal_orders_are_concurrent() {
    use SignerType::*;
    let d = doc(&[("a", 1, Firmador), ("b", 1, Firmador), ("c", 2, Firmador)]);
    assert_eq!(status(&d, "a"), Some(SignStatus::CanSign));
    assert_eq!(status(&d, "b"), Some(SignStatus::CanSign));
    assert_eq!(status(&d, "c"), Some(SignStatus::NotYourTurn));
  }

  #[test]
  fn firmador_waits_for_pending_visador() {
    use SignerType::*;
    let d = doc(&[("v", 1, Visador), ("f", 2, Firmador)]);
    let f_slot = d.signatures().iter().find(|s| s.owner_rut() == "f").unwrap();
    assert_eq!(check_order(&d, f_slot), SignStatus::NotYourTurn);
  }

  #[test]
  fn delegate_signs_for_principal() {
    use SignerType::*;
    let d = doc(&[("owner", 1, Visador)]);
    let dec = evaluate_actor(&d, "deleg", &["owner".to_string()]).unwrap();
    assert_eq!(dec.status, SignStatus::CanSign);
    assert_eq!(dec.on_behalf_of.as_deref(), Some("owner"));
    assert_eq!(evaluate_actor(&d, "stranger", &[]), None);
  }

  #[test]
  fn owner_who_is_also_delegate_is_in_conflict() {
    use SignerType::*;
    let d = doc(&[("a", 1, Visador), ("b", 2, Firmador)]);
    let dec = evaluate_actor(&d, "a", &["b".to_string()]).unwrap();
    assert_eq!(dec.status, SignStatus::DelegateConflict);
    assert_eq!(dec.slot_id, slot_of(&d, "a"));
  }

  #[test]
  fn no_conflict_when_principal_slot_is_signed() {
    use SignerType::*;
    let mut d = doc(&[("b", 1, Visador), ("a", 2, Firmador)]);
    d.sign_slot(slot_of(&d, "b"), "b", Utc::now()).unwrap();
    let dec = evaluate_actor(&d, "a", &["b".to_string()]).unwrap();
    assert_eq!(dec.status, SignStatus::CanSign);
    assert_eq!(dec.on_behalf_of, None);
  }

  #[test]
  fn delegated_candidate_is_first_by_phase_and_order() {
    use SignerType::*;
    let d = doc(&[("p2", 2, Firmador), ("p1", 1, Visador)]);
    let dec = evaluate_actor(&d, "x", &["p2".to_string(), "p1".to_string()]).unwrap();
    assert_eq!(dec.slot_id, slot_of(&d, "p1"));
    assert_eq!(dec.status, SignStatus::CanSign);
  }

  #[test]
  fn delegate_who_signed_sees_already_signed() {
    use SignerType::*;
    let mut d = doc(&[("owner", 1, Visador), ("other", 2, Firmador)]);
    d.sign_slot(slot_of(&d, "owner"), "deleg", Utc::now()).unwrap();
    let dec = evaluate_actor(&d, "deleg", &["owner".to_string()]).unwrap();
    assert_eq!(dec.status, SignStatus::AlreadySigned);
    assert_eq!(dec.on_behalf_of.as_deref(), Some("owner"));
  }

  #[test]
  fn owner_sees_already_signed_after_delegate_signs() {
    use SignerType::*;
    let mut d = doc(&[("owner", 1, Visador), ("other", 2, Firmador)]);
    d.sign_slot(slot_of(&d, "owner"), "deleg", Utc::now()).unwrap();
    let dec = evaluate_actor(&d, "owner", &[]).unwrap();
    assert_eq!(dec.status, SignStatus::AlreadySigned);
    assert_eq!(dec.slot_id, slot_of(&d, "owner"));
    assert_eq!(dec.on_behalf_of, None);
  }

  #[test]
  fn phase_gating_does_not_depend_on_order_numbers() {
    // visador y firmador con el mismo orden: la fase manda
    let id = Uuid::new_v4();
    let slots = vec![Signature::new_pending(id, "1", 1, SignerType::Visador),
                     Signature::new_pending(id, "2", 1, SignerType::Firmador)];
    let mut d = Document::from_parts(id,
                                     "doc".into(),
                                     "a.pdf".into(),
                                     "/uploads/2024/a.pdf".into(),
                                     Utc::now(),
                                     "creador".into(),
                                     false,
                                     None,
                                     slots).unwrap();
    assert_eq!(status(&d, "1"), Some(SignStatus::CanSign));
    assert_eq!(status(&d, "2"), Some(SignStatus::NotYourTurn));
    d.sign_slot(slot_of(&d, "1"), "1", Utc::now()).unwrap();
    assert_eq!(status(&d, "2"), Some(SignStatus::CanSign));
    d.sign_slot(slot_of(&d, "2"), "2", Utc::now()).unwrap();
    assert!(d.is_fully_signed());
  }

  #[test]
  fn status_parsing() {
    assert_eq!("can_sign".parse::<SignStatus>().unwrap(), SignStatus::CanSign);
    assert_eq!("DELEGATE-CONFLICT".parse::<SignStatus>().unwrap(), SignStatus::DelegateConflict);
    assert!("x".parse::<SignStatus>().is_err());
  }
}
