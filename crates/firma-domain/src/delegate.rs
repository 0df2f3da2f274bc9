// delegate.rs
use crate::{ConflictKind, DomainError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Estado de una delegación. `Revoked` nunca está activo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DelegateState {
  Active,
  Inactive,
  Revoked { at: DateTime<Utc> },
}

impl DelegateState {
  /// Nombre persistido en la columna `state`.
  pub fn as_str(&self) -> &'static str {
    match self {
      DelegateState::Active => "active",
      DelegateState::Inactive => "inactive",
      DelegateState::Revoked { .. } => "revoked",
    }
  }

  /// Reconstruye el estado desde la columna `state` y la fecha de revocación.
  pub fn from_parts(state: &str, revoked_at: Option<DateTime<Utc>>) -> Result<Self, DomainError> {
    match (state, revoked_at) {
      ("active", None) => Ok(DelegateState::Active),
      ("inactive", None) => Ok(DelegateState::Inactive),
      ("revoked", Some(at)) => Ok(DelegateState::Revoked { at }),
      (other, at) => Err(DomainError::ValidationError(format!("Estado de delegado inválido: {} (revocado en {:?})",
                                                              other, at))),
    }
  }
}

impl fmt::Display for DelegateState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Relación dueño → delegado. Por dueño existe a lo sumo una fila viva (no
/// revocada); una fila revocada se reutiliza si se vuelve a nombrar al mismo
/// delegado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
  id: Uuid,
  owner_rut: String,
  delegate_rut: String,
  created_at: DateTime<Utc>,
  expires_at: Option<DateTime<Utc>>,
  state: DelegateState,
}

impl Delegate {
  pub fn appoint(owner_rut: &str, delegate_rut: &str, at: DateTime<Utc>) -> Result<Self, DomainError> {
    let owner = owner_rut.trim();
    let delegate = delegate_rut.trim();
    if owner.is_empty() || delegate.is_empty() {
      return Err(DomainError::ValidationError("Los ruts de dueño y delegado son obligatorios".to_string()));
    }
    if owner == delegate {
      return Err(DomainError::ValidationError(format!("El rut {} no puede delegarse a sí mismo", owner)));
    }
    Ok(Self { id: Uuid::new_v4(),
              owner_rut: owner.to_string(),
              delegate_rut: delegate.to_string(),
              created_at: at,
              expires_at: None,
              state: DelegateState::Active })
  }

  pub fn from_parts(id: Uuid,
                    owner_rut: String,
                    delegate_rut: String,
                    created_at: DateTime<Utc>,
                    expires_at: Option<DateTime<Utc>>,
                    state: DelegateState)
                    -> Self {
    Self { id, owner_rut, delegate_rut, created_at, expires_at, state }
  }

  /// Reactiva una fila revocada: mismo id, estado activo, `created_at`
  /// renovado y sin expiración.
  pub fn revive(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
    if !self.is_deleted() {
      return Err(DomainError::conflict(ConflictKind::DelegateAlreadyAppointed,
                                       format!("El delegado {} de {} sigue vigente",
                                               self.delegate_rut, self.owner_rut)));
    }
    self.state = DelegateState::Active;
    self.created_at = at;
    self.expires_at = None;
    Ok(())
  }

  pub fn revoke(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
    if self.is_deleted() {
      return Err(DomainError::NotFound(format!("delegado vigente para {}", self.owner_rut)));
    }
    self.state = DelegateState::Revoked { at };
    Ok(())
  }

  pub fn activate(&mut self) -> Result<(), DomainError> {
    match self.state {
      DelegateState::Inactive => {
        self.state = DelegateState::Active;
        Ok(())
      }
      DelegateState::Active => {
        Err(DomainError::conflict(ConflictKind::DelegateState, format!("El delegado de {} ya está activo", self.owner_rut)))
      }
      DelegateState::Revoked { .. } => Err(DomainError::NotFound(format!("delegado vigente para {}", self.owner_rut))),
    }
  }

  pub fn deactivate(&mut self) -> Result<(), DomainError> {
    match self.state {
      DelegateState::Active => {
        self.state = DelegateState::Inactive;
        Ok(())
      }
      DelegateState::Inactive => {
        Err(DomainError::conflict(ConflictKind::DelegateState, format!("El delegado de {} ya está inactivo", self.owner_rut)))
      }
      DelegateState::Revoked { .. } => Err(DomainError::NotFound(format!("delegado vigente para {}", self.owner_rut))),
    }
  }

  pub fn set_expiration(&mut self, expires_at: Option<DateTime<Utc>>) -> Result<(), DomainError> {
    if self.is_deleted() {
      return Err(DomainError::NotFound(format!("delegado vigente para {}", self.owner_rut)));
    }
    self.expires_at = expires_at;
    Ok(())
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn owner_rut(&self) -> &str {
    &self.owner_rut
  }

  pub fn delegate_rut(&self) -> &str {
    &self.delegate_rut
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn expires_at(&self) -> Option<DateTime<Utc>> {
    self.expires_at
  }

  pub fn state(&self) -> DelegateState {
    self.state
  }

  pub fn revoked_at(&self) -> Option<DateTime<Utc>> {
    match self.state {
      DelegateState::Revoked { at } => Some(at),
      _ => None,
    }
  }

  pub fn is_active(&self) -> bool {
    self.state == DelegateState::Active
  }

  pub fn is_deleted(&self) -> bool {
    matches!(self.state, DelegateState::Revoked { .. })
  }

  /// Fila viva: no revocada (activa o inactiva).
  pub fn is_live(&self) -> bool {
    !self.is_deleted()
  }

  /// Activa y no expirada en `now`: el delegado puede actuar por el dueño.
  pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
    self.is_active() && self.expires_at.map_or(true, |exp| exp > now)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn self_delegation_is_rejected() {
    assert!(matches!(Delegate::appoint("1", " 1 ", Utc::now()), Err(DomainError::ValidationError(_))));
  }

  #[test]
  fn state_transitions() {
    let mut d = Delegate::appoint("1", "2", Utc::now()).unwrap();
    assert!(d.is_active() && d.is_live());
    assert_eq!(d.activate().unwrap_err().conflict_kind(), Some(ConflictKind::DelegateState));
    d.deactivate().unwrap();
    assert!(!d.is_active());
    assert_eq!(d.deactivate().unwrap_err().conflict_kind(), Some(ConflictKind::DelegateState));
    d.activate().unwrap();
    let at = Utc::now();
    d.revoke(at).unwrap();
    assert!(d.is_deleted() && !d.is_active());
    assert_eq!(d.revoked_at(), Some(at));
    assert!(matches!(d.activate(), Err(DomainError::NotFound(_))));
  }

  #[test]
  fn revive_keeps_id_and_refreshes_creation() {
    let t0 = Utc::now() - Duration::days(3);
    let mut d = Delegate::appoint("1", "2", t0).unwrap();
    d.set_expiration(Some(t0 + Duration::days(1))).unwrap();
    let id = d.id();
    assert!(d.revive(Utc::now()).is_err());
    d.revoke(t0 + Duration::hours(1)).unwrap();
    let t1 = Utc::now();
    d.revive(t1).unwrap();
    assert_eq!(d.id(), id);
    assert_eq!(d.created_at(), t1);
    assert_eq!(d.expires_at(), None);
    assert!(d.is_active());
  }

  #[test]
  fn expiration_limits_effectiveness() {
    let now = Utc::now();
    let mut d = Delegate::appoint("1", "2", now).unwrap();
    assert!(d.is_effective(now));
    d.set_expiration(Some(now - Duration::minutes(1))).unwrap();
    assert!(!d.is_effective(now));
    d.set_expiration(Some(now + Duration::minutes(1))).unwrap();
    assert!(d.is_effective(now));
  }

  #[test]
  fn state_column_round_trip() {
    let at = Utc::now();
    for st in [DelegateState::Active, DelegateState::Inactive, DelegateState::Revoked { at }] {
      assert_eq!(DelegateState::from_parts(st.as_str(), st_revoked(&st)).unwrap(), st);
    }
    assert!(DelegateState::from_parts("revoked", None).is_err());
  }

  fn st_revoked(st: &DelegateState) -> Option<DateTime<Utc>> {
    match st {
      DelegateState::Revoked { at } => Some(*at),
      _ => None,
    }
  }
}
