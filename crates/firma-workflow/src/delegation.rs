// delegation.rs
// Registro de delegaciones: quién puede actuar por quién.
use chrono::{DateTime, Utc};
use firma_domain::{ConflictKind, Delegate, DelegateRepository, DomainError};
use std::sync::Arc;

#[derive(Clone)]
pub struct DelegationRegistry {
  repo: Arc<dyn DelegateRepository>,
}

impl DelegationRegistry {
  pub fn new(repo: Arc<dyn DelegateRepository>) -> Self {
    Self { repo }
  }

  /// Nombra a `delegate_rut` como delegado de `owner_rut`.
  ///
  /// Si ya hay una fila viva para el dueño falla con
  /// `DelegateAlreadyAppointed`. Si existe una fila revocada para el mismo
  /// par se revive (mismo id); si no, se crea una nueva.
  pub fn appoint(&self, owner_rut: &str, delegate_rut: &str) -> Result<Delegate, DomainError> {
    let owner = owner_rut.trim();
    let delegate = delegate_rut.trim();
    if owner.is_empty() || delegate.is_empty() {
      return Err(DomainError::ValidationError("Los ruts de dueño y delegado son obligatorios".to_string()));
    }
    if owner == delegate {
      return Err(DomainError::ValidationError(format!("El rut {} no puede delegarse a sí mismo", owner)));
    }
    if let Some(live) = self.repo.find_live_delegate(owner)? {
      return Err(DomainError::conflict(ConflictKind::DelegateAlreadyAppointed,
                                       format!("{} ya tiene como delegado a {}", owner, live.delegate_rut())));
    }
    let now = Utc::now();
    if let Some(mut revoked) = self.repo.find_revoked_delegate(owner, delegate)? {
      revoked.revive(now)?;
      self.repo.update_delegate(&revoked)?;
      log::info!("delegación {} -> {} reactivada ({})", owner, delegate, revoked.id());
      return Ok(revoked);
    }
    let created = Delegate::appoint(owner, delegate, now)?;
    self.repo.insert_delegate(&created)?;
    log::info!("delegación {} -> {} creada ({})", owner, delegate, created.id());
    Ok(created)
  }

  pub fn revoke(&self, owner_rut: &str) -> Result<Delegate, DomainError> {
    self.update_live(owner_rut, |d| d.revoke(Utc::now()))
  }

  pub fn activate(&self, owner_rut: &str) -> Result<Delegate, DomainError> {
    self.update_live(owner_rut, Delegate::activate)
  }

  pub fn deactivate(&self, owner_rut: &str) -> Result<Delegate, DomainError> {
    self.update_live(owner_rut, Delegate::deactivate)
  }

  /// Fija (o quita con `None`) la expiración de la delegación viva. Una
  /// fecha pasada no es válida.
  pub fn set_expiration(&self, owner_rut: &str, expires_at: Option<DateTime<Utc>>) -> Result<Delegate, DomainError> {
    if let Some(at) = expires_at {
      if at <= Utc::now() {
        return Err(DomainError::ValidationError(format!("La expiración {} ya pasó", at)));
      }
    }
    self.update_live(owner_rut, |d| d.set_expiration(expires_at))
  }

  /// Delegación viva (activa o inactiva) del dueño.
  pub fn current_delegate(&self, owner_rut: &str) -> Result<Delegate, DomainError> {
    self.repo
        .find_live_delegate(owner_rut.trim())?
        .ok_or_else(|| DomainError::NotFound(format!("delegado vigente para {}", owner_rut.trim())))
  }

  /// Delegaciones activas y no expiradas donde `delegate_rut` es el
  /// delegado. Una persona puede ser delegada de varios dueños a la vez.
  pub fn active_delegations_for(&self, delegate_rut: &str) -> Result<Vec<Delegate>, DomainError> {
    let now = Utc::now();
    Ok(self.repo
           .live_delegations_for(delegate_rut.trim())?
           .into_iter()
           .filter(|d| d.is_effective(now))
           .collect())
  }

  /// Ruts de los dueños por los que `actor` puede firmar ahora.
  pub fn principals_of(&self, actor: &str) -> Result<Vec<String>, DomainError> {
    let mut owners: Vec<String> =
      self.active_delegations_for(actor)?.into_iter().map(|d| d.owner_rut().to_string()).collect();
    owners.sort();
    owners.dedup();
    Ok(owners)
  }

  fn update_live<F>(&self, owner_rut: &str, change: F) -> Result<Delegate, DomainError>
    where F: FnOnce(&mut Delegate) -> Result<(), DomainError>
  {
    let mut live = self.current_delegate(owner_rut)?;
    change(&mut live)?;
    self.repo.update_delegate(&live)?;
    log::debug!("delegación de {} ahora en estado {}", live.owner_rut(), live.state());
    Ok(live)
  }
}
