// signing.rs
// Orquestador de firma: localizar slot, resolver delegación, validar orden,
// invocar al proveedor y persistir, todo con el documento bloqueado.
use crate::delegation::DelegationRegistry;
use chrono::Utc;
use firma_domain::{evaluate_actor, ActorDecision, ConflictKind, DocumentRepository, DomainError, SignStatus, Signature};
use firma_providers::{encode_base64, sha256_hex, ArtifactStore, SignRequest, SigningProvider};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

/// Datos que acompañan la firma (posición de la imagen, página, etc.). El
/// motor no los interpreta; se reenvían al proveedor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningInputs {
  pub layout: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignOutcome {
  pub signature: Signature,
  pub document_fully_signed: bool,
  /// Metadatos devueltos por el proveedor.
  pub metadata: JsonValue,
}

pub struct SigningService {
  documents: Arc<dyn DocumentRepository>,
  delegations: DelegationRegistry,
  store: Arc<dyn ArtifactStore>,
  provider: Arc<dyn SigningProvider>,
}

/// Convierte una decisión que no permite firmar en el conflicto
/// correspondiente.
pub fn require_can_sign(decision: &ActorDecision) -> Result<(), DomainError> {
  let kind = match decision.status {
    SignStatus::CanSign => return Ok(()),
    SignStatus::AlreadySigned => ConflictKind::AlreadySigned,
    SignStatus::NotYourTurn => ConflictKind::NotYourTurn,
    SignStatus::DelegateConflict => ConflictKind::DelegateConflict,
  };
  let msg = match decision.status {
    SignStatus::AlreadySigned => "El actor ya firmó este documento".to_string(),
    SignStatus::NotYourTurn => "Quedan firmas previas pendientes".to_string(),
    _ => "El actor es firmante y delegado de otro firmante pendiente en el mismo documento".to_string(),
  };
  Err(DomainError::conflict(kind, msg))
}

fn not_eligible(actor: &str, document_id: Uuid) -> DomainError {
  DomainError::NotFound(format!("{} no tiene firmas alcanzables en el documento {}", actor, document_id))
}

impl SigningService {
  pub fn new(documents: Arc<dyn DocumentRepository>,
             delegations: DelegationRegistry,
             store: Arc<dyn ArtifactStore>,
             provider: Arc<dyn SigningProvider>)
             -> Self {
    Self { documents, delegations, store, provider }
  }

  /// Firma el documento en nombre de `actor` (como dueño o como delegado).
  ///
  /// La verificación previa no llama al proveedor. Dentro de la transacción
  /// se vuelve a evaluar con el documento bloqueado; el artefacto firmado
  /// reemplaza al anterior en la misma ruta y, si la transacción falla
  /// después de eso, se restaura el contenido previo.
  pub fn sign_document(&self,
                       actor: &str,
                       document_id: Uuid,
                       inputs: &SigningInputs)
                       -> Result<SignOutcome, DomainError> {
    let actor = actor.trim();
    let document = self.documents
                       .get_document(document_id)?
                       .filter(|d| !d.is_deleted())
                       .ok_or_else(|| DomainError::NotFound(format!("documento {}", document_id)))?;
    let principals = self.delegations.principals_of(actor)?;
    let decision = evaluate_actor(&document, actor, &principals).ok_or_else(|| not_eligible(actor, document_id))?;
    if let Err(e) = require_can_sign(&decision) {
      log::info!("firma rechazada para {} en {}: {}", actor, document_id, e);
      return Err(e);
    }

    let path = document.artifact_path().to_string();
    let mut original: Option<Vec<u8>> = None;
    let mut outcome: Option<SignOutcome> = None;
    let res = self.documents.transaction(&mut |tx| {
      let mut locked = tx.lock_document(document_id)?
                         .filter(|d| !d.is_deleted())
                         .ok_or_else(|| DomainError::NotFound(format!("documento {}", document_id)))?;
      let current = evaluate_actor(&locked, actor, &principals).ok_or_else(|| not_eligible(actor, document_id))?;
      require_can_sign(&current)?;
      if current.slot_id != decision.slot_id {
        return Err(DomainError::conflict(ConflictKind::NotYourTurn,
                                         format!("El documento {} cambió durante la firma", document_id)));
      }

      let content = self.store.get(&path)?;
      let request = SignRequest { content: encode_base64(&content),
                                  checksum: sha256_hex(&content),
                                  layout: inputs.layout.clone() };
      let (signed_bytes, metadata) = self.provider.sign(&request)?.into_signed_bytes()?;

      let slot = locked.sign_slot(current.slot_id, actor, Utc::now())?.clone();
      self.store.put(&signed_bytes, &path)?;
      original = Some(content);
      tx.mark_signed(&slot)?;
      tx.set_fully_signed(document_id, locked.is_fully_signed())?;
      outcome = Some(SignOutcome { signature: slot, document_fully_signed: locked.is_fully_signed(), metadata });
      Ok(())
    });

    if let Err(e) = res {
      if let Some(bytes) = original.take() {
        self.restore_artifact(&path, &bytes);
      }
      log::warn!("firma de {} en {} revertida: {}", actor, document_id, e);
      return Err(e);
    }
    let outcome =
      outcome.ok_or_else(|| DomainError::ExternalError("la transacción de firma terminó sin resultado".to_string()))?;
    log::info!("slot {} de {} firmado por {}{}",
               outcome.signature.id(),
               document_id,
               actor,
               if outcome.document_fully_signed { " (documento completo)" } else { "" });
    Ok(outcome)
  }

  // Compensación best-effort: vuelve a dejar el artefacto previo a la firma.
  fn restore_artifact(&self, path: &str, bytes: &[u8]) {
    if let Err(e) = self.store.put(bytes, path) {
      log::error!("no se pudo restaurar el artefacto {} tras una firma fallida: {}", path, e);
    }
  }
}
