// status.rs
// Consulta de firmas pendientes. Sólo lectura: comparte el evaluador con la
// firma y no llama a colaboradores externos.
use crate::config::WorkflowConfig;
use crate::delegation::DelegationRegistry;
use chrono::{DateTime, Utc};
use firma_domain::{evaluate_actor, DocumentRepository, DomainError, SignStatus, SignerType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFilters {
  pub status: Option<SignStatus>,
  /// Subcadena del nombre, sin distinguir mayúsculas.
  pub name_contains: Option<String>,
  /// Incluir documentos ya completamente firmados.
  pub include_fully_signed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSignature {
  pub document_id: Uuid,
  pub document_name: String,
  pub created_at: DateTime<Utc>,
  pub document_fully_signed: bool,
  pub slot_id: Uuid,
  pub slot_owner_rut: String,
  pub on_behalf_of: Option<String>,
  pub signer_type: SignerType,
  pub signer_order: i32,
  pub status: SignStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: usize,
  pub page: u32,
  pub limit: u32,
  pub total_pages: u32,
}

pub struct StatusQueryService {
  documents: Arc<dyn DocumentRepository>,
  delegations: DelegationRegistry,
  config: WorkflowConfig,
}

impl StatusQueryService {
  pub fn new(documents: Arc<dyn DocumentRepository>, delegations: DelegationRegistry, config: WorkflowConfig) -> Self {
    Self { documents, delegations, config }
  }

  /// Estado de `actor` en cada documento donde es dueño de un slot, firmó
  /// uno, o algún dueño que lo tiene de delegado tiene un slot pendiente.
  /// Ordenado por fecha de creación descendente; `page` parte en 1.
  pub fn get_pending_signatures(&self,
                                actor: &str,
                                page: u32,
                                limit: u32,
                                filters: &PendingFilters)
                                -> Result<Page<PendingSignature>, DomainError> {
    if page < 1 {
      return Err(DomainError::ValidationError("page debe ser >= 1".to_string()));
    }
    if limit < 1 || limit > self.config.pending_max_limit {
      return Err(DomainError::ValidationError(format!("limit debe estar entre 1 y {}", self.config.pending_max_limit)));
    }
    let actor = actor.trim();
    let principals = self.delegations.principals_of(actor)?;
    let needle = filters.name_contains.as_ref().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());

    let mut items: Vec<PendingSignature> = Vec::new();
    for doc in self.documents.documents_for_actor(actor, &principals)? {
      if doc.is_deleted() || (doc.is_fully_signed() && !filters.include_fully_signed) {
        continue;
      }
      if let Some(n) = &needle {
        if !doc.name().to_lowercase().contains(n.as_str()) {
          continue;
        }
      }
      let Some(decision) = evaluate_actor(&doc, actor, &principals) else {
        continue;
      };
      if filters.status.is_some_and(|s| s != decision.status) {
        continue;
      }
      let Some(slot) = doc.signature(decision.slot_id) else {
        continue;
      };
      items.push(PendingSignature { document_id: doc.id(),
                                    document_name: doc.name().to_string(),
                                    created_at: doc.created_at(),
                                    document_fully_signed: doc.is_fully_signed(),
                                    slot_id: slot.id(),
                                    slot_owner_rut: slot.owner_rut().to_string(),
                                    on_behalf_of: decision.on_behalf_of.clone(),
                                    signer_type: slot.signer_type(),
                                    signer_order: slot.signer_order(),
                                    status: decision.status });
    }
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.document_id.cmp(&b.document_id)));

    let total = items.len();
    let total_pages = total.div_ceil(limit as usize) as u32;
    let start = (page as usize - 1).saturating_mul(limit as usize);
    let items = items.into_iter().skip(start).take(limit as usize).collect();
    Ok(Page { items, total, page, limit, total_pages })
  }

  /// Igual que `get_pending_signatures` con el tamaño de página por defecto.
  pub fn first_page(&self, actor: &str, filters: &PendingFilters) -> Result<Page<PendingSignature>, DomainError> {
    self.get_pending_signatures(actor, 1, self.config.pending_default_limit, filters)
  }
}
