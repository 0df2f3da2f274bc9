use crate::{ConflictKind, Delegate, Document, DomainError, Signature};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Operaciones disponibles dentro de una transacción de documentos.
///
/// Todo lo que se haga a través de `DocumentTx` se confirma o se revierte en
/// bloque cuando termina `DocumentRepository::transaction`.
pub trait DocumentTx {
    /// Inserta el documento y un slot por cada firma que contiene.
    fn insert_document(&mut self, document: &Document) -> Result<(), DomainError>;

    /// Recupera el documento bloqueando sus slots hasta el fin de la
    /// transacción.
    fn lock_document(&mut self, id: Uuid) -> Result<Option<Document>, DomainError>;

    /// Marca el slot como firmado sólo si seguía pendiente; si no afecta
    /// exactamente una fila devuelve `Conflict(AlreadySigned)`.
    fn mark_signed(&mut self, slot: &Signature) -> Result<(), DomainError>;

    /// Persiste la proyección `is_fully_signed`.
    fn set_fully_signed(&mut self, document_id: Uuid, fully_signed: bool) -> Result<(), DomainError>;
}

/// Trait de persistencia para documentos y sus slots.
pub trait DocumentRepository: Send + Sync {
    /// Ejecuta `work` en una única transacción. Si `work` falla, o falla la
    /// confirmación, no queda ningún cambio.
    fn transaction(&self,
                   work: &mut dyn FnMut(&mut dyn DocumentTx) -> Result<(), DomainError>)
                   -> Result<(), DomainError>;

    /// Obtiene un documento (incluidos los eliminados lógicamente).
    fn get_document(&self, id: Uuid) -> Result<Option<Document>, DomainError>;

    /// Documentos no eliminados donde el actor es dueño de un slot, firmó un
    /// slot, o alguno de `principals` tiene un slot pendiente.
    fn documents_for_actor(&self, actor: &str, principals: &[String]) -> Result<Vec<Document>, DomainError>;

    /// Documentos no eliminados creados por `owner_rut`.
    fn list_documents_by_owner(&self, owner_rut: &str) -> Result<Vec<Document>, DomainError>;

    /// Marca el documento como eliminado. Un documento ya eliminado o
    /// inexistente devuelve `NotFound`.
    fn soft_delete_document(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError>;
}

/// Trait de persistencia para delegaciones.
pub trait DelegateRepository: Send + Sync {
    /// Fila viva (no revocada) del dueño, si existe.
    fn find_live_delegate(&self, owner_rut: &str) -> Result<Option<Delegate>, DomainError>;

    /// Fila revocada más reciente para el par (dueño, delegado).
    fn find_revoked_delegate(&self, owner_rut: &str, delegate_rut: &str) -> Result<Option<Delegate>, DomainError>;

    /// Inserta una fila nueva. Falla con `DelegateAlreadyAppointed` si ya hay
    /// una fila viva para el dueño.
    fn insert_delegate(&self, delegate: &Delegate) -> Result<(), DomainError>;

    /// Actualiza una fila existente por id, con la misma restricción de
    /// unicidad de fila viva.
    fn update_delegate(&self, delegate: &Delegate) -> Result<(), DomainError>;

    /// Filas vivas donde `delegate_rut` es el delegado.
    fn live_delegations_for(&self, delegate_rut: &str) -> Result<Vec<Delegate>, DomainError>;
}

/// Implementación en memoria para tests y desarrollo.
///
/// Las transacciones mantienen el mutex de documentos durante todo el
/// trabajo y aplican una copia sólo si todo salió bien.
pub struct InMemoryDomainRepository {
    documents: Arc<Mutex<HashMap<Uuid, Document>>>,
    delegates: Arc<Mutex<HashMap<Uuid, Delegate>>>,
    fail_next_commit: AtomicBool,
    commits: AtomicUsize,
}

struct InMemoryTx {
    working: HashMap<Uuid, Document>,
}

impl InMemoryDomainRepository {
    pub fn new() -> Self {
        Self { documents: Arc::new(Mutex::new(HashMap::new())),
               delegates: Arc::new(Mutex::new(HashMap::new())),
               fail_next_commit: AtomicBool::new(false),
               commits: AtomicUsize::new(0) }
    }

    /// Hace fallar la confirmación de la próxima transacción, después de que
    /// el trabajo haya corrido completo.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Transacciones confirmadas.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    // Helper to map poisoned mutex errors into DomainError
    fn lock_map<'a, T>(&'a self, m: &'a Mutex<T>, name: &str) -> Result<std::sync::MutexGuard<'a, T>, DomainError> {
        m.lock()
         .map_err(|e| DomainError::ExternalError(format!("Mutex '{}' poisoned: {}", name, e)))
    }

    fn ensure_single_live(delegates: &HashMap<Uuid, Delegate>, candidate: &Delegate) -> Result<(), DomainError> {
        if candidate.is_deleted() {
            return Ok(());
        }
        let clash = delegates.values()
                             .any(|d| d.id() != candidate.id() && d.owner_rut() == candidate.owner_rut() && d.is_live());
        if clash {
            return Err(DomainError::conflict(ConflictKind::DelegateAlreadyAppointed,
                                             format!("Ya existe un delegado vigente para {}", candidate.owner_rut())));
        }
        Ok(())
    }
}

impl DocumentTx for InMemoryTx {
    fn insert_document(&mut self, document: &Document) -> Result<(), DomainError> {
        if self.working.contains_key(&document.id()) {
            return Err(DomainError::ValidationError(format!("El documento {} ya existe", document.id())));
        }
        self.working.insert(document.id(), document.clone());
        Ok(())
    }

    fn lock_document(&mut self, id: Uuid) -> Result<Option<Document>, DomainError> {
        Ok(self.working.get(&id).cloned())
    }

    fn mark_signed(&mut self, slot: &Signature) -> Result<(), DomainError> {
        let (signer, at) = match (slot.signer_rut(), slot.signed_at()) {
            (Some(signer), Some(at)) => (signer.to_string(), at),
            _ => return Err(DomainError::ValidationError(format!("El slot {} no trae datos de firma", slot.id()))),
        };
        let doc = self.working
                      .get_mut(&slot.document_id())
                      .ok_or_else(|| DomainError::NotFound(format!("documento {}", slot.document_id())))?;
        doc.sign_slot(slot.id(), &signer, at)?;
        Ok(())
    }

    fn set_fully_signed(&mut self, document_id: Uuid, fully_signed: bool) -> Result<(), DomainError> {
        let doc = self.working
                      .get_mut(&document_id)
                      .ok_or_else(|| DomainError::NotFound(format!("documento {}", document_id)))?;
        if doc.recompute_fully_signed() != fully_signed {
            return Err(DomainError::ValidationError(format!("is_fully_signed={} no coincide con los slots de {}",
                                                            fully_signed, document_id)));
        }
        Ok(())
    }
}

impl DocumentRepository for InMemoryDomainRepository {
    fn transaction(&self,
                   work: &mut dyn FnMut(&mut dyn DocumentTx) -> Result<(), DomainError>)
                   -> Result<(), DomainError> {
        let mut documents = self.lock_map(&self.documents, "documents")?;
        let mut tx = InMemoryTx { working: documents.clone() };
        work(&mut tx)?;
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DomainError::ExternalError("Fallo simulado al confirmar la transacción".to_string()));
        }
        *documents = tx.working;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_document(&self, id: Uuid) -> Result<Option<Document>, DomainError> {
        let documents = self.lock_map(&self.documents, "documents")?;
        Ok(documents.get(&id).cloned())
    }

    fn documents_for_actor(&self, actor: &str, principals: &[String]) -> Result<Vec<Document>, DomainError> {
        let documents = self.lock_map(&self.documents, "documents")?;
        Ok(documents.values()
                    .filter(|d| !d.is_deleted())
                    .filter(|d| {
                        d.signatures().iter().any(|s| {
                                                 s.owner_rut() == actor
                                                 || s.signer_rut() == Some(actor)
                                                 || (!s.is_signed() && principals.iter().any(|p| p == s.owner_rut()))
                                             })
                    })
                    .cloned()
                    .collect())
    }

    fn list_documents_by_owner(&self, owner_rut: &str) -> Result<Vec<Document>, DomainError> {
        let documents = self.lock_map(&self.documents, "documents")?;
        let mut owned: Vec<Document> = documents.values()
                                                .filter(|d| !d.is_deleted() && d.owner_rut() == owner_rut)
                                                .cloned()
                                                .collect();
        owned.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(owned)
    }

    fn soft_delete_document(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError> {
        let mut documents = self.lock_map(&self.documents, "documents")?;
        let doc = documents.get_mut(&id)
                           .ok_or_else(|| DomainError::NotFound(format!("documento {}", id)))?;
        doc.mark_deleted(at)
    }
}

impl DelegateRepository for InMemoryDomainRepository {
    fn find_live_delegate(&self, owner_rut: &str) -> Result<Option<Delegate>, DomainError> {
        let delegates = self.lock_map(&self.delegates, "delegates")?;
        Ok(delegates.values().find(|d| d.owner_rut() == owner_rut && d.is_live()).cloned())
    }

    fn find_revoked_delegate(&self, owner_rut: &str, delegate_rut: &str) -> Result<Option<Delegate>, DomainError> {
        let delegates = self.lock_map(&self.delegates, "delegates")?;
        Ok(delegates.values()
                    .filter(|d| d.owner_rut() == owner_rut && d.delegate_rut() == delegate_rut && d.is_deleted())
                    .max_by_key(|d| d.revoked_at())
                    .cloned())
    }

    fn insert_delegate(&self, delegate: &Delegate) -> Result<(), DomainError> {
        let mut delegates = self.lock_map(&self.delegates, "delegates")?;
        if delegates.contains_key(&delegate.id()) {
            return Err(DomainError::ValidationError(format!("El delegado {} ya existe", delegate.id())));
        }
        Self::ensure_single_live(&delegates, delegate)?;
        delegates.insert(delegate.id(), delegate.clone());
        Ok(())
    }

    fn update_delegate(&self, delegate: &Delegate) -> Result<(), DomainError> {
        let mut delegates = self.lock_map(&self.delegates, "delegates")?;
        if !delegates.contains_key(&delegate.id()) {
            return Err(DomainError::NotFound(format!("delegado {}", delegate.id())));
        }
        Self::ensure_single_live(&delegates, delegate)?;
        delegates.insert(delegate.id(), delegate.clone());
        Ok(())
    }

    fn live_delegations_for(&self, delegate_rut: &str) -> Result<Vec<Delegate>, DomainError> {
        let delegates = self.lock_map(&self.delegates, "delegates")?;
        Ok(delegates.values()
                    .filter(|d| d.delegate_rut() == delegate_rut && d.is_live())
                    .cloned()
                    .collect())
    }
}

impl Default for InMemoryDomainRepository {
    fn default() -> Self {
        Self::new()
    }
}
