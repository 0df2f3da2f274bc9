// Archivo: service.rs
// Propósito: `FirmaService`, la fachada que usan la capa HTTP y la CLI.
// Arma los servicios de creación, firma, consulta y delegación sobre los
// mismos repositorios y colaboradores.
use crate::config::WorkflowConfig;
use crate::creation::DocumentCreationService;
use crate::delegation::DelegationRegistry;
use crate::naming::{ArtifactNameGenerator, UuidNameGenerator};
use crate::signing::{SignOutcome, SigningInputs, SigningService};
use crate::status::{Page, PendingFilters, PendingSignature, StatusQueryService};
use chrono::{DateTime, Utc};
use firma_domain::{Delegate, DelegateRepository, Document, DocumentRepository, DomainError, SignerSpec};
use firma_providers::{ArtifactStore, SigningProvider};
use std::sync::Arc;
use uuid::Uuid;

/// Punto de entrada de alto nivel del motor de firmas.
///
/// No guarda estado propio: todo vive en los repositorios inyectados, así
/// que puede compartirse entre hilos detrás de un `Arc`.
pub struct FirmaService {
    documents: Arc<dyn DocumentRepository>,
    store: Arc<dyn ArtifactStore>,
    delegations: DelegationRegistry,
    creation: DocumentCreationService,
    signing: SigningService,
    status: StatusQueryService,
}

impl FirmaService {
    /// Construye la fachada con nombres de artefacto `<uuid>.pdf`.
    pub fn new(documents: Arc<dyn DocumentRepository>,
               delegates: Arc<dyn DelegateRepository>,
               store: Arc<dyn ArtifactStore>,
               provider: Arc<dyn SigningProvider>,
               config: WorkflowConfig)
               -> Self {
        Self::with_name_generator(documents, delegates, store, provider, config, Arc::new(UuidNameGenerator))
    }

    /// Igual que `new` pero con un generador de nombres inyectado (pruebas).
    pub fn with_name_generator(documents: Arc<dyn DocumentRepository>,
                               delegates: Arc<dyn DelegateRepository>,
                               store: Arc<dyn ArtifactStore>,
                               provider: Arc<dyn SigningProvider>,
                               config: WorkflowConfig,
                               names: Arc<dyn ArtifactNameGenerator>)
                               -> Self {
        let delegations = DelegationRegistry::new(delegates);
        let creation = DocumentCreationService::new(documents.clone(), store.clone(), names);
        let signing = SigningService::new(documents.clone(), delegations.clone(), store.clone(), provider);
        let status = StatusQueryService::new(documents.clone(), delegations.clone(), config);
        Self { documents, store, delegations, creation, signing, status }
    }

    pub fn create_document(&self,
                           creator_rut: &str,
                           name: &str,
                           content: &[u8],
                           signers: &[SignerSpec])
                           -> Result<Document, DomainError> {
        self.creation.create_document(creator_rut, name, content, signers)
    }

    pub fn sign_document(&self, actor: &str, document_id: Uuid, inputs: &SigningInputs) -> Result<SignOutcome, DomainError> {
        self.signing.sign_document(actor, document_id, inputs)
    }

    pub fn get_pending_signatures(&self,
                                  actor: &str,
                                  page: u32,
                                  limit: u32,
                                  filters: &PendingFilters)
                                  -> Result<Page<PendingSignature>, DomainError> {
        self.status.get_pending_signatures(actor, page, limit, filters)
    }

    /// Primera página de pendientes con el tamaño por defecto.
    pub fn pending_first_page(&self, actor: &str, filters: &PendingFilters) -> Result<Page<PendingSignature>, DomainError> {
        self.status.first_page(actor, filters)
    }

    pub fn appoint_delegate(&self, owner_rut: &str, delegate_rut: &str) -> Result<Delegate, DomainError> {
        self.delegations.appoint(owner_rut, delegate_rut)
    }

    pub fn revoke_delegate(&self, owner_rut: &str) -> Result<Delegate, DomainError> {
        self.delegations.revoke(owner_rut)
    }

    pub fn activate_delegate(&self, owner_rut: &str) -> Result<Delegate, DomainError> {
        self.delegations.activate(owner_rut)
    }

    pub fn deactivate_delegate(&self, owner_rut: &str) -> Result<Delegate, DomainError> {
        self.delegations.deactivate(owner_rut)
    }

    pub fn set_delegate_expiration(&self,
                                   owner_rut: &str,
                                   expires_at: Option<DateTime<Utc>>)
                                   -> Result<Delegate, DomainError> {
        self.delegations.set_expiration(owner_rut, expires_at)
    }

    pub fn current_delegate(&self, owner_rut: &str) -> Result<Delegate, DomainError> {
        self.delegations.current_delegate(owner_rut)
    }

    /// Documento vigente; uno borrado se informa como inexistente.
    pub fn get_document(&self, id: Uuid) -> Result<Document, DomainError> {
        self.documents
            .get_document(id)?
            .filter(|d| !d.is_deleted())
            .ok_or_else(|| DomainError::NotFound(format!("documento {}", id)))
    }

    /// Bytes actuales del artefacto: el original hasta la primera firma,
    /// luego la última versión firmada.
    pub fn download_artifact(&self, id: Uuid) -> Result<Vec<u8>, DomainError> {
        let document = self.get_document(id)?;
        Ok(self.store.get(document.artifact_path())?)
    }

    /// Borrado lógico. Sólo el creador puede borrar; el artefacto se
    /// conserva en el almacén.
    pub fn delete_document(&self, actor: &str, id: Uuid) -> Result<(), DomainError> {
        let document = self.get_document(id)?;
        if document.owner_rut() != actor.trim() {
            return Err(DomainError::ValidationError(format!("Sólo el creador puede borrar el documento {}", id)));
        }
        self.documents.soft_delete_document(id, Utc::now())?;
        log::info!("documento {} borrado por {}", id, actor.trim());
        Ok(())
    }

    /// Documentos vigentes creados por `owner_rut`, más recientes primero.
    pub fn list_documents_by_owner(&self, owner_rut: &str) -> Result<Vec<Document>, DomainError> {
        self.documents.list_documents_by_owner(owner_rut.trim())
    }
}
