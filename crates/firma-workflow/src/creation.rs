// creation.rs
// Creación atómica de documentos: filas y artefacto original.
use crate::naming::ArtifactNameGenerator;
use chrono::Utc;
use firma_domain::{Document, DocumentRepository, DomainError, SignerSpec};
use firma_providers::ArtifactStore;
use std::sync::Arc;

pub struct DocumentCreationService {
  documents: Arc<dyn DocumentRepository>,
  store: Arc<dyn ArtifactStore>,
  names: Arc<dyn ArtifactNameGenerator>,
}

impl DocumentCreationService {
  pub fn new(documents: Arc<dyn DocumentRepository>,
             store: Arc<dyn ArtifactStore>,
             names: Arc<dyn ArtifactNameGenerator>)
             -> Self {
    Self { documents, store, names }
  }

  /// Crea el documento con un slot pendiente por firmante y sube el
  /// artefacto original a `/uploads/<año>/<nombre>`.
  ///
  /// La subida es el último paso dentro de la transacción: si falla, no
  /// queda ninguna fila. Si la transacción falla después de subir, se
  /// intenta borrar el artefacto y se devuelve el error original.
  pub fn create_document(&self,
                         creator_rut: &str,
                         name: &str,
                         content: &[u8],
                         signers: &[SignerSpec])
                         -> Result<Document, DomainError> {
    if content.is_empty() {
      return Err(DomainError::ValidationError("El contenido del documento no puede estar vacío".to_string()));
    }
    let artifact_name = self.names.next_name();
    let document = Document::new(creator_rut, name, &artifact_name, Utc::now(), signers)?;
    let path = document.artifact_path().to_string();
    // nunca se pisa el artefacto de otro documento
    if self.store.exists(&path)? {
      return Err(DomainError::StorageInconsistency(format!("Ya existe un artefacto en {}", path)));
    }

    let mut uploaded = false;
    let res = self.documents.transaction(&mut |tx| {
                                tx.insert_document(&document)?;
                                self.store.put(content, &path).map_err(|e| {
                                                                 DomainError::StorageInconsistency(format!("No se pudo \
                                                                                                            subir {}: {}",
                                                                                                           path, e))
                                                               })?;
                                uploaded = true;
                                Ok(())
                              });
    if let Err(e) = res {
      if uploaded {
        self.discard_upload(&path);
      }
      log::warn!("creación de documento {:?} revertida: {}", document.name(), e);
      return Err(e);
    }
    log::info!("documento {} creado por {} con {} firmantes",
               document.id(),
               document.owner_rut(),
               document.signatures().len());
    Ok(document)
  }

  // Compensación best-effort: el error de borrado se registra y no reemplaza
  // al error de la transacción.
  fn discard_upload(&self, path: &str) {
    if let Err(e) = self.store.delete(path) {
      log::error!("no se pudo borrar el artefacto huérfano {}: {}", path, e);
    }
  }
}
