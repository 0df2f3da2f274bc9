use crate::domain_repository::{DelegateRepository, DocumentRepository, InMemoryDomainRepository};
use crate::{Delegate, Document, DomainError, SignerSpec, SignerType};
use chrono::Utc;

pub struct DomainStubs;

impl DomainStubs {
    /// Firmantes de ejemplo: dos visadores y dos firmadores.
    pub fn sample_signers() -> Vec<SignerSpec> {
        vec![SignerSpec::new("11111111-1", 1, SignerType::Visador),
             SignerSpec::new("22222222-2", 2, SignerType::Visador),
             SignerSpec::new("33333333-3", 3, SignerType::Firmador),
             SignerSpec::new("44444444-4", 4, SignerType::Firmador),]
    }

    /// Crea un repositorio en memoria con un documento pendiente y una
    /// delegación activa del primer visador hacia `55555555-5`.
    ///
    /// El documento no tiene artefacto asociado en ningún almacén; sirve para
    /// probar consultas, no para firmar.
    pub fn sample_repo() -> Result<(InMemoryDomainRepository, Document), DomainError> {
        let repo = InMemoryDomainRepository::new();
        let doc = Document::new("99999999-9", "Contrato de ejemplo", "ejemplo.pdf", Utc::now(), &Self::sample_signers())?;
        repo.transaction(&mut |tx| tx.insert_document(&doc))?;
        repo.insert_delegate(&Delegate::appoint("11111111-1", "55555555-5", Utc::now())?)?;
        Ok((repo, doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_repo_reaches_delegate_and_signers() -> Result<(), DomainError> {
        let (repo, doc) = DomainStubs::sample_repo()?;
        assert_eq!(doc.pending_signatures().count(), 4);
        let principals = vec![repo.find_live_delegate("11111111-1")?.map(|d| d.owner_rut().to_string())
                                  .ok_or_else(|| DomainError::NotFound("delegado".into()))?];
        let reachable = repo.documents_for_actor("55555555-5", &principals)?;
        assert_eq!(reachable.len(), 1);
        assert_eq!(reachable[0].id(), doc.id());
        assert!(repo.documents_for_actor("55555555-5", &[])?.is_empty());
        Ok(())
    }
}
