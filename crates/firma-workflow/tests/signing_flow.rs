use firma_domain::{ConflictKind, DocumentRepository, DomainError, ErrorCategory, InMemoryDomainRepository, SignStatus,
                   SignerSpec, SignerType};
use firma_providers::{ArtifactStore, FakeProviderMode, FakeSigningProvider, InMemoryArtifactStore};
use firma_workflow::{FirmaService, PendingFilters, SequentialNameGenerator, SigningInputs, WorkflowConfig};
use serde_json::json;
use std::sync::Arc;
use test_log::test;
use uuid::Uuid;

const PDF: &[u8] = b"%PDF-1.7 contrato";

struct Harness {
  service: FirmaService,
  repo: Arc<InMemoryDomainRepository>,
  store: Arc<InMemoryArtifactStore>,
  provider: Arc<FakeSigningProvider>,
}

fn harness() -> Harness {
  let repo = Arc::new(InMemoryDomainRepository::new());
  let store = Arc::new(InMemoryArtifactStore::new());
  let provider = Arc::new(FakeSigningProvider::new());
  let service = FirmaService::with_name_generator(repo.clone(),
                                                  repo.clone(),
                                                  store.clone(),
                                                  provider.clone(),
                                                  WorkflowConfig::default(),
                                                  Arc::new(SequentialNameGenerator::new("doc")));
  Harness { service, repo, store, provider }
}

fn four_signers() -> Vec<SignerSpec> {
  vec![SignerSpec::new("v1", 1, SignerType::Visador),
       SignerSpec::new("v2", 2, SignerType::Visador),
       SignerSpec::new("f1", 3, SignerType::Firmador),
       SignerSpec::new("f2", 4, SignerType::Firmador)]
}

fn sign(h: &Harness, actor: &str, id: Uuid) -> Result<firma_workflow::SignOutcome, DomainError> {
  h.service.sign_document(actor, id, &SigningInputs::default())
}

fn assert_consistent(h: &Harness, id: Uuid) {
  let doc = h.repo.get_document(id).expect("get").expect("exists");
  assert!(doc.verify_integrity(), "fully_signed desincronizado en {}", id);
}

#[test]
fn visadores_then_firmadores_in_order() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  let id = doc.id();

  let err = sign(&h, "f1", id).unwrap_err();
  assert_eq!(err.conflict_kind(), Some(ConflictKind::NotYourTurn));
  let err = sign(&h, "v2", id).unwrap_err();
  assert_eq!(err.conflict_kind(), Some(ConflictKind::NotYourTurn));
  // los rechazos previos no llaman al proveedor
  assert_eq!(h.provider.calls(), 0);

  sign(&h, "v1", id).expect("v1");
  assert_consistent(&h, id);
  assert_eq!(sign(&h, "f1", id).unwrap_err().conflict_kind(), Some(ConflictKind::NotYourTurn));
  sign(&h, "v2", id).expect("v2");
  assert_eq!(sign(&h, "f2", id).unwrap_err().conflict_kind(), Some(ConflictKind::NotYourTurn));
  let out = sign(&h, "f1", id).expect("f1");
  assert!(!out.document_fully_signed);
  let out = sign(&h, "f2", id).expect("f2");
  assert!(out.document_fully_signed);
  assert_consistent(&h, id);
  assert_eq!(h.provider.calls(), 4);
}

#[test]
fn slot_is_never_signed_twice() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  sign(&h, "v1", doc.id()).expect("first");
  let commits = h.repo.commit_count();

  let err = sign(&h, "v1", doc.id()).unwrap_err();
  assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadySigned));
  assert_eq!(h.repo.commit_count(), commits);
  assert_eq!(h.provider.calls(), 1);
}

#[test]
fn two_signer_scenario_completes_document() {
  let h = harness();
  let signers = [SignerSpec::new("1", 1, SignerType::Visador), SignerSpec::new("2", 2, SignerType::Firmador)];
  let doc = h.service.create_document("creador", "Acta", PDF, &signers).expect("create");

  let pending = h.service.pending_first_page("1", &PendingFilters::default()).expect("pending");
  assert_eq!(pending.items[0].status, SignStatus::CanSign);
  let pending = h.service.pending_first_page("2", &PendingFilters::default()).expect("pending");
  assert_eq!(pending.items[0].status, SignStatus::NotYourTurn);

  sign(&h, "1", doc.id()).expect("1 firma");
  let pending = h.service.pending_first_page("2", &PendingFilters::default()).expect("pending");
  assert_eq!(pending.items[0].status, SignStatus::CanSign);

  let out = sign(&h, "2", doc.id()).expect("2 firma");
  assert!(out.document_fully_signed);
  assert!(h.service.get_document(doc.id()).expect("get").is_fully_signed());
}

#[test]
fn same_order_across_phases_is_rejected_at_creation() {
  let h = harness();
  let signers = [SignerSpec::new("1", 1, SignerType::Visador), SignerSpec::new("2", 1, SignerType::Firmador)];
  let err = h.service.create_document("creador", "Acta", PDF, &signers).unwrap_err();
  assert_eq!(err.category(), ErrorCategory::Validation);
  assert!(h.store.is_empty());
  assert_eq!(h.repo.commit_count(), 0);
}

#[test]
fn artifact_round_trip_at_same_path() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  assert!(doc.artifact_path().starts_with("/uploads/"));
  assert!(doc.artifact_path().ends_with("/doc-1.pdf"));
  assert_eq!(h.service.download_artifact(doc.id()).expect("download"), PDF);

  sign(&h, "v1", doc.id()).expect("v1");
  let signed = h.service.download_artifact(doc.id()).expect("download");
  assert_eq!(signed, FakeSigningProvider::signed_version_of(PDF));
  assert_eq!(h.store.get(doc.artifact_path()).expect("same path"), signed);
  assert_eq!(h.store.len(), 1);
}

#[test]
fn delegate_signs_on_behalf_of_owner() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  h.service.appoint_delegate("v1", "asistente").expect("appoint");

  let pending = h.service.pending_first_page("asistente", &PendingFilters::default()).expect("pending");
  assert_eq!(pending.total, 1);
  assert_eq!(pending.items[0].on_behalf_of.as_deref(), Some("v1"));
  assert_eq!(pending.items[0].status, SignStatus::CanSign);

  let out = sign(&h, "asistente", doc.id()).expect("delegate signs");
  assert_eq!(out.signature.owner_rut(), "v1");
  assert_eq!(out.signature.signer_rut(), Some("asistente"));
  assert!(out.signature.signed_by_delegate());

  // el dueño ve su slot como ya firmado y el documento sigue en su lista
  let err = sign(&h, "v1", doc.id()).unwrap_err();
  assert_eq!(err.conflict_kind(), Some(ConflictKind::AlreadySigned));
  let owner_view = h.service.pending_first_page("v1", &PendingFilters::default()).expect("pending");
  assert_eq!(owner_view.total, 1);
  assert_eq!(owner_view.items[0].status, SignStatus::AlreadySigned);
  assert_eq!(owner_view.items[0].on_behalf_of, None);
  assert_eq!(h.provider.calls(), 1);
}

#[test]
fn inactive_or_revoked_delegate_cannot_sign() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  h.service.appoint_delegate("v1", "asistente").expect("appoint");
  h.service.deactivate_delegate("v1").expect("deactivate");
  assert!(matches!(sign(&h, "asistente", doc.id()), Err(DomainError::NotFound(_))));

  h.service.activate_delegate("v1").expect("activate");
  h.service.revoke_delegate("v1").expect("revoke");
  assert!(matches!(sign(&h, "asistente", doc.id()), Err(DomainError::NotFound(_))));
  assert_eq!(h.provider.calls(), 0);
}

#[test]
fn owner_who_is_also_delegate_gets_conflict() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  // f1 es firmante y además delegado de v2, que tiene un slot pendiente
  h.service.appoint_delegate("v2", "f1").expect("appoint");

  let err = sign(&h, "f1", doc.id()).unwrap_err();
  assert_eq!(err.conflict_kind(), Some(ConflictKind::DelegateConflict));
  let pending = h.service.pending_first_page("f1", &PendingFilters::default()).expect("pending");
  assert_eq!(pending.items[0].status, SignStatus::DelegateConflict);

  // al quitar la delegación el conflicto desaparece
  h.service.revoke_delegate("v2").expect("revoke");
  let pending = h.service.pending_first_page("f1", &PendingFilters::default()).expect("pending");
  assert_eq!(pending.items[0].status, SignStatus::NotYourTurn);
}

#[test]
fn provider_failures_leave_no_trace() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  let commits = h.repo.commit_count();

  for mode in [FakeProviderMode::Reject, FakeProviderMode::Timeout, FakeProviderMode::CorruptChecksum] {
    h.provider.set_mode(mode);
    let err = sign(&h, "v1", doc.id()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ExternalProvider, "modo {:?}", mode);
  }
  assert_eq!(h.repo.commit_count(), commits);
  assert_eq!(h.service.download_artifact(doc.id()).expect("download"), PDF);
  let stored = h.repo.get_document(doc.id()).expect("get").expect("exists");
  assert!(stored.signatures().iter().all(|s| !s.is_signed()));

  // el llamador puede reintentar
  h.provider.set_mode(FakeProviderMode::Approve);
  sign(&h, "v1", doc.id()).expect("retry");
}

#[test]
fn failed_commit_restores_original_artifact() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  h.repo.fail_next_commit();

  let err = sign(&h, "v1", doc.id()).unwrap_err();
  assert_eq!(err.category(), ErrorCategory::Internal);
  assert_eq!(h.provider.calls(), 1);
  assert_eq!(h.service.download_artifact(doc.id()).expect("download"), PDF);
  let stored = h.repo.get_document(doc.id()).expect("get").expect("exists");
  assert!(stored.signatures().iter().all(|s| !s.is_signed()));
  assert!(stored.verify_integrity());
}

#[test]
fn unknown_actor_and_missing_document_are_not_found() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  assert!(matches!(sign(&h, "intruso", doc.id()), Err(DomainError::NotFound(_))));
  assert!(matches!(sign(&h, "v1", Uuid::new_v4()), Err(DomainError::NotFound(_))));
}

#[test]
fn layout_is_forwarded_to_provider() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");
  let inputs = SigningInputs { layout: json!({"page": 2, "x": 10}) };
  let out = h.service.sign_document("v1", doc.id(), &inputs).expect("sign");
  assert_eq!(out.metadata["layout"]["page"], 2);
}

#[test]
fn deleted_document_cannot_be_signed() {
  let h = harness();
  let doc = h.service.create_document("creador", "Contrato", PDF, &four_signers()).expect("create");

  let err = h.service.delete_document("v1", doc.id()).unwrap_err();
  assert_eq!(err.category(), ErrorCategory::Validation);

  h.service.delete_document("creador", doc.id()).expect("delete");
  assert!(matches!(sign(&h, "v1", doc.id()), Err(DomainError::NotFound(_))));
  assert!(matches!(h.service.get_document(doc.id()), Err(DomainError::NotFound(_))));
  assert!(matches!(h.service.delete_document("creador", doc.id()), Err(DomainError::NotFound(_))));
  assert!(h.service.pending_first_page("v1", &PendingFilters::default()).expect("pending").items.is_empty());
  assert!(h.service.list_documents_by_owner("creador").expect("list").is_empty());
}
