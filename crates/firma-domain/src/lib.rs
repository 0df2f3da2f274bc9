mod delegate;
mod document;
mod domain_repository;
mod domain_stubs;
mod errors;
mod sign_order;
mod signature;

pub use delegate::{Delegate, DelegateState};
pub use document::{validate_signers, Document, SignerSpec};
pub use domain_repository::{DelegateRepository, DocumentRepository, DocumentTx, InMemoryDomainRepository};
pub use errors::{ConflictKind, DomainError, ErrorCategory};
pub use sign_order::{check_order, evaluate_actor, ActorDecision, SignStatus};
pub use signature::{Signature, SignerType};
// Stubs reutilizados por los tests de los crates de persistencia y flujo
pub use domain_stubs::DomainStubs;
