//! firma-workflow: orquestación del motor de firmas
//!
//! Une el dominio (`firma-domain`) con los colaboradores externos
//! (`firma-providers`): creación atómica de documentos, firma con
//! delegación y orden por fases, consulta de pendientes y administración de
//! delegados. `FirmaService` es la fachada que consumen la capa HTTP y la
//! CLI.

pub mod config;
pub mod creation;
pub mod delegation;
pub mod naming;
pub mod service;
pub mod signing;
pub mod status;

pub use config::WorkflowConfig;
pub use creation::DocumentCreationService;
pub use delegation::DelegationRegistry;
pub use naming::{ArtifactNameGenerator, SequentialNameGenerator, UuidNameGenerator};
pub use service::FirmaService;
pub use signing::{require_can_sign, SignOutcome, SigningInputs, SigningService};
pub use status::{Page, PendingFilters, PendingSignature, StatusQueryService};
