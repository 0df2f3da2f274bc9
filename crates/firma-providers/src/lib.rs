//! Crate `firma-providers`: colaboradores externos del motor de firmas
//!
//! Define los contratos que el motor consume pero no controla:
//! - `ArtifactStore`: almacén de artefactos direccionado por ruta
//!   (`/uploads/<año>/<nombre>`), con una implementación en disco
//!   (`FsArtifactStore`).
//! - `SigningProvider`: proveedor de firma electrónica, con un cliente HTTP
//!   bloqueante (`HttpSigningProvider`) que impone su propio timeout.
//!
//! Las escrituras en el almacén no son transaccionales; el crate de flujo se
//! encarga de compensarlas cuando la base de datos revierte.
//!
//! Ejemplo rápido:
//! ```rust
//! use firma_providers::{artifact_path, ArtifactStore, InMemoryArtifactStore};
//! let store = InMemoryArtifactStore::new();
//! let path = artifact_path(2024, "contrato.pdf");
//! store.put(b"%PDF-1.7", &path).unwrap();
//! assert_eq!(store.get(&path).unwrap(), b"%PDF-1.7");
//! ```
pub mod artifact_store;
pub mod checksum;
pub mod errors;
pub mod signing_provider;
pub mod stubs;

pub use artifact_store::{artifact_path, ArtifactStore, FsArtifactStore, UPLOADS_PREFIX};
pub use checksum::{decode_base64, encode_base64, sha256_hex};
pub use errors::{ProviderError, Result};
pub use signing_provider::{HttpSigningProvider, ProviderConfig, SignRequest, SignResponse, SigningProvider};
pub use stubs::{FakeProviderMode, FakeSigningProvider, InMemoryArtifactStore, SIGNATURE_MARKER};
