// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un almacén de artefactos en memoria con inyección de fallos y un
// proveedor de firma falso. No son durables; se usan en demos y pruebas.
use crate::artifact_store::ArtifactStore;
use crate::checksum::{decode_base64, encode_base64, sha256_hex};
use crate::errors::{ProviderError, Result};
use crate::signing_provider::{SignRequest, SignResponse, SigningProvider};
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Almacén en memoria. Permite forzar fallos de `put`/`delete` para
/// ejercitar las rutas de compensación.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    blobs: DashMap<String, Vec<u8>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hace que los siguientes `put` fallen hasta que se desactive.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Hace que los siguientes `delete` fallen hasta que se desactive.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Cantidad de escrituras exitosas.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Cantidad de borrados exitosos.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn put(&self, bytes: &[u8], path: &str) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ProviderError::Store(format!("fallo inyectado al escribir {}", path)));
        }
        self.blobs.insert(path.to_string(), bytes.to_vec());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(path)
            .map(|b| b.value().clone())
            .ok_or_else(|| ProviderError::ArtifactNotFound(path.to_string()))
    }

    fn delete(&self, path: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ProviderError::Store(format!("fallo inyectado al borrar {}", path)));
        }
        self.blobs
            .remove(path)
            .map(|_| {
                self.deletes.fetch_add(1, Ordering::SeqCst);
            })
            .ok_or_else(|| ProviderError::ArtifactNotFound(path.to_string()))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.blobs.contains_key(path))
    }
}

/// Comportamiento del proveedor falso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeProviderMode {
    /// Firma: agrega `SIGNATURE_MARKER` al contenido.
    Approve,
    /// Responde `success = false`.
    Reject,
    /// Simula que se agotó el timeout.
    Timeout,
    /// Devuelve un checksum que no corresponde al contenido.
    CorruptChecksum,
}

/// Marca que el proveedor falso agrega al contenido firmado.
pub const SIGNATURE_MARKER: &[u8] = b"\n%%firma-electronica";

/// Proveedor de firma determinista para pruebas.
#[derive(Debug)]
pub struct FakeSigningProvider {
    mode: Mutex<FakeProviderMode>,
    calls: AtomicUsize,
}

impl FakeSigningProvider {
    pub fn new() -> Self {
        Self { mode: Mutex::new(FakeProviderMode::Approve), calls: AtomicUsize::new(0) }
    }

    pub fn with_mode(mode: FakeProviderMode) -> Self {
        Self { mode: Mutex::new(mode), calls: AtomicUsize::new(0) }
    }

    pub fn set_mode(&self, mode: FakeProviderMode) {
        *self.mode.lock().unwrap_or_else(|e| e.into_inner()) = mode;
    }

    /// Número de llamadas recibidas (incluye las fallidas).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Contenido que produce la firma falsa para `original`.
    pub fn signed_version_of(original: &[u8]) -> Vec<u8> {
        let mut out = original.to_vec();
        out.extend_from_slice(SIGNATURE_MARKER);
        out
    }
}

impl Default for FakeSigningProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningProvider for FakeSigningProvider {
    fn sign(&self, request: &SignRequest) -> Result<SignResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap_or_else(|e| e.into_inner());
        let original = decode_base64(&request.content)?;
        if sha256_hex(&original) != request.checksum {
            return Err(ProviderError::InvalidResponse("checksum de la solicitud no coincide".into()));
        }
        let signed = Self::signed_version_of(&original);
        match mode {
            FakeProviderMode::Approve => Ok(SignResponse { success: true,
                                                           signed_checksum: Some(sha256_hex(&signed)),
                                                           signed_content: Some(encode_base64(&signed)),
                                                           metadata: json!({"provider": "fake",
                                                                            "layout": request.layout.clone()}) }),
            FakeProviderMode::Reject => Ok(SignResponse { success: false,
                                                          signed_content: None,
                                                          signed_checksum: None,
                                                          metadata: json!({"message": "firma rechazada"}) }),
            FakeProviderMode::Timeout => Err(ProviderError::Timeout("proveedor falso sin respuesta".into())),
            FakeProviderMode::CorruptChecksum => Ok(SignResponse { success: true,
                                                                   signed_checksum: Some(sha256_hex(b"otro")),
                                                                   signed_content: Some(encode_base64(&signed)),
                                                                   metadata: json!({}) }),
        }
    }
}
